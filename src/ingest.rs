//! CLI runners around the [`Indexer`]: scan, single-document index and
//! removal, asset registration and reconciliation.

use anyhow::{bail, Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::indexer::Indexer;
use crate::progress::ProgressMode;
use crate::store::AssetLink;
use crate::vault::Vault;

/// Open the database (after the integrity check) and build an Indexer.
pub async fn open_indexer(config: &Config) -> Result<(SqlitePool, Indexer)> {
    let pool = db::open(config).await?;
    let indexer = Indexer::new(pool.clone(), Vault::new(&config.vault.root));
    Ok((pool, indexer))
}

/// Cancel `token` on Ctrl-C.
pub(crate) fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted; stopping after the current document");
            token.cancel();
        }
    });
}

pub async fn run_scan(config: &Config, progress: ProgressMode, fresh: bool) -> Result<()> {
    let (pool, indexer) = open_indexer(config).await?;

    if fresh {
        indexer.clear_index().await?;
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let reporter = progress.reporter();
    let summary = indexer
        .scan_and_index_vault(reporter.as_ref(), &cancel)
        .await?;

    println!("scan {}", config.vault.root.display());
    println!("  projects: {}", summary.projects);
    println!("  documents: {}", summary.total);
    println!("  indexed: {}", summary.indexed);
    println!("  failed: {}", summary.failed);
    println!("  pending assets linked: {}", summary.assets_reconciled);
    if summary.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }

    pool.close().await;
    Ok(())
}

pub async fn run_index(config: &Config, path: &str) -> Result<()> {
    let (pool, indexer) = open_indexer(config).await?;
    let report = indexer.index_document(path).await?;
    pool.close().await;

    println!("indexed {}", path);
    println!("  title: {}", report.record.title);
    println!("  tags: {}", report.tags);
    println!("  links: {} ({} dropped)", report.links, report.dropped_links);
    println!(
        "  assets: {} linked, {} pending",
        report.assets_linked, report.assets_pending
    );
    Ok(())
}

pub async fn run_remove(config: &Config, path: &str, completely: bool) -> Result<()> {
    let (pool, indexer) = open_indexer(config).await?;
    let removed = if completely {
        indexer.remove_document_completely(path).await?
    } else {
        indexer.remove_document(path).await?
    };
    pool.close().await;

    if removed {
        println!("removed {}", path);
    } else {
        println!("{} was not indexed", path);
    }
    Ok(())
}

pub async fn run_clear(config: &Config) -> Result<()> {
    let (pool, indexer) = open_indexer(config).await?;
    indexer.clear_index().await?;
    pool.close().await;
    println!("index cleared");
    Ok(())
}

pub async fn run_reconcile(config: &Config) -> Result<()> {
    let (pool, indexer) = open_indexer(config).await?;
    let linked = indexer.reconcile_pending_assets().await?;
    let remaining = indexer.stores().assets.pending(None).await?.len();
    pool.close().await;
    println!("linked {} pending asset reference(s), {} still pending", linked, remaining);
    Ok(())
}

pub async fn run_asset_add(config: &Config, file: &Path, doc: Option<&str>) -> Result<()> {
    let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
        bail!("asset file needs an extension: {}", file.display());
    };
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read asset file: {}", file.display()))?;

    let (pool, indexer) = open_indexer(config).await?;
    let registered = indexer.register_asset(&bytes, ext).await?;
    println!("{}", registered.reference);
    println!("  hash: {}", registered.asset.hash);
    println!("  mime: {}", registered.asset.mime);
    println!("  pending references linked: {}", registered.linked);

    if let Some(doc) = doc {
        match indexer.late_link_asset(doc, &registered.asset.hash).await? {
            AssetLink::Linked => println!("  linked to {}", doc),
            AssetLink::NotVisible => println!("  could not link to {}", doc),
        }
    }

    pool.close().await;
    Ok(())
}

pub async fn run_asset_link(config: &Config, doc: &str, hash: &str) -> Result<()> {
    let (pool, indexer) = open_indexer(config).await?;
    let outcome = indexer.late_link_asset(doc, hash).await?;
    pool.close().await;

    match outcome {
        AssetLink::Linked => println!("linked {} -> {}", doc, hash),
        AssetLink::NotVisible => bail!("asset {} is not registered", hash),
    }
    Ok(())
}
