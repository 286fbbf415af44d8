//! Document lookup by logical path.
//!
//! Gathers a document record with its tags, links and assets. Used by the
//! `vix doc` command.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::{Asset, DocRecord, Link};
use crate::store::{PendingAssetLink, Stores};

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub record: DocRecord,
    pub searchable: bool,
    pub tags: Vec<String>,
    pub links: Vec<Link>,
    pub assets: Vec<Asset>,
    pub pending_assets: Vec<PendingAssetLink>,
}

/// Soft-deleted documents are returned too; `record.deleted_at` tells.
pub async fn get_document(pool: &SqlitePool, path: &str) -> Result<Option<DocumentResponse>> {
    let stores = Stores::new(pool.clone());
    let Some(record) = stores.docs.get(path, true).await? else {
        return Ok(None);
    };

    let searchable = stores.fts.get(path).await?.is_some();
    let tags = stores.tags.tags_for_doc(path, false).await?;
    let links = stores.links.links_for_doc(path).await?;
    let assets = stores.assets.assets_for_doc(path).await?;
    let pending_assets = stores
        .assets
        .pending(None)
        .await?
        .into_iter()
        .filter(|p| p.doc_path == path)
        .collect();

    Ok(Some(DocumentResponse {
        record,
        searchable,
        tags,
        links,
        assets,
        pending_assets,
    }))
}

/// CLI entry point; prints the document or fails when it is not indexed.
pub async fn run_get(config: &Config, path: &str, json: bool) -> Result<()> {
    let pool = db::open(config).await?;
    let doc = get_document(&pool, path).await?;
    pool.close().await;

    let Some(doc) = doc else {
        bail!("document not indexed: {}", path);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let rec = &doc.record;
    println!("--- Document ---");
    println!("path:        {}", rec.path);
    println!("title:       {}", rec.title);
    println!("project:     {}", rec.project);
    println!("created_at:  {}", format_ts_iso(rec.created_at));
    println!("updated_at:  {}", format_ts_iso(rec.updated_at));
    println!("size:        {} bytes", rec.size_bytes);
    println!(
        "content:     code={} images={} links={}",
        rec.has_code, rec.has_images, rec.has_links
    );
    if let Some(ts) = rec.deleted_at {
        println!("deleted_at:  {}", format_ts_iso(ts));
    }
    println!("searchable:  {}", doc.searchable);
    println!();

    println!("--- Tags ({}) ---", doc.tags.len());
    for tag in &doc.tags {
        println!("#{}", tag);
    }
    println!();

    println!("--- Links ({}) ---", doc.links.len());
    for link in &doc.links {
        println!("{}", link.url);
    }
    println!();

    println!("--- Assets ({}) ---", doc.assets.len());
    for asset in &doc.assets {
        println!("{}.{}  {}  {} bytes", asset.hash, asset.ext, asset.mime, asset.size_bytes);
    }
    for pending in &doc.pending_assets {
        println!("{}  (pending)", pending.asset_hash);
    }

    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
