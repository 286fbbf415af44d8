//! Index statistics, tag and project listings.
//!
//! Backs `vix stats`, `vix tags` and `vix projects`.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::get::format_ts_iso;
use crate::store::Stores;
use crate::sync::LAST_AUTO_SYNC_KEY;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let stores = Stores::new(pool.clone());

    let live_docs = stores.docs.count(false).await?;
    let all_docs = stores.docs.count(true).await?;
    let fts_entries = stores.fts.count().await?;
    let tags = stores.tags.usage().await?;
    let pending_assets = stores.assets.pending(None).await?.len();
    let last_sync = stores.kv.get(LAST_AUTO_SYNC_KEY).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Vault Index Stats");
    println!("===================");
    println!();
    println!("  Database:       {}", config.db.path.display());
    println!("  Size:           {}", format_bytes(db_size));
    println!("  Vault:          {}", config.vault.root.display());
    println!();
    println!("  Documents:      {} ({} soft-deleted)", live_docs, all_docs - live_docs);
    println!("  Searchable:     {}", fts_entries);
    println!("  Tags:           {}", tags.len());
    println!("  Pending assets: {}", pending_assets);
    println!(
        "  Last auto-sync: {}",
        last_sync.as_deref().unwrap_or("never")
    );
    println!();

    pool.close().await;
    Ok(())
}

pub async fn run_tags(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let usage = Stores::new(pool.clone()).tags.usage().await?;
    pool.close().await;

    if usage.is_empty() {
        println!("No tags.");
        return Ok(());
    }
    println!("  {:<40} {:>6}", "TAG", "DOCS");
    println!("  {}", "-".repeat(47));
    for tag in &usage {
        println!("  {:<40} {:>6}", tag.name, tag.doc_count);
    }
    Ok(())
}

pub async fn run_projects(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let stores = Stores::new(pool.clone());
    let projects = stores.projects.list(false).await?;
    let counts = stores.projects.doc_counts().await?;
    pool.close().await;

    if projects.is_empty() {
        println!("No projects. Run `vix scan` first.");
        return Ok(());
    }
    println!("  {:<24} {:<32} {:>6}   {}", "ALIAS", "NAME", "DOCS", "UPDATED");
    println!("  {}", "-".repeat(84));
    for p in &projects {
        let docs = counts
            .iter()
            .find(|(alias, _)| alias == &p.alias)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        println!(
            "  {:<24} {:<32} {:>6}   {}",
            p.alias,
            p.name,
            docs,
            format_ts_iso(p.updated_at)
        );
    }
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
