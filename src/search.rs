use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store::FtsStore;

pub const DEFAULT_LIMIT: i64 = 20;

pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let pool = db::open(config).await?;
    let hits = FtsStore::new(pool.clone())
        .search(query, limit.unwrap_or(DEFAULT_LIMIT))
        .await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let title_display = hit.title.as_deref().unwrap_or("(untitled)");
        println!("{}. [{:.2}] {}", i + 1, hit.score, title_display);
        println!("    path: {}", hit.path);
        if !hit.snippet.is_empty() {
            println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        }
        println!();
    }

    pool.close().await;
    Ok(())
}
