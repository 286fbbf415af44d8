//! Full-text index (`doc_fts`): one row per indexed document.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::StoreResult;
use crate::models::{FtsEntry, SearchHit};

/// bm25 column weights: path (unindexed), title, headings, body, code.
const BM25_WEIGHTS: &str = "0.0, 10.0, 5.0, 1.0, 2.0";

#[derive(Clone)]
pub struct FtsStore {
    pool: SqlitePool,
}

impl FtsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, entry: &FtsEntry) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.upsert_tx(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    /// FTS5 has no primary key to conflict on, so replace by path.
    pub async fn upsert_tx(&self, conn: &mut SqliteConnection, entry: &FtsEntry) -> StoreResult<()> {
        sqlx::query("DELETE FROM doc_fts WHERE path = ?")
            .bind(&entry.path)
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO doc_fts (path, title, headings, body, code) VALUES (?, ?, ?, ?, ?)")
            .bind(&entry.path)
            .bind(&entry.title)
            .bind(&entry.headings)
            .bind(&entry.body)
            .bind(&entry.code)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> StoreResult<Option<FtsEntry>> {
        let row = sqlx::query("SELECT path, title, headings, body, code FROM doc_fts WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(entry_from_row).transpose()?)
    }

    pub async fn delete(&self, path: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let deleted = self.delete_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn delete_tx(&self, conn: &mut SqliteConnection, path: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM doc_fts WHERE path = ?")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.clear_tx(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn clear_tx(&self, conn: &mut SqliteConnection) -> StoreResult<()> {
        sqlx::query("DELETE FROM doc_fts").execute(&mut *conn).await?;
        Ok(())
    }

    pub async fn count(&self) -> StoreResult<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM doc_fts")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Ranked search. Higher score is better. Documents whose record is
    /// soft-deleted are left out.
    pub async fn search(&self, query: &str, limit: i64) -> StoreResult<Vec<SearchHit>> {
        let Some(match_expr) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"
            SELECT doc_fts.path AS path,
                   d.title AS title,
                   bm25(doc_fts, {weights}) AS raw_score,
                   snippet(doc_fts, 3, '[', ']', '…', 12) AS snippet
            FROM doc_fts
            LEFT JOIN doc d ON d.path = doc_fts.path
            WHERE doc_fts MATCH ?
              AND (d.path IS NULL OR d.deleted_at IS NULL)
            ORDER BY raw_score, doc_fts.path
            LIMIT ?
            "#,
            weights = BM25_WEIGHTS
        );

        let rows = sqlx::query(&sql)
            .bind(&match_expr)
            .bind(limit.max(1))
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_score: f64 = row.try_get("raw_score")?;
            hits.push(SearchHit {
                path: row.try_get("path")?,
                title: row.try_get("title")?,
                score: -raw_score,
                snippet: row.try_get("snippet")?,
            });
        }
        Ok(hits)
    }
}

/// Quote every whitespace-separated term so user input can't be read as FTS
/// syntax. Terms are ANDed. `None` when nothing searchable remains.
pub fn fts_query(input: &str) -> Option<String> {
    let terms: Vec<String> = input
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn entry_from_row(row: &SqliteRow) -> sqlx::Result<FtsEntry> {
    Ok(FtsEntry {
        path: row.try_get("path")?,
        title: row.try_get("title")?,
        headings: row.try_get("headings")?,
        body: row.try_get("body")?,
        code: row.try_get("code")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::pool;

    fn entry(path: &str, title: &str, body: &str) -> FtsEntry {
        FtsEntry {
            path: path.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn query_terms_are_quoted() {
        assert_eq!(fts_query("hello world").as_deref(), Some("\"hello\" \"world\""));
        assert_eq!(fts_query("say \"hi\" OR").as_deref(), Some("\"say\" \"hi\" \"OR\""));
        assert_eq!(fts_query("   "), None);
        assert_eq!(fts_query("\"\""), None);
    }

    #[tokio::test]
    async fn upsert_replaces_previous_row() {
        let (_tmp, pool) = pool().await;
        let store = FtsStore::new(pool);
        store.upsert(&entry("p/a.json", "Original", "one")).await.unwrap();
        store.upsert(&entry("p/a.json", "Updated", "two")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.search("Original", 10).await.unwrap().is_empty());
        let hits = store.search("Updated", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "p/a.json");
    }

    #[tokio::test]
    async fn title_outranks_body() {
        let (_tmp, pool) = pool().await;
        let store = FtsStore::new(pool);
        store.upsert(&entry("p/body.json", "Other", "kubernetes notes")).await.unwrap();
        store.upsert(&entry("p/title.json", "Kubernetes", "misc")).await.unwrap();

        let hits = store.search("kubernetes", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "p/title.json");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn hashtags_and_paths_stay_whole_tokens() {
        let (_tmp, pool) = pool().await;
        let store = FtsStore::new(pool);
        store
            .upsert(&entry("p/a.json", "T", "tagged #rust see src/main_loop"))
            .await
            .unwrap();
        assert_eq!(store.search("#rust", 10).await.unwrap().len(), 1);
        assert_eq!(store.search("src/main_loop", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let (_tmp, pool) = pool().await;
        let store = FtsStore::new(pool);
        store.upsert(&entry("p/a.json", "A", "x")).await.unwrap();
        store.upsert(&entry("p/b.json", "B", "x")).await.unwrap();
        assert!(store.delete("p/a.json").await.unwrap());
        assert!(!store.delete("p/a.json").await.unwrap());
        assert!(store.get("p/a.json").await.unwrap().is_none());
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
