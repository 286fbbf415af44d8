//! Outbound links per document (`doc_link`).

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::{StoreError, StoreResult};
use crate::models::{Link, MAX_LINK_LEN};

#[derive(Clone)]
pub struct LinkStore {
    pool: SqlitePool,
}

impl LinkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_to_doc(&self, path: &str, links: &[Link]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let n = self.add_to_doc_tx(&mut tx, path, links).await?;
        tx.commit().await?;
        Ok(n)
    }

    /// Insert links for a document; duplicates of an existing URL are
    /// ignored. Returns the number of new rows.
    pub async fn add_to_doc_tx(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
        links: &[Link],
    ) -> StoreResult<u64> {
        let mut added = 0;
        for link in links {
            if link.url.is_empty() || link.url.len() > MAX_LINK_LEN {
                return Err(StoreError::InvalidInput(format!(
                    "link url must be 1-{} bytes",
                    MAX_LINK_LEN
                )));
            }
            let result = sqlx::query("INSERT OR IGNORE INTO doc_link (doc_path, url, host) VALUES (?, ?, ?)")
                .bind(path)
                .bind(&link.url)
                .bind(&link.host)
                .execute(&mut *conn)
                .await?;
            added += result.rows_affected();
        }
        Ok(added)
    }

    pub async fn remove_all_for_doc(&self, path: &str) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let n = self.remove_all_for_doc_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(n)
    }

    pub async fn remove_all_for_doc_tx(&self, conn: &mut SqliteConnection, path: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM doc_link WHERE doc_path = ?")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn links_for_doc(&self, path: &str) -> StoreResult<Vec<Link>> {
        let rows = sqlx::query("SELECT url, host FROM doc_link WHERE doc_path = ? ORDER BY url")
            .bind(path)
            .fetch_all(&self.pool)
            .await?;
        let mut links = Vec::with_capacity(rows.len());
        for row in rows {
            links.push(Link {
                url: row.try_get("url")?,
                host: row.try_get("host")?,
            });
        }
        Ok(links)
    }

    /// Live documents linking to exactly `url`.
    pub async fn backlinks(&self, url: &str) -> StoreResult<Vec<String>> {
        let paths = sqlx::query_scalar(
            r#"
            SELECT l.doc_path FROM doc_link l
            JOIN doc d ON d.path = l.doc_path
            WHERE l.url = ? AND d.deleted_at IS NULL
            ORDER BY l.doc_path
            "#,
        )
        .bind(url.trim())
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    /// Live documents with at least one link to `host`.
    pub async fn docs_linking_to_host(&self, host: &str) -> StoreResult<Vec<String>> {
        let paths = sqlx::query_scalar(
            r#"
            SELECT DISTINCT l.doc_path FROM doc_link l
            JOIN doc d ON d.path = l.doc_path
            WHERE l.host = ? AND d.deleted_at IS NULL
            ORDER BY l.doc_path
            "#,
        )
        .bind(host.trim().to_lowercase())
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }
}
