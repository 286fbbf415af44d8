//! Tags (`tag`) and document↔tag associations (`doc_tag`).
//!
//! Names are case-folded before any insert or lookup: `#Rust`, `rust` and
//! `RUST` are the same tag.

use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::warn;

use super::now_ts;
use crate::error::StoreResult;
use crate::models::TagUsage;

pub const MAX_TAG_LEN: usize = 64;

/// Lower-case, strip a leading `#` and validate. Letters (any script),
/// digits, `_`, `-` and `/` are allowed; 1-64 characters.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let name = raw.trim().trim_start_matches('#').to_lowercase();
    let len = name.chars().count();
    if len == 0 || len > MAX_TAG_LEN {
        return None;
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '/'))
    {
        return None;
    }
    Some(name)
}

#[derive(Clone)]
pub struct TagStore {
    pool: SqlitePool,
}

impl TagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_to_doc(&self, path: &str, tags: &[String]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let n = self.add_to_doc_tx(&mut tx, path, tags).await?;
        tx.commit().await?;
        Ok(n)
    }

    /// Associate `tags` with the document, creating (or reviving) tag rows
    /// as needed. Invalid names are skipped. Returns the number of distinct
    /// valid tags.
    pub async fn add_to_doc_tx(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
        tags: &[String],
    ) -> StoreResult<usize> {
        let mut names: Vec<String> = Vec::with_capacity(tags.len());
        for raw in tags {
            match normalize_tag(raw) {
                Some(name) if !names.contains(&name) => names.push(name),
                Some(_) => {}
                None => warn!(path, tag = %raw, "skipping invalid tag"),
            }
        }

        for name in &names {
            sqlx::query(
                r#"
                INSERT INTO tag (name, created_at) VALUES (?, ?)
                ON CONFLICT(name) DO UPDATE SET deleted_at = NULL
                "#,
            )
            .bind(name)
            .bind(now_ts())
            .execute(&mut *conn)
            .await?;

            let tag_id: i64 = sqlx::query_scalar("SELECT id FROM tag WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *conn)
                .await?;

            sqlx::query("INSERT OR IGNORE INTO doc_tag (doc_path, tag_id) VALUES (?, ?)")
                .bind(path)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
        }

        Ok(names.len())
    }

    pub async fn remove_all_for_doc(&self, path: &str) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let n = self.remove_all_for_doc_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(n)
    }

    pub async fn remove_all_for_doc_tx(&self, conn: &mut SqliteConnection, path: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM doc_tag WHERE doc_path = ?")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Tag names on a document, sorted.
    pub async fn tags_for_doc(&self, path: &str, include_deleted: bool) -> StoreResult<Vec<String>> {
        let names = sqlx::query_scalar(
            r#"
            SELECT t.name FROM doc_tag dt
            JOIN tag t ON t.id = dt.tag_id
            WHERE dt.doc_path = ? AND (? OR t.deleted_at IS NULL)
            ORDER BY t.name
            "#,
        )
        .bind(path)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Paths of documents carrying the tag, sorted. Soft-deleted tags and
    /// documents are excluded unless `include_deleted`.
    pub async fn docs_with_tag(&self, name: &str, include_deleted: bool) -> StoreResult<Vec<String>> {
        let Some(name) = normalize_tag(name) else {
            return Ok(Vec::new());
        };
        let paths = sqlx::query_scalar(
            r#"
            SELECT d.path FROM tag t
            JOIN doc_tag dt ON dt.tag_id = t.id
            JOIN doc d ON d.path = dt.doc_path
            WHERE t.name = ?
              AND (? OR (t.deleted_at IS NULL AND d.deleted_at IS NULL))
            ORDER BY d.path
            "#,
        )
        .bind(&name)
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    pub async fn list(&self, include_deleted: bool) -> StoreResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM tag WHERE (? OR deleted_at IS NULL) ORDER BY name")
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Live tags with the number of live documents using them.
    pub async fn usage(&self) -> StoreResult<Vec<TagUsage>> {
        let rows = sqlx::query("SELECT name, doc_count FROM tag_usage ORDER BY doc_count DESC, name")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TagUsage {
                name: row.try_get("name")?,
                doc_count: row.try_get("doc_count")?,
            });
        }
        Ok(out)
    }

    pub async fn soft_delete(&self, name: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let changed = self.soft_delete_tx(&mut tx, name).await?;
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn soft_delete_tx(&self, conn: &mut SqliteConnection, name: &str) -> StoreResult<bool> {
        let Some(name) = normalize_tag(name) else {
            return Ok(false);
        };
        let result = sqlx::query("UPDATE tag SET deleted_at = ? WHERE name = ? AND deleted_at IS NULL")
            .bind(now_ts())
            .bind(&name)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn restore(&self, name: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let changed = self.restore_tx(&mut tx, name).await?;
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn restore_tx(&self, conn: &mut SqliteConnection, name: &str) -> StoreResult<bool> {
        let Some(name) = normalize_tag(name) else {
            return Ok(false);
        };
        let result = sqlx::query("UPDATE tag SET deleted_at = NULL WHERE name = ? AND deleted_at IS NOT NULL")
            .bind(&name)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{pool, record};
    use crate::store::DocStore;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_tag("  #GoLang ").as_deref(), Some("golang"));
        assert_eq!(normalize_tag("area/sub-topic_2").as_deref(), Some("area/sub-topic_2"));
        assert_eq!(normalize_tag("Ünïcode").as_deref(), Some("ünïcode"));
        assert_eq!(normalize_tag(""), None);
        assert_eq!(normalize_tag("#"), None);
        assert_eq!(normalize_tag("two words"), None);
        assert_eq!(normalize_tag("semi;colon"), None);
        assert_eq!(normalize_tag(&"a".repeat(64)).map(|s| s.len()), Some(64));
        assert_eq!(normalize_tag(&"a".repeat(65)), None);
    }

    #[tokio::test]
    async fn add_is_case_insensitive_and_deduplicated() {
        let (_tmp, pool) = pool().await;
        let docs = DocStore::new(pool.clone());
        let store = TagStore::new(pool);
        docs.upsert(&record("p/a.json")).await.unwrap();

        let n = store
            .add_to_doc("p/a.json", &tags(&["Rust", "rust", "#RUST", "bad tag", "sqlite"]))
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.tags_for_doc("p/a.json", false).await.unwrap(), vec!["rust", "sqlite"]);
        assert_eq!(store.docs_with_tag("RUST", false).await.unwrap(), vec!["p/a.json"]);

        // re-adding is a no-op
        store.add_to_doc("p/a.json", &tags(&["rust"])).await.unwrap();
        let usage = store.usage().await.unwrap();
        assert_eq!(
            usage,
            vec![
                TagUsage { name: "rust".into(), doc_count: 1 },
                TagUsage { name: "sqlite".into(), doc_count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn soft_deleted_tag_hidden_then_revived_by_add() {
        let (_tmp, pool) = pool().await;
        let docs = DocStore::new(pool.clone());
        let store = TagStore::new(pool);
        docs.upsert(&record("p/a.json")).await.unwrap();
        store.add_to_doc("p/a.json", &tags(&["old"])).await.unwrap();

        assert!(store.soft_delete("OLD").await.unwrap());
        assert!(store.docs_with_tag("old", false).await.unwrap().is_empty());
        assert_eq!(store.docs_with_tag("old", true).await.unwrap(), vec!["p/a.json"]);
        assert!(store.list(false).await.unwrap().is_empty());

        store.add_to_doc("p/a.json", &tags(&["old"])).await.unwrap();
        assert_eq!(store.list(false).await.unwrap(), vec!["old"]);
    }

    #[tokio::test]
    async fn remove_all_for_doc_leaves_tag_rows() {
        let (_tmp, pool) = pool().await;
        let docs = DocStore::new(pool.clone());
        let store = TagStore::new(pool);
        docs.upsert(&record("p/a.json")).await.unwrap();
        store.add_to_doc("p/a.json", &tags(&["x", "y"])).await.unwrap();

        assert_eq!(store.remove_all_for_doc("p/a.json").await.unwrap(), 2);
        assert!(store.tags_for_doc("p/a.json", true).await.unwrap().is_empty());
        assert_eq!(store.list(false).await.unwrap(), vec!["x", "y"]);
    }
}
