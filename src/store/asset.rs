//! Assets (`asset`), document↔asset associations (`doc_asset`) and
//! references that could not be linked yet (`doc_asset_pending`).
//!
//! An index transaction can run while the asset it references is still
//! being registered elsewhere. [`AssetStore::link_to_doc_tx`] reports that
//! case as [`AssetLink::NotVisible`] instead of letting the foreign key
//! fail, and the caller records a pending reference that a later late-link
//! or reconciliation pass attaches.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::now_ts;
use crate::error::{StoreError, StoreResult};
use crate::models::Asset;

/// Outcome of trying to link an asset inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetLink {
    Linked,
    /// No live asset row with that hash is visible to this unit of work.
    NotVisible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAssetLink {
    pub doc_path: String,
    pub asset_hash: String,
    pub caption: Option<String>,
    pub recorded_at: i64,
}

pub fn validate_hash(hash: &str) -> StoreResult<String> {
    if hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hash.to_ascii_lowercase())
    } else {
        Err(StoreError::InvalidInput(format!(
            "asset hash must be 64 hex characters, got '{}'",
            hash
        )))
    }
}

#[derive(Clone)]
pub struct AssetStore {
    pool: SqlitePool,
}

impl AssetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, asset: &Asset) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.upsert_tx(&mut tx, asset).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Register an asset by content hash. Re-registering revives a
    /// soft-deleted row; `created_at` keeps its first value.
    pub async fn upsert_tx(&self, conn: &mut SqliteConnection, asset: &Asset) -> StoreResult<()> {
        let hash = validate_hash(&asset.hash)?;
        sqlx::query(
            r#"
            INSERT INTO asset (hash, ext, size_bytes, mime, created_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            ON CONFLICT(hash) DO UPDATE SET
                ext = excluded.ext,
                size_bytes = excluded.size_bytes,
                mime = excluded.mime,
                deleted_at = NULL
            "#,
        )
        .bind(&hash)
        .bind(&asset.ext)
        .bind(asset.size_bytes)
        .bind(&asset.mime)
        .bind(asset.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get(&self, hash: &str, include_deleted: bool) -> StoreResult<Option<Asset>> {
        let hash = validate_hash(hash)?;
        let row = sqlx::query(
            "SELECT hash, ext, size_bytes, mime, created_at, deleted_at FROM asset \
             WHERE hash = ? AND (? OR deleted_at IS NULL)",
        )
        .bind(&hash)
        .bind(include_deleted)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(asset_from_row).transpose()?)
    }

    /// Whether a live asset row is visible to this unit of work.
    pub async fn exists_tx(&self, conn: &mut SqliteConnection, hash: &str) -> StoreResult<bool> {
        let hash = validate_hash(hash)?;
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM asset WHERE hash = ? AND deleted_at IS NULL")
                .bind(&hash)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(found.is_some())
    }

    pub async fn link_to_doc(&self, path: &str, hash: &str, caption: Option<&str>) -> StoreResult<AssetLink> {
        let mut tx = self.pool.begin().await?;
        let outcome = self.link_to_doc_tx(&mut tx, path, hash, caption).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Link an asset to a document. An invisible asset is a normal outcome,
    /// not an error. A successful link also clears any pending reference
    /// for the pair.
    pub async fn link_to_doc_tx(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
        hash: &str,
        caption: Option<&str>,
    ) -> StoreResult<AssetLink> {
        let hash = validate_hash(hash)?;
        if !self.exists_tx(conn, &hash).await? {
            return Ok(AssetLink::NotVisible);
        }

        sqlx::query(
            r#"
            INSERT INTO doc_asset (doc_path, asset_hash, caption) VALUES (?, ?, ?)
            ON CONFLICT(doc_path, asset_hash) DO UPDATE SET caption = excluded.caption
            "#,
        )
        .bind(path)
        .bind(&hash)
        .bind(caption)
        .execute(&mut *conn)
        .await?;

        sqlx::query("DELETE FROM doc_asset_pending WHERE doc_path = ? AND asset_hash = ?")
            .bind(path)
            .bind(&hash)
            .execute(&mut *conn)
            .await?;

        Ok(AssetLink::Linked)
    }

    /// Remember a reference that could not be linked yet.
    pub async fn record_pending_tx(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
        hash: &str,
        caption: Option<&str>,
    ) -> StoreResult<()> {
        let hash = validate_hash(hash)?;
        sqlx::query(
            r#"
            INSERT INTO doc_asset_pending (doc_path, asset_hash, caption, recorded_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(doc_path, asset_hash) DO UPDATE SET caption = excluded.caption
            "#,
        )
        .bind(path)
        .bind(&hash)
        .bind(caption)
        .bind(now_ts())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Pending references, oldest first. `hash` narrows to one asset.
    pub async fn pending(&self, hash: Option<&str>) -> StoreResult<Vec<PendingAssetLink>> {
        let hash = hash.map(validate_hash).transpose()?;
        let rows = sqlx::query(
            r#"
            SELECT doc_path, asset_hash, caption, recorded_at FROM doc_asset_pending
            WHERE (? IS NULL OR asset_hash = ?)
            ORDER BY recorded_at, doc_path, asset_hash
            "#,
        )
        .bind(hash.as_deref())
        .bind(hash.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(PendingAssetLink {
                doc_path: row.try_get("doc_path")?,
                asset_hash: row.try_get("asset_hash")?,
                caption: row.try_get("caption")?,
                recorded_at: row.try_get("recorded_at")?,
            });
        }
        Ok(out)
    }

    pub async fn unlink_all_for_doc(&self, path: &str) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let n = self.unlink_all_for_doc_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(n)
    }

    /// Drop the document's asset links and its pending references.
    pub async fn unlink_all_for_doc_tx(&self, conn: &mut SqliteConnection, path: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM doc_asset WHERE doc_path = ?")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM doc_asset_pending WHERE doc_path = ?")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn assets_for_doc(&self, path: &str) -> StoreResult<Vec<Asset>> {
        let rows = sqlx::query(
            r#"
            SELECT a.hash, a.ext, a.size_bytes, a.mime, a.created_at, a.deleted_at
            FROM doc_asset da
            JOIN asset a ON a.hash = da.asset_hash
            WHERE da.doc_path = ?
            ORDER BY a.hash
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(asset_from_row).collect::<sqlx::Result<_>>()?)
    }

    pub async fn docs_for_asset(&self, hash: &str) -> StoreResult<Vec<String>> {
        let hash = validate_hash(hash)?;
        let paths = sqlx::query_scalar(
            r#"
            SELECT da.doc_path FROM doc_asset da
            JOIN doc d ON d.path = da.doc_path
            WHERE da.asset_hash = ? AND d.deleted_at IS NULL
            ORDER BY da.doc_path
            "#,
        )
        .bind(&hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    pub async fn soft_delete(&self, hash: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let changed = self.soft_delete_tx(&mut tx, hash).await?;
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn soft_delete_tx(&self, conn: &mut SqliteConnection, hash: &str) -> StoreResult<bool> {
        let hash = validate_hash(hash)?;
        let result = sqlx::query("UPDATE asset SET deleted_at = ? WHERE hash = ? AND deleted_at IS NULL")
            .bind(now_ts())
            .bind(&hash)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn asset_from_row(row: &SqliteRow) -> sqlx::Result<Asset> {
    Ok(Asset {
        hash: row.try_get("hash")?,
        ext: row.try_get("ext")?,
        size_bytes: row.try_get("size_bytes")?,
        mime: row.try_get("mime")?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{pool, record};
    use crate::store::DocStore;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn asset(hash: &str) -> Asset {
        Asset {
            hash: hash.to_string(),
            ext: "png".to_string(),
            size_bytes: 4,
            mime: "image/png".to_string(),
            created_at: 1,
            deleted_at: None,
        }
    }

    #[test]
    fn hash_validation() {
        assert_eq!(validate_hash(&HASH.to_uppercase()).unwrap(), HASH);
        assert!(validate_hash("abc").is_err());
        assert!(validate_hash(&"z".repeat(64)).is_err());
    }

    #[tokio::test]
    async fn invisible_asset_is_an_outcome_not_an_error() {
        let (_tmp, pool) = pool().await;
        let docs = DocStore::new(pool.clone());
        let store = AssetStore::new(pool);
        docs.upsert(&record("p/a.json")).await.unwrap();

        assert_eq!(
            store.link_to_doc("p/a.json", HASH, None).await.unwrap(),
            AssetLink::NotVisible
        );

        store.upsert(&asset(HASH)).await.unwrap();
        assert_eq!(
            store.link_to_doc("p/a.json", HASH, Some("cap")).await.unwrap(),
            AssetLink::Linked
        );
        assert_eq!(store.docs_for_asset(HASH).await.unwrap(), vec!["p/a.json"]);
        assert_eq!(store.assets_for_doc("p/a.json").await.unwrap(), vec![asset(HASH)]);
    }

    #[tokio::test]
    async fn pending_references_cleared_by_link_and_unlink() {
        let (_tmp, pool) = pool().await;
        let docs = DocStore::new(pool.clone());
        let store = AssetStore::new(pool.clone());
        docs.upsert(&record("p/a.json")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        store.record_pending_tx(&mut conn, "p/a.json", HASH, Some("c")).await.unwrap();
        drop(conn);
        assert_eq!(store.pending(Some(HASH)).await.unwrap().len(), 1);

        store.upsert(&asset(HASH)).await.unwrap();
        store.link_to_doc("p/a.json", HASH, Some("c")).await.unwrap();
        assert!(store.pending(None).await.unwrap().is_empty());

        assert_eq!(store.unlink_all_for_doc("p/a.json").await.unwrap(), 1);
        assert!(store.assets_for_doc("p/a.json").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn soft_deleted_asset_is_not_visible() {
        let (_tmp, pool) = pool().await;
        let docs = DocStore::new(pool.clone());
        let store = AssetStore::new(pool);
        docs.upsert(&record("p/a.json")).await.unwrap();
        store.upsert(&asset(HASH)).await.unwrap();
        assert!(store.soft_delete(HASH).await.unwrap());

        assert!(store.get(HASH, false).await.unwrap().is_none());
        assert!(store.get(HASH, true).await.unwrap().is_some());
        assert_eq!(
            store.link_to_doc("p/a.json", HASH, None).await.unwrap(),
            AssetLink::NotVisible
        );

        store.upsert(&asset(HASH)).await.unwrap();
        assert!(store.get(HASH, false).await.unwrap().is_some());
    }
}
