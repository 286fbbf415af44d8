//! Document metadata rows (`doc`).

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::now_ts;
use crate::error::StoreResult;
use crate::models::DocRecord;

const COLUMNS: &str = "path, project, title, mtime_ns, size_bytes, has_code, has_images, \
                       has_links, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct DocStore {
    pool: SqlitePool,
}

impl DocStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, rec: &DocRecord) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.upsert_tx(&mut tx, rec).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Insert the row if absent, otherwise update it in place. `deleted_at`
    /// is left alone on update; soft deletion is owned by the caller.
    pub async fn upsert_tx(&self, conn: &mut SqliteConnection, rec: &DocRecord) -> StoreResult<()> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM doc WHERE path = ?")
            .bind(&rec.path)
            .fetch_optional(&mut *conn)
            .await?;

        if exists.is_none() {
            sqlx::query(
                r#"
                INSERT INTO doc (path, project, title, mtime_ns, size_bytes,
                                 has_code, has_images, has_links,
                                 created_at, updated_at, deleted_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&rec.path)
            .bind(&rec.project)
            .bind(&rec.title)
            .bind(rec.mtime_ns)
            .bind(rec.size_bytes)
            .bind(rec.has_code)
            .bind(rec.has_images)
            .bind(rec.has_links)
            .bind(rec.created_at)
            .bind(rec.updated_at)
            .bind(rec.deleted_at)
            .execute(&mut *conn)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE doc SET
                    project = ?, title = ?, mtime_ns = ?, size_bytes = ?,
                    has_code = ?, has_images = ?, has_links = ?,
                    created_at = ?, updated_at = ?
                WHERE path = ?
                "#,
            )
            .bind(&rec.project)
            .bind(&rec.title)
            .bind(rec.mtime_ns)
            .bind(rec.size_bytes)
            .bind(rec.has_code)
            .bind(rec.has_images)
            .bind(rec.has_links)
            .bind(rec.created_at)
            .bind(rec.updated_at)
            .bind(&rec.path)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    pub async fn get(&self, path: &str, include_deleted: bool) -> StoreResult<Option<DocRecord>> {
        let mut conn = self.pool.acquire().await?;
        self.get_tx(&mut conn, path, include_deleted).await
    }

    pub async fn get_tx(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
        include_deleted: bool,
    ) -> StoreResult<Option<DocRecord>> {
        let sql = format!(
            "SELECT {} FROM doc WHERE path = ? AND (? OR deleted_at IS NULL)",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(path)
            .bind(include_deleted)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(doc_from_row).transpose()?)
    }

    /// Documents ordered by path, optionally limited to one project.
    pub async fn list(&self, project: Option<&str>, include_deleted: bool) -> StoreResult<Vec<DocRecord>> {
        let sql = format!(
            "SELECT {} FROM doc WHERE (? IS NULL OR project = ?) AND (? OR deleted_at IS NULL) ORDER BY path",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(project)
            .bind(project)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(doc_from_row).collect::<sqlx::Result<_>>()?)
    }

    pub async fn count(&self, include_deleted: bool) -> StoreResult<i64> {
        let n = sqlx::query_scalar("SELECT COUNT(*) FROM doc WHERE (? OR deleted_at IS NULL)")
            .bind(include_deleted)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn soft_delete(&self, path: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let changed = self.soft_delete_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn soft_delete_tx(&self, conn: &mut SqliteConnection, path: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE doc SET deleted_at = ? WHERE path = ? AND deleted_at IS NULL")
            .bind(now_ts())
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn restore(&self, path: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let changed = self.restore_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn restore_tx(&self, conn: &mut SqliteConnection, path: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE doc SET deleted_at = NULL WHERE path = ? AND deleted_at IS NOT NULL")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hard delete. Tag, link and asset associations cascade.
    pub async fn delete(&self, path: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let deleted = self.delete_tx(&mut tx, path).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    pub async fn delete_tx(&self, conn: &mut SqliteConnection, path: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM doc WHERE path = ?")
            .bind(path)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let n = self.clear_tx(&mut tx).await?;
        tx.commit().await?;
        Ok(n)
    }

    pub async fn clear_tx(&self, conn: &mut SqliteConnection) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM doc").execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }
}

fn doc_from_row(row: &SqliteRow) -> sqlx::Result<DocRecord> {
    Ok(DocRecord {
        path: row.try_get("path")?,
        project: row.try_get("project")?,
        title: row.try_get("title")?,
        mtime_ns: row.try_get("mtime_ns")?,
        size_bytes: row.try_get("size_bytes")?,
        has_code: row.try_get("has_code")?,
        has_images: row.try_get("has_images")?,
        has_links: row.try_get("has_links")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}
