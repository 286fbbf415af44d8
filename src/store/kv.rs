//! Generic key-value rows (`kv`). The sync manager keeps
//! `last_auto_sync` here.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::StoreResult;

#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        self.get_tx(&mut conn, key).await
    }

    pub async fn get_tx(&self, conn: &mut SqliteConnection, key: &str) -> StoreResult<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        self.set_tx(&mut tx, key, value).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_tx(&self, conn: &mut SqliteConnection, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::pool;

    #[tokio::test]
    async fn set_overwrites() {
        let (_tmp, pool) = pool().await;
        let kv = KvStore::new(pool);
        assert_eq!(kv.get("k").await.unwrap(), None);
        kv.set("k", "1").await.unwrap();
        kv.set("k", "2").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("2"));
        assert!(kv.delete("k").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
