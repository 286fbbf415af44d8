//! SQLite connection management.
//!
//! # Single-writer policy
//!
//! The pool is capped at **one** connection. Under WAL a write committed on
//! connection A is not visible to a transaction that already holds a read
//! snapshot on connection B, so with a larger pool an asset registration can
//! commit while a concurrently started index transaction still sees no such
//! asset row. With one connection every operation queues behind the same
//! handle and that interleaving cannot happen; reads that could have run in
//! parallel are serialized too.
//!
//! `connect_with_pool_size` exists so the regression tests can build both
//! the fixed and the racy configuration.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;
use crate::error::DbError;

/// An open transaction that stores can compose their writes into.
pub type UnitOfWork = Transaction<'static, Sqlite>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the pool for the configured database.
pub async fn connect(config: &Config) -> Result<SqlitePool, DbError> {
    if config.db.max_connections > 1 {
        warn!(
            max_connections = config.db.max_connections,
            "db.max_connections > 1 allows index transactions to miss concurrently committed assets"
        );
    }
    connect_with_pool_size(&config.db.path, config.db.max_connections).await
}

/// Connect and refuse to continue on a database that fails the integrity
/// check.
pub async fn open(config: &Config) -> Result<SqlitePool, DbError> {
    let pool = connect(config).await?;
    if let Err(e) = check_integrity(&pool).await {
        pool.close().await;
        return Err(e);
    }
    Ok(pool)
}

/// Create a pool of exactly `max_connections` connections to `db_path`.
///
/// Creates the file and its parent directories if they don't exist; enables
/// WAL and foreign keys on every connection.
pub async fn connect_with_pool_size(
    db_path: &Path,
    max_connections: u32,
) -> Result<SqlitePool, DbError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| DbError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Run `PRAGMA integrity_check`; anything but a single `ok` row is fatal.
pub async fn check_integrity(pool: &SqlitePool) -> Result<(), DbError> {
    let rows: Vec<String> = sqlx::query_scalar("PRAGMA integrity_check")
        .fetch_all(pool)
        .await?;

    if rows.len() == 1 && rows[0] == "ok" {
        Ok(())
    } else {
        Err(DbError::Corrupt(rows.join("; ")))
    }
}

/// Hands out units of work so callers can compose writes from several
/// stores into one atomic commit.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> sqlx::Result<UnitOfWork> {
        self.pool.begin().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
