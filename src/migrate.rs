//! Derived schema.
//!
//! Every table here is rebuilt from document files; none of it is a source
//! of truth. Association tables cascade from `doc` so removing a document
//! record removes its tag, link and asset rows in the same statement.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS project (
        alias TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        deleted_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doc (
        path TEXT PRIMARY KEY,
        project TEXT NOT NULL,
        title TEXT NOT NULL,
        mtime_ns INTEGER NOT NULL,
        size_bytes INTEGER NOT NULL,
        has_code INTEGER NOT NULL DEFAULT 0,
        has_images INTEGER NOT NULL DEFAULT 0,
        has_links INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        deleted_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tag (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE CHECK (length(name) BETWEEN 1 AND 64),
        created_at INTEGER NOT NULL,
        deleted_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doc_tag (
        doc_path TEXT NOT NULL REFERENCES doc(path) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
        PRIMARY KEY (doc_path, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doc_link (
        doc_path TEXT NOT NULL REFERENCES doc(path) ON DELETE CASCADE,
        url TEXT NOT NULL CHECK (length(url) BETWEEN 1 AND 2048),
        host TEXT NOT NULL,
        PRIMARY KEY (doc_path, url)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS asset (
        hash TEXT PRIMARY KEY CHECK (length(hash) = 64),
        ext TEXT NOT NULL,
        size_bytes INTEGER NOT NULL,
        mime TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        deleted_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doc_asset (
        doc_path TEXT NOT NULL REFERENCES doc(path) ON DELETE CASCADE,
        asset_hash TEXT NOT NULL REFERENCES asset(hash) ON DELETE CASCADE,
        caption TEXT,
        PRIMARY KEY (doc_path, asset_hash)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS doc_asset_pending (
        doc_path TEXT NOT NULL REFERENCES doc(path) ON DELETE CASCADE,
        asset_hash TEXT NOT NULL,
        caption TEXT,
        recorded_at INTEGER NOT NULL,
        PRIMARY KEY (doc_path, asset_hash)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_doc_project ON doc(project)",
    "CREATE INDEX IF NOT EXISTS idx_doc_tag_tag ON doc_tag(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_doc_link_url ON doc_link(url)",
    "CREATE INDEX IF NOT EXISTS idx_doc_link_host ON doc_link(host)",
    "CREATE INDEX IF NOT EXISTS idx_doc_asset_hash ON doc_asset(asset_hash)",
    "CREATE INDEX IF NOT EXISTS idx_doc_asset_pending_hash ON doc_asset_pending(asset_hash)",
];

const VIEWS: &[&str] = &[
    r#"
    CREATE VIEW IF NOT EXISTS tag_usage AS
    SELECT t.id AS tag_id, t.name AS name, COUNT(d.path) AS doc_count
    FROM tag t
    LEFT JOIN doc_tag dt ON dt.tag_id = t.id
    LEFT JOIN doc d ON d.path = dt.doc_path AND d.deleted_at IS NULL
    WHERE t.deleted_at IS NULL
    GROUP BY t.id, t.name
    "#,
    r#"
    CREATE VIEW IF NOT EXISTS project_doc_counts AS
    SELECT project, COUNT(*) AS doc_count
    FROM doc
    WHERE deleted_at IS NULL
    GROUP BY project
    "#,
];

/// Open the configured database, apply the schema and close the pool.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table, index, view and the full-text table. Idempotent.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    for statement in TABLES.iter().chain(INDEXES).chain(VIEWS) {
        sqlx::query(statement).execute(pool).await?;
    }

    // Checked explicitly so an existing table with older tokenizer settings
    // is left alone.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='doc_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        // tokenchars keeps `#tag` and `a/b_c` as single tokens.
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE doc_fts USING fts5(
                path UNINDEXED,
                title,
                headings,
                body,
                code,
                tokenize = "unicode61 tokenchars '#/_'"
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    Ok(())
}
