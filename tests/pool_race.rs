//! Asset registration racing document indexing, on a single-connection pool
//! and on a ten-connection pool.

use serde_json::json;
use sqlx::SqlitePool;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use vault_index::db;
use vault_index::indexer::Indexer;
use vault_index::migrate;
use vault_index::store::{AssetLink, Stores};
use vault_index::vault::Vault;

/// Extended result code for a read transaction whose snapshot is too old to
/// start writing.
const SQLITE_BUSY_SNAPSHOT: &str = "517";

async fn setup(pool_size: u32) -> (TempDir, SqlitePool, Indexer) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("vault");
    fs::create_dir_all(root.join("projects/@race")).unwrap();

    let pool = db::connect_with_pool_size(&tmp.path().join("race.sqlite"), pool_size)
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    let indexer = Indexer::new(pool.clone(), Vault::new(&root));
    (tmp, pool, indexer)
}

fn write_doc_with_image(root: &Path, path: &str, reference: &str) {
    let doc = json!({
        "meta": {"title": path},
        "blocks": [
            {"id": "1", "type": "image", "props": {"url": reference, "caption": "shot"}}
        ]
    });
    fs::write(root.join(path), doc.to_string()).unwrap();
}

#[tokio::test]
async fn single_connection_upload_then_index_never_fails() {
    let (_tmp, pool, indexer) = setup(1).await;
    let root = indexer.vault().root().to_path_buf();

    for i in 0..100 {
        let bytes = format!("asset body {}", i);
        let asset = indexer.register_asset(bytes.as_bytes(), "png").await.unwrap();

        let path = format!("projects/@race/doc-{:03}.json", i);
        write_doc_with_image(&root, &path, &asset.reference);
        let report = indexer.index_document(&path).await.unwrap();

        assert_eq!(report.assets_linked, 1, "pair {} lost its asset link", i);
        assert_eq!(report.assets_pending, 0);
    }

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doc_asset")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(links, 100);
    assert!(indexer.stores().assets.pending(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn single_connection_serializes_writers() {
    let (_tmp, pool, _indexer) = setup(1).await;

    let tx = pool.begin().await.unwrap();
    // The only connection is held by the open unit of work, so a second
    // writer cannot interleave with it.
    let second = tokio::time::timeout(Duration::from_millis(200), pool.acquire()).await;
    assert!(second.is_err());

    drop(tx);
    let conn = tokio::time::timeout(Duration::from_secs(5), pool.acquire()).await;
    assert!(conn.is_ok());
}

#[tokio::test]
async fn ten_connections_expose_visibility_race() {
    let (_tmp, pool, indexer) = setup(10).await;
    let root = indexer.vault().root().to_path_buf();
    let stores = Stores::new(pool.clone());

    let path = "projects/@race/doc-racy.json";
    fs::write(
        root.join(path),
        json!({"meta": {"title": "racy"}, "blocks": []}).to_string(),
    )
    .unwrap();
    indexer.index_document(path).await.unwrap();

    // Index transaction opens its snapshot on one connection...
    let mut tx = pool.begin().await.unwrap();
    let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM asset")
        .fetch_one(&mut *tx)
        .await
        .unwrap();
    assert_eq!(before, 0);

    // ...while the upload commits on another.
    let asset = indexer.register_asset(b"racing upload", "png").await.unwrap();
    let hash = asset.asset.hash;

    // The committed asset is invisible inside the older snapshot.
    assert!(!stores.assets.exists_tx(&mut tx, &hash).await.unwrap());
    assert_eq!(
        stores.assets.link_to_doc_tx(&mut tx, path, &hash, None).await.unwrap(),
        AssetLink::NotVisible
    );

    // A writer that trusts the asset exists fails hard: the stale read
    // snapshot cannot be upgraded to a write lock once another connection
    // has committed, so SQLite rejects the insert with SQLITE_BUSY_SNAPSHOT
    // before any constraint is checked. Busy timeouts do not retry it.
    let insert = sqlx::query("INSERT INTO doc_asset (doc_path, asset_hash) VALUES (?, ?)")
        .bind(path)
        .bind(&hash)
        .execute(&mut *tx)
        .await;
    let err = insert.expect_err("insert on a stale snapshot must fail");
    let code = err
        .as_database_error()
        .and_then(|e| e.code())
        .map(|c| c.into_owned());
    assert_eq!(code.as_deref(), Some(SQLITE_BUSY_SNAPSHOT), "unexpected error: {:?}", err);
    drop(tx);

    // Once both sides have committed, the late link repairs the association.
    assert_eq!(
        indexer.late_link_asset(path, &hash).await.unwrap(),
        AssetLink::Linked
    );
}
