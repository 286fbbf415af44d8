//! Index stores.
//!
//! One store per derived index. Every write comes in two forms:
//!
//! | Form | Transaction |
//! |------|-------------|
//! | `op(..)` | opens, commits and (on error) rolls back its own |
//! | `op_tx(conn, ..)` | runs on a caller-supplied unit of work |
//!
//! The `_tx` forms take `&mut SqliteConnection`, which both a
//! [`UnitOfWork`](crate::db::UnitOfWork) and a pooled connection deref to, so
//! the Indexer can compose writes from several stores into one commit.
//!
//! Reads skip soft-deleted rows unless `include_deleted` is set.
//!
//! Stores only hold a clone of the pool. Code that has a unit of work open
//! must use the `_tx` forms: with the single-connection pool a direct call
//! would wait for the connection the unit of work is holding.

pub mod asset;
pub mod doc;
pub mod fts;
pub mod kv;
pub mod link;
pub mod project;
pub mod tag;

pub use asset::{AssetLink, AssetStore, PendingAssetLink};
pub use doc::DocStore;
pub use fts::FtsStore;
pub use kv::KvStore;
pub use link::LinkStore;
pub use project::ProjectStore;
pub use tag::{normalize_tag, TagStore};

use sqlx::SqlitePool;

/// Every index store, sharing one pool.
#[derive(Clone)]
pub struct Stores {
    pub docs: DocStore,
    pub fts: FtsStore,
    pub tags: TagStore,
    pub links: LinkStore,
    pub assets: AssetStore,
    pub projects: ProjectStore,
    pub kv: KvStore,
}

impl Stores {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            docs: DocStore::new(pool.clone()),
            fts: FtsStore::new(pool.clone()),
            tags: TagStore::new(pool.clone()),
            links: LinkStore::new(pool.clone()),
            assets: AssetStore::new(pool.clone()),
            projects: ProjectStore::new(pool.clone()),
            kv: KvStore::new(pool),
        }
    }
}

pub(crate) fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
