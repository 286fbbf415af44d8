//! # Vault Index
//!
//! Indexing and consistency engine for a vault of JSON note documents.
//!
//! Every document file under `projects/@<alias>/` is the source of truth.
//! The Indexer parses it and keeps a set of derived SQLite indexes (document
//! record, FTS5 entry, tags, links, assets) consistent with it, one
//! transaction per document. A Sync Manager batches change notifications
//! into periodic git commits of the vault.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐
//! │  Vault  │──▶│  Parser  │──▶│ Indexer  │──▶│ Index Stores │
//! │ (files) │   │ (blocks) │   │ (1 tx)   │   │ SQLite+FTS5  │
//! └─────────┘   └──────────┘   └────┬─────┘   └──────────────┘
//!                                   │ notify_change
//!                                   ▼
//!                            ┌──────────────┐   ┌─────────┐
//!                            │ Sync Manager │──▶│   git   │
//!                            └──────────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vix init                      # create database
//! vix scan                      # index every document in the vault
//! vix search "deployment"
//! vix sync run                  # scan, then auto-commit in the background
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Error taxonomy |
//! | [`db`] | Connection pool (single-writer policy) |
//! | [`migrate`] | Derived schema |
//! | [`models`] | Core data types |
//! | [`vault`] | On-disk vault access |
//! | [`parser`] | Block-tree content extraction |
//! | [`store`] | Index stores |
//! | [`indexer`] | Per-document indexing, vault scan, asset linking |
//! | [`progress`] | Reindex progress reporting |
//! | [`git`] | Git subprocess runner |
//! | [`sync`] | Auto-commit state machine |

pub mod config;
pub mod db;
pub mod error;
pub mod get;
pub mod git;
pub mod indexer;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod progress;
pub mod search;
pub mod stats;
pub mod store;
pub mod sync;
pub mod sync_cmd;
pub mod vault;
