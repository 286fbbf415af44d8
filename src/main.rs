//! # Vault Index CLI (`vix`)
//!
//! ## Usage
//!
//! ```bash
//! vix --config ./config/vix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vix init` | Create the SQLite database and the derived schema |
//! | `vix check` | Run the database integrity check |
//! | `vix scan` | Index every document in the vault |
//! | `vix index <path>` | Reindex one document |
//! | `vix remove <path>` | Remove a document from search (or entirely) |
//! | `vix clear` | Empty the index |
//! | `vix search "<query>"` | Full-text search |
//! | `vix doc <path>` | Show one indexed document |
//! | `vix tags` / `vix projects` / `vix stats` | Listings and counts |
//! | `vix asset add/link` | Register assets and attach them to documents |
//! | `vix reconcile` | Attach pending asset references |
//! | `vix sync now/run` | Commit vault changes to git |

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use vault_index::progress::ProgressMode;
use vault_index::{config, db, get, ingest, logging, migrate, search, stats, sync_cmd};

/// Vault Index: indexing and git auto-sync for a JSON note vault.
#[derive(Parser)]
#[command(name = "vix", version, about = "Vault Index: indexing and git auto-sync for a JSON note vault")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and apply the schema. Idempotent.
    Init,

    /// Run the database integrity check.
    Check,

    /// Reconcile projects and index every document in the vault.
    Scan {
        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Clear the index before scanning.
        #[arg(long)]
        fresh: bool,
    },

    /// Reindex one document (logical path, e.g. `projects/@proj/doc-1.json`).
    Index { path: String },

    /// Remove a document from search; its record is kept.
    Remove {
        path: String,

        /// Also delete the document record and all its associations.
        #[arg(long)]
        completely: bool,
    },

    /// Delete every full-text entry and document record.
    Clear,

    /// Full-text search.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show an indexed document with its tags, links and assets.
    Doc {
        path: String,

        #[arg(long)]
        json: bool,
    },

    /// List tags with usage counts.
    Tags,

    /// List projects with document counts.
    Projects,

    /// Index statistics.
    Stats,

    /// Register and link assets.
    Asset {
        #[command(subcommand)]
        action: AssetAction,
    },

    /// Attach pending asset references whose asset is now registered.
    Reconcile,

    /// Commit vault changes to git.
    Sync {
        #[command(subcommand)]
        action: SyncAction,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum AssetAction {
    /// Copy a file into the vault's content-addressed asset store.
    Add {
        file: PathBuf,

        /// Document to link the asset to.
        #[arg(long)]
        doc: Option<String>,
    },

    /// Link a registered asset to a document.
    Link { doc: String, hash: String },
}

#[derive(Subcommand)]
enum SyncAction {
    /// Stage and commit pending vault changes immediately.
    Now,

    /// Scan, then keep the auto-commit loop running until Ctrl-C.
    Run {
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "vix", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Check => {
            let pool = db::open(&cfg).await?;
            pool.close().await;
            println!("ok");
        }
        Commands::Scan { progress, fresh } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_scan(&cfg, mode, fresh).await?;
        }
        Commands::Index { path } => ingest::run_index(&cfg, &path).await?,
        Commands::Remove { path, completely } => ingest::run_remove(&cfg, &path, completely).await?,
        Commands::Clear => ingest::run_clear(&cfg).await?,
        Commands::Search { query, limit } => search::run_search(&cfg, &query, limit).await?,
        Commands::Doc { path, json } => get::run_get(&cfg, &path, json).await?,
        Commands::Tags => stats::run_tags(&cfg).await?,
        Commands::Projects => stats::run_projects(&cfg).await?,
        Commands::Stats => stats::run_stats(&cfg).await?,
        Commands::Asset { action } => match action {
            AssetAction::Add { file, doc } => ingest::run_asset_add(&cfg, &file, doc.as_deref()).await?,
            AssetAction::Link { doc, hash } => ingest::run_asset_link(&cfg, &doc, &hash).await?,
        },
        Commands::Reconcile => ingest::run_reconcile(&cfg).await?,
        Commands::Sync { action } => match action {
            SyncAction::Now => sync_cmd::run_sync_now(&cfg).await?,
            SyncAction::Run { progress } => {
                let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
                sync_cmd::run_sync_loop(&cfg, mode).await?;
            }
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}
