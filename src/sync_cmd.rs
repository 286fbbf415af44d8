//! `vix sync` commands.
//!
//! `sync now` commits whatever is uncommitted in the vault immediately.
//! `sync run` scans the vault with the Sync Manager attached and keeps the
//! tick loop running until Ctrl-C.

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db;
use crate::git::{GitRepo, VersionControl};
use crate::indexer::Indexer;
use crate::ingest::cancel_on_ctrl_c;
use crate::progress::ProgressMode;
use crate::store::KvStore;
use crate::sync::{ChangeNotifier, SyncManager, SyncOutcome};
use crate::vault::Vault;

async fn build_manager(config: &Config) -> Result<(sqlx::SqlitePool, Arc<SyncManager>)> {
    if !config.sync.enabled {
        bail!("sync is disabled ([sync] enabled = false)");
    }
    let pool = db::open(config).await?;
    let vcs: Arc<dyn VersionControl> = Arc::new(GitRepo::from_config(&config.vault.root, &config.sync));
    let manager = SyncManager::new(config.sync.clone(), vcs, KvStore::new(pool.clone())).await;
    Ok((pool, Arc::new(manager)))
}

fn print_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Committed { message, pushed, .. } => {
            println!("committed: {}", message);
            println!("  pushed: {}", pushed);
        }
        SyncOutcome::Clean => println!("nothing to commit"),
        SyncOutcome::NotRepository => println!("vault is not a git repository; nothing synced"),
        SyncOutcome::Failed(kind) => {
            println!("sync failed ({})", kind);
            println!("  {}", kind.remediation());
        }
        other => println!("{:?}", other),
    }
}

pub async fn run_sync_now(config: &Config) -> Result<()> {
    let (pool, manager) = build_manager(config).await?;
    manager.notify_change("manual sync");
    let outcome = manager.sync_now().await;
    manager.shutdown().await;
    pool.close().await;

    print_outcome(&outcome);
    if let SyncOutcome::Failed(kind) = outcome {
        bail!("git sync failed: {}", kind);
    }
    Ok(())
}

pub async fn run_sync_loop(config: &Config, progress: ProgressMode) -> Result<()> {
    let (pool, manager) = build_manager(config).await?;
    manager.start();

    let notifier: Arc<dyn ChangeNotifier> = manager.clone();
    let indexer = Indexer::new(pool.clone(), Vault::new(&config.vault.root)).with_notifier(notifier);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let reporter = progress.reporter();
    let summary = indexer
        .scan_and_index_vault(reporter.as_ref(), &cancel)
        .await?;
    println!(
        "scanned {} document(s); sync loop running every {}s, Ctrl-C to stop",
        summary.indexed, config.sync.check_interval_secs
    );

    cancel.cancelled().await;

    manager.shutdown().await;
    let status = manager.status();
    if status.pending > 0 {
        println!("stopped with {} unsynced change(s)", status.pending);
    }
    pool.close().await;
    Ok(())
}
