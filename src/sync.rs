//! Sync Manager: batches change notifications into periodic git commits.
//!
//! ```text
//!   notify_change            tick (interval elapsed)
//! Idle ───────────▶ Pending ─────────────────────▶ Syncing ──▶ Idle | Pending
//!   │                  │                               │
//!   └──────────────────┴────────── shutdown ───────────┴──▶ Closed
//! ```
//!
//! All transitions go through one mutex. It is never held across an
//! `.await`; a sync takes the pending batch, releases the lock, talks to
//! git, then re-acquires it to settle the phase.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::git::{GitErrorKind, VersionControl};
use crate::store::KvStore;

/// Key under which the last successful auto-commit time is stored.
pub const LAST_AUTO_SYNC_KEY: &str = "last_auto_sync";

/// `interval_at` panics on a zero period.
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Receives "something changed" notifications from write paths.
pub trait ChangeNotifier: Send + Sync {
    fn notify_change(&self, reason: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Pending,
    Syncing,
    Closed,
}

#[derive(Clone, Debug, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub pending: usize,
    pub last_commit: Option<DateTime<Utc>>,
}

/// What one evaluation of the sync loop did.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncOutcome {
    Closed,
    /// Another sync is in flight.
    Busy,
    NothingPending,
    /// Pending, but the commit interval has not elapsed yet.
    Waiting,
    /// The vault is not a git repository; the batch was dropped.
    NotRepository,
    /// Staging left a clean tree; pending state cleared without a commit.
    Clean,
    Committed {
        message: String,
        pushed: bool,
        at: DateTime<Utc>,
    },
    /// Staging or committing failed. Retryable kinds re-queue the batch;
    /// the rest drop it until a new change arrives.
    Failed(GitErrorKind),
}

struct SyncState {
    phase: SyncPhase,
    pending: Vec<String>,
    last_commit: Option<DateTime<Utc>>,
}

pub struct SyncManager {
    config: SyncConfig,
    vcs: Arc<dyn VersionControl>,
    kv: KvStore,
    state: Mutex<SyncState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    /// Build a manager, loading the persisted last commit time.
    pub async fn new(config: SyncConfig, vcs: Arc<dyn VersionControl>, kv: KvStore) -> Self {
        let last_commit = match kv.get(LAST_AUTO_SYNC_KEY).await {
            Ok(Some(raw)) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    warn!(value = %raw, error = %e, "ignoring malformed last_auto_sync");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not load last_auto_sync");
                None
            }
        };

        Self {
            config,
            vcs,
            kv,
            state: Mutex::new(SyncState {
                phase: SyncPhase::Idle,
                pending: Vec::new(),
                last_commit,
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the fixed-interval tick loop. No-op when sync is disabled or
    /// the loop is already running.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            debug!("sync disabled; not starting tick loop");
            return;
        }
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() || self.state().phase == SyncPhase::Closed {
            return;
        }

        let this = Arc::clone(self);
        let period = self.config.check_interval().max(MIN_CHECK_INTERVAL);
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let outcome = this.tick().await;
                        debug!(?outcome, "sync tick");
                    }
                }
            }
        }));
        info!(check_interval_secs = period.as_secs(), "sync loop started");
    }

    pub fn notify_change(&self, reason: &str) {
        if !self.config.enabled {
            return;
        }
        let mut st = self.state();
        match st.phase {
            SyncPhase::Closed => return,
            SyncPhase::Idle => st.phase = SyncPhase::Pending,
            SyncPhase::Pending | SyncPhase::Syncing => {}
        }
        st.pending.push(reason.to_string());
    }

    pub fn status(&self) -> SyncStatus {
        let st = self.state();
        SyncStatus {
            phase: st.phase,
            pending: st.pending.len(),
            last_commit: st.last_commit,
        }
    }

    /// One evaluation of the loop, honouring the commit interval.
    pub async fn tick(&self) -> SyncOutcome {
        self.evaluate(false).await
    }

    /// Sync whatever is pending now, ignoring the commit interval.
    pub async fn sync_now(&self) -> SyncOutcome {
        self.evaluate(true).await
    }

    async fn evaluate(&self, force: bool) -> SyncOutcome {
        let batch = {
            let mut st = self.state();
            match st.phase {
                SyncPhase::Closed => return SyncOutcome::Closed,
                SyncPhase::Syncing => return SyncOutcome::Busy,
                SyncPhase::Idle | SyncPhase::Pending => {}
            }
            if st.pending.is_empty() {
                return SyncOutcome::NothingPending;
            }
            if !force {
                if let Some(last) = st.last_commit {
                    let elapsed = Utc::now().signed_duration_since(last);
                    if elapsed.to_std().unwrap_or_default() < self.config.commit_interval() {
                        return SyncOutcome::Waiting;
                    }
                }
            }
            st.phase = SyncPhase::Syncing;
            std::mem::take(&mut st.pending)
        };

        let outcome = self.perform_sync(&batch).await;

        let mut st = self.state();
        match &outcome {
            SyncOutcome::Committed { at, .. } => st.last_commit = Some(*at),
            SyncOutcome::Failed(kind) if kind.is_retryable() => {
                let newer = std::mem::replace(&mut st.pending, batch);
                st.pending.extend(newer);
            }
            SyncOutcome::Failed(kind) => {
                error!(
                    %kind,
                    changes = batch.len(),
                    remediation = kind.remediation(),
                    "sync needs manual resolution; dropping batch"
                );
            }
            _ => {}
        }
        if st.phase != SyncPhase::Closed {
            st.phase = if st.pending.is_empty() {
                SyncPhase::Idle
            } else {
                SyncPhase::Pending
            };
        }
        outcome
    }

    async fn perform_sync(&self, batch: &[String]) -> SyncOutcome {
        if !self.vcs.is_repository().await {
            debug!(changes = batch.len(), "vault is not a git repository; skipping sync");
            return SyncOutcome::NotRepository;
        }

        let remote = self.config.remote.as_str();
        if self.config.fetch_before_commit && self.vcs.has_remote(remote).await {
            if let Err(e) = self.vcs.fetch(remote).await {
                warn!(error = %e, "fetch failed; committing offline");
            }
        }

        if let Err(e) = self.vcs.stage_all().await {
            error!(error = %e, remediation = e.remediation(), "staging failed");
            return SyncOutcome::Failed(e.kind);
        }

        match self.vcs.is_clean().await {
            Ok(true) => {
                debug!(changes = batch.len(), "working tree clean after staging");
                return SyncOutcome::Clean;
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, remediation = e.remediation(), "status failed");
                return SyncOutcome::Failed(e.kind);
            }
        }

        let message = commit_message(batch);
        if let Err(e) = self.vcs.commit(&message).await {
            error!(error = %e, remediation = e.remediation(), "commit failed");
            return SyncOutcome::Failed(e.kind);
        }
        let at = Utc::now();
        info!(%message, "auto-committed vault changes");

        if let Err(e) = self.kv.set(LAST_AUTO_SYNC_KEY, &at.to_rfc3339()).await {
            warn!(error = %e, "could not persist last_auto_sync");
        }

        let mut pushed = false;
        if self.config.auto_push && self.vcs.has_remote(remote).await {
            match self.vcs.push(remote, &self.config.branch).await {
                Ok(()) => pushed = true,
                Err(e) => {
                    warn!(error = %e, remediation = e.remediation(), "push failed; commit kept locally")
                }
            }
        }

        SyncOutcome::Committed { message, pushed, at }
    }

    /// Close the manager exactly once and stop the tick loop. Pending
    /// changes are abandoned.
    pub async fn shutdown(&self) {
        {
            let mut st = self.state();
            if st.phase == SyncPhase::Closed {
                return;
            }
            if !st.pending.is_empty() {
                warn!(pending = st.pending.len(), "shutting down with unsynced changes");
            }
            st.phase = SyncPhase::Closed;
        }
        self.cancel.cancel();

        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "sync loop ended abnormally");
            }
        }
    }
}

impl ChangeNotifier for SyncManager {
    fn notify_change(&self, reason: &str) {
        SyncManager::notify_change(self, reason)
    }
}

/// `auto: <reason>` for a single change, `auto: N changes` otherwise.
pub fn commit_message(reasons: &[String]) -> String {
    match reasons {
        [only] => format!("auto: {}", only),
        _ => format!("auto: {} changes", reasons.len()),
    }
}
