//! Git subprocess runner for the vault repository.
//!
//! Every call shells out to `git` through `tokio::process` with a hard
//! timeout; the child is killed when the timeout fires or the future is
//! dropped. Failures are classified from the subprocess output into a
//! [`GitErrorKind`] so callers can tell "retry later" apart from "needs a
//! human".

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::SyncConfig;

pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(10);
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GitErrorKind {
    /// Not a repository, missing remote, missing identity, sync disabled.
    Configuration,
    MergeConflict,
    Diverged,
    UnrelatedHistories,
    PushRejected,
    Network,
    Timeout,
    NothingToCommit,
    AlreadyUpToDate,
    Other,
}

impl GitErrorKind {
    /// Classify combined stdout/stderr of a failed git invocation.
    pub fn classify(output: &str) -> Self {
        let text = output.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        if has(&["nothing to commit", "nothing added to commit", "no changes added to commit"]) {
            GitErrorKind::NothingToCommit
        } else if has(&["already up to date", "already up-to-date", "everything up-to-date"]) {
            GitErrorKind::AlreadyUpToDate
        } else if has(&["refusing to merge unrelated histories"]) {
            GitErrorKind::UnrelatedHistories
        } else if has(&["merge conflict", "automatic merge failed", "fix conflicts", "unmerged files", "conflict ("]) {
            GitErrorKind::MergeConflict
        } else if has(&["have diverged", "divergent branches", "need to specify how to reconcile"]) {
            GitErrorKind::Diverged
        } else if has(&["[rejected]", "non-fast-forward", "updates were rejected", "failed to push some refs"]) {
            GitErrorKind::PushRejected
        } else if has(&[
            "not a git repository",
            "does not appear to be a git repository",
            "no such remote",
            "please tell me who you are",
            "sync is disabled",
        ]) {
            GitErrorKind::Configuration
        } else if has(&[
            "could not resolve host",
            "could not read from remote",
            "unable to access",
            "connection refused",
            "connection timed out",
            "operation timed out",
            "network is unreachable",
        ]) {
            GitErrorKind::Network
        } else {
            GitErrorKind::Other
        }
    }

    pub fn remediation(&self) -> &'static str {
        match self {
            GitErrorKind::Configuration => {
                "Check that the vault is a git repository with the configured remote and a commit identity."
            }
            GitErrorKind::MergeConflict => {
                "Resolve the conflicting files in the vault, commit the result, then sync again."
            }
            GitErrorKind::Diverged => {
                "Local and remote history have diverged. Pull and reconcile manually before syncing."
            }
            GitErrorKind::UnrelatedHistories => {
                "The remote has an unrelated history. Check the remote URL or merge the histories manually."
            }
            GitErrorKind::PushRejected => {
                "The remote rejected the push. Pull the remote changes, resolve them, then push again."
            }
            GitErrorKind::Network => "The remote could not be reached. Sync will retry later.",
            GitErrorKind::Timeout => {
                "Git did not finish in time and was stopped. The operation may or may not have completed; \
                 check the repository state before retrying."
            }
            GitErrorKind::NothingToCommit => "No changes to commit.",
            GitErrorKind::AlreadyUpToDate => "Already up to date.",
            GitErrorKind::Other => "Git failed unexpectedly. Sync will retry later.",
        }
    }

    /// Kinds worth retrying on the next interval. Conflicts never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitErrorKind::Network | GitErrorKind::Timeout | GitErrorKind::Other
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            GitErrorKind::NothingToCommit | GitErrorKind::AlreadyUpToDate
        )
    }
}

impl fmt::Display for GitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GitErrorKind::Configuration => "configuration",
            GitErrorKind::MergeConflict => "merge conflict",
            GitErrorKind::Diverged => "diverged branches",
            GitErrorKind::UnrelatedHistories => "unrelated histories",
            GitErrorKind::PushRejected => "push rejected",
            GitErrorKind::Network => "network",
            GitErrorKind::Timeout => "timeout",
            GitErrorKind::NothingToCommit => "nothing to commit",
            GitErrorKind::AlreadyUpToDate => "already up to date",
            GitErrorKind::Other => "failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
#[error("git {op} failed ({kind}): {detail}")]
pub struct GitError {
    pub kind: GitErrorKind,
    pub op: &'static str,
    pub detail: String,
}

impl GitError {
    pub fn new(kind: GitErrorKind, op: &'static str, detail: impl Into<String>) -> Self {
        Self {
            kind,
            op,
            detail: detail.into(),
        }
    }

    fn timeout(op: &'static str, limit: Duration) -> Self {
        Self::new(
            GitErrorKind::Timeout,
            op,
            format!("timed out after {}s and was killed", limit.as_secs()),
        )
    }

    pub fn remediation(&self) -> &'static str {
        self.kind.remediation()
    }
}

/// The version-control operations the sync manager needs.
#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn is_repository(&self) -> bool;
    async fn has_remote(&self, remote: &str) -> bool;
    async fn fetch(&self, remote: &str) -> Result<(), GitError>;
    async fn stage_all(&self) -> Result<(), GitError>;
    /// True when `status --porcelain` reports nothing.
    async fn is_clean(&self) -> Result<bool, GitError>;
    async fn commit(&self, message: &str) -> Result<(), GitError>;
    async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError>;
}

/// A git working tree driven through the `git` binary.
pub struct GitRepo {
    root: PathBuf,
    author_name: String,
    author_email: String,
    line_endings: OnceCell<()>,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>, author_name: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            author_name: author_name.into(),
            author_email: author_email.into(),
            line_endings: OnceCell::new(),
        }
    }

    pub fn from_config(root: impl Into<PathBuf>, sync: &SyncConfig) -> Self {
        Self::new(root, sync.author_name.clone(), sync.author_email.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn run(&self, op: &'static str, args: &[&str], limit: Duration) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        debug!(op, ?args, "running git");
        let child = cmd
            .spawn()
            .map_err(|e| GitError::new(GitErrorKind::Configuration, op, format!("cannot run git: {}", e)))?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(GitError::new(GitErrorKind::Other, op, e.to_string())),
            Err(_) => return Err(GitError::timeout(op, limit)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
        let kind = GitErrorKind::classify(&combined);
        if kind.is_success() {
            debug!(op, %kind, "git reported benign status");
            return Ok(stdout);
        }
        Err(GitError::new(kind, op, combined.trim().to_string()))
    }

    /// Force LF line endings once per repository handle.
    async fn ensure_line_endings(&self) -> Result<(), GitError> {
        self.line_endings
            .get_or_try_init(|| async {
                for (key, value) in [
                    ("core.autocrlf", "false"),
                    ("core.eol", "lf"),
                    ("core.safecrlf", "false"),
                ] {
                    self.config_set(key, value).await?;
                }
                Ok::<(), GitError>(())
            })
            .await?;
        Ok(())
    }

    pub async fn init(&self, branch: &str) -> Result<(), GitError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| GitError::new(GitErrorKind::Configuration, "init", e.to_string()))?;
        self.run("init", &["init"], LOCAL_TIMEOUT).await?;
        let head = format!("refs/heads/{}", branch);
        self.run("init", &["symbolic-ref", "HEAD", &head], LOCAL_TIMEOUT)
            .await?;
        self.ensure_line_endings().await
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.run("config", &["config", key, value], LOCAL_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn add_all(&self) -> Result<(), GitError> {
        self.ensure_line_endings().await?;
        self.run("add", &["add", "-A"], LOCAL_TIMEOUT).await.map(|_| ())
    }

    pub async fn status_porcelain(&self) -> Result<String, GitError> {
        self.run("status", &["status", "--porcelain"], STATUS_TIMEOUT)
            .await
    }

    pub async fn commit_all_staged(&self, message: &str) -> Result<(), GitError> {
        self.ensure_line_endings().await?;
        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        self.run(
            "commit",
            &["-c", &name, "-c", &email, "commit", "-m", message],
            LOCAL_TIMEOUT,
        )
        .await
        .map(|_| ())
    }

    pub async fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        self.run("rev-parse", &["rev-parse", rev], STATUS_TIMEOUT)
            .await
            .map(|s| s.trim().to_string())
    }

    pub async fn remotes(&self) -> Result<Vec<String>, GitError> {
        let out = self.run("remote", &["remote"], STATUS_TIMEOUT).await?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    pub async fn remote_add(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.run("remote add", &["remote", "add", name, url], LOCAL_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn remote_set_url(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.run("remote set-url", &["remote", "set-url", name, url], LOCAL_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn pull(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.ensure_line_endings().await?;
        self.run(
            "pull",
            &["pull", "--no-rebase", "--no-edit", remote, branch],
            REMOTE_TIMEOUT,
        )
        .await
        .map(|_| ())
    }

    pub async fn fetch_remote(&self, remote: &str) -> Result<(), GitError> {
        self.run("fetch", &["fetch", remote], REMOTE_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn push_branch(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.run("push", &["push", remote, &refspec], REMOTE_TIMEOUT)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl VersionControl for GitRepo {
    async fn is_repository(&self) -> bool {
        self.root.join(".git").exists()
    }

    async fn has_remote(&self, remote: &str) -> bool {
        match self.remotes().await {
            Ok(remotes) => remotes.iter().any(|r| r == remote),
            Err(_) => false,
        }
    }

    async fn fetch(&self, remote: &str) -> Result<(), GitError> {
        self.fetch_remote(remote).await
    }

    async fn stage_all(&self) -> Result<(), GitError> {
        self.add_all().await
    }

    async fn is_clean(&self) -> Result<bool, GitError> {
        Ok(self.status_porcelain().await?.trim().is_empty())
    }

    async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.commit_all_staged(message).await
    }

    async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.push_branch(remote, branch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_outputs() {
        let cases = [
            ("On branch main\nnothing to commit, working tree clean", GitErrorKind::NothingToCommit),
            ("Already up to date.", GitErrorKind::AlreadyUpToDate),
            ("Everything up-to-date", GitErrorKind::AlreadyUpToDate),
            ("fatal: refusing to merge unrelated histories", GitErrorKind::UnrelatedHistories),
            (
                "CONFLICT (content): Merge conflict in a.json\nAutomatic merge failed; fix conflicts",
                GitErrorKind::MergeConflict,
            ),
            (
                "hint: You have divergent branches and need to specify how to reconcile them.",
                GitErrorKind::Diverged,
            ),
            (
                " ! [rejected]        main -> main (non-fast-forward)\nerror: failed to push some refs",
                GitErrorKind::PushRejected,
            ),
            (
                "fatal: not a git repository (or any of the parent directories): .git",
                GitErrorKind::Configuration,
            ),
            (
                "fatal: 'origin' does not appear to be a git repository\nfatal: Could not read from remote repository.",
                GitErrorKind::Configuration,
            ),
            (
                "fatal: unable to access 'https://x/': Could not resolve host: x",
                GitErrorKind::Network,
            ),
            ("error: something odd", GitErrorKind::Other),
        ];
        for (output, expected) in cases {
            assert_eq!(GitErrorKind::classify(output), expected, "{}", output);
        }
    }

    #[test]
    fn retry_and_success_policy() {
        assert!(GitErrorKind::Network.is_retryable());
        assert!(GitErrorKind::Timeout.is_retryable());
        assert!(GitErrorKind::Other.is_retryable());
        assert!(!GitErrorKind::MergeConflict.is_retryable());
        assert!(!GitErrorKind::Diverged.is_retryable());
        assert!(!GitErrorKind::PushRejected.is_retryable());

        assert!(GitErrorKind::NothingToCommit.is_success());
        assert!(GitErrorKind::AlreadyUpToDate.is_success());
        assert!(!GitErrorKind::Network.is_success());
    }

    #[test]
    fn timeout_is_distinct() {
        let err = GitError::timeout("push", REMOTE_TIMEOUT);
        assert_eq!(err.kind, GitErrorKind::Timeout);
        assert_eq!(err.to_string(), "git push failed (timeout): timed out after 30s and was killed");
        assert_ne!(err.remediation(), GitErrorKind::Network.remediation());
        assert_ne!(err.remediation(), GitErrorKind::Other.remediation());
    }

    #[tokio::test]
    async fn non_repository_is_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = GitRepo::new(tmp.path(), "t", "t@example.com");
        assert!(!repo.is_repository().await);
    }
}
