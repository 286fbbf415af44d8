//! TOML configuration.
//!
//! Only `[db]` and `[vault]` are required; `[sync]` and `[logging]` fall
//! back to defaults. See `load_config` for the validation rules.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub vault: VaultConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Pool size. Anything other than 1 re-opens the cross-connection
    /// visibility race between asset registration and indexing.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_commit_interval_secs")]
    pub commit_interval_secs: u64,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default)]
    pub auto_push: bool,
    #[serde(default)]
    pub fetch_before_commit: bool,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            commit_interval_secs: default_commit_interval_secs(),
            check_interval_secs: default_check_interval_secs(),
            auto_push: false,
            fetch_before_commit: false,
            remote: default_remote(),
            branch: default_branch(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

impl SyncConfig {
    pub fn commit_interval(&self) -> Duration {
        Duration::from_secs(self.commit_interval_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn default_true() -> bool {
    true
}
fn default_commit_interval_secs() -> u64 {
    300
}
fn default_check_interval_secs() -> u64 {
    30
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_author_name() -> String {
    "vault-index".to_string()
}
fn default_author_email() -> String {
    "vault-index@localhost".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    if config.sync.check_interval_secs == 0 {
        anyhow::bail!("sync.check_interval_secs must be >= 1");
    }

    if config.sync.remote.trim().is_empty() {
        anyhow::bail!("sync.remote must not be empty");
    }

    Ok(config)
}
