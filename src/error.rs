//! Error taxonomy for the library.
//!
//! Each layer has its own enum; the Indexer wraps lower-level errors in an
//! [`IndexError`] variant naming the stage that failed, so callers never see
//! raw transaction mechanics. Git errors live in [`crate::git`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project metadata {}: {source}", path.display())]
    ProjectMeta {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl VaultError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True when the underlying cause is a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Structural document failures. Odd or missing fields never produce one.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document root must be a JSON object")]
    NotAnObject,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: VaultError,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: VaultError,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },

    #[error("{action} transaction for {path}: {source}")]
    Transaction {
        path: String,
        action: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("{store} store failed for {path}: {source}")]
    Store {
        store: &'static str,
        path: String,
        #[source]
        source: StoreError,
    },
}

impl IndexError {
    /// The document (or pseudo-path such as `*`) the failure belongs to.
    pub fn path(&self) -> &str {
        match self {
            IndexError::Read { path, .. }
            | IndexError::Write { path, .. }
            | IndexError::Parse { path, .. }
            | IndexError::Transaction { path, .. }
            | IndexError::Store { path, .. } => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database integrity check failed: {0}")]
    Corrupt(String),

    #[error("preparing database directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_names_stage_and_path() {
        let err = IndexError::Store {
            store: "tag",
            path: "projects/@p/a.json".to_string(),
            source: StoreError::InvalidInput("bad".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("tag store failed for projects/@p/a.json"));
        assert_eq!(err.path(), "projects/@p/a.json");
    }

    #[test]
    fn not_found_detection() {
        let err = VaultError::io(
            "reading",
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        let err = VaultError::InvalidPath {
            path: "../x".to_string(),
            reason: "traversal",
        };
        assert!(!err.is_not_found());
    }
}
