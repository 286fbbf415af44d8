//! On-disk vault access.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   projects/
//!     @<alias>/
//!       .project.json        optional project metadata
//!       <name>.json          document files (nested folders allowed)
//!   assets/
//!     <sha256>.<ext>         content-addressed assets
//! ```
//!
//! Document paths handed to the rest of the crate are logical:
//! relative to the root, `/`-separated, e.g. `projects/@proj/doc-1.json`.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::VaultError;

pub const PROJECTS_DIR: &str = "projects";
pub const ASSETS_DIR: &str = "assets";
pub const PROJECT_META_FILE: &str = ".project.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mtime_ns: i64,
    pub size_bytes: i64,
}

/// A project directory found under `projects/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDir {
    pub alias: String,
    pub dir_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub hash: String,
    pub ext: String,
    pub size_bytes: i64,
    /// Logical reference path, e.g. `assets/<hash>.png`.
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects_root(&self) -> PathBuf {
        self.root.join(PROJECTS_DIR)
    }

    /// Check a logical document path and map it to its file.
    ///
    /// Rejects traversal segments, absolute paths, backslashes, non-JSON
    /// files and anything outside `projects/@<alias>/`. When the file exists
    /// its canonical location must also stay under the projects root, which
    /// catches symlinks pointing out of the vault.
    pub fn resolve_document(&self, path: &str) -> Result<PathBuf, VaultError> {
        validate_document_path(path)?;
        let full = self.root.join(path);

        if full.exists() {
            let canonical = full
                .canonicalize()
                .map_err(|e| VaultError::io("resolving", &full, e))?;
            let projects = self
                .projects_root()
                .canonicalize()
                .map_err(|e| VaultError::io("resolving", self.projects_root(), e))?;
            if !canonical.starts_with(&projects) {
                return Err(VaultError::InvalidPath {
                    path: path.to_string(),
                    reason: "resolves outside the vault document root",
                });
            }
        }

        Ok(full)
    }

    pub async fn read_document(&self, path: &str) -> Result<String, VaultError> {
        let full = self.resolve_document(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| VaultError::io("reading", full, e))
    }

    pub async fn stat_document(&self, path: &str) -> Result<FileStat, VaultError> {
        let full = self.resolve_document(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| VaultError::io("stat", &full, e))?;
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Ok(FileStat {
            mtime_ns,
            size_bytes: meta.len() as i64,
        })
    }

    /// Project directories under `projects/`, sorted by alias. A missing
    /// `projects/` directory is an empty vault. Only `@<alias>` directories
    /// are projects; anything else is skipped since none of its documents
    /// would pass path validation.
    pub fn list_projects(&self) -> Result<Vec<ProjectDir>, VaultError> {
        let root = self.projects_root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&root).map_err(|e| VaultError::io("listing", &root, e))?;
        let mut projects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VaultError::io("listing", &root, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| VaultError::io("listing", entry.path(), e))?;
            if !file_type.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();
            if dir_name.starts_with('.') {
                continue;
            }
            if !dir_name.starts_with('@') {
                debug!(dir = %dir_name, "skipping project directory without @ prefix");
                continue;
            }
            projects.push(ProjectDir {
                alias: alias_from_dir_name(&dir_name),
                dir_name,
            });
        }
        projects.sort_by(|a, b| a.alias.cmp(&b.alias));
        Ok(projects)
    }

    /// Logical paths of every document file in a project, sorted. Hidden
    /// files and directories are skipped.
    pub fn list_documents(&self, project: &ProjectDir) -> Result<Vec<String>, VaultError> {
        let dir = self.projects_root().join(&project.dir_name);
        let mut docs = Vec::new();

        let walker = WalkDir::new(&dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                VaultError::io("listing", path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let logical = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            docs.push(logical);
        }

        docs.sort();
        Ok(docs)
    }

    pub fn read_project_meta(&self, project: &ProjectDir) -> Result<Option<ProjectMeta>, VaultError> {
        let path = self
            .projects_root()
            .join(&project.dir_name)
            .join(PROJECT_META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| VaultError::io("reading", &path, e))?;
        let meta = serde_json::from_str(&content)
            .map_err(|source| VaultError::ProjectMeta { path, source })?;
        Ok(Some(meta))
    }

    /// Write asset bytes under `assets/<sha256>.<ext>`. Existing content with
    /// the same hash is left in place.
    pub async fn store_asset(&self, bytes: &[u8], ext: &str) -> Result<StoredAsset, VaultError> {
        let ext = normalize_ext(ext).ok_or_else(|| VaultError::InvalidPath {
            path: ext.to_string(),
            reason: "asset extension must be 1-10 alphanumeric characters",
        })?;
        let hash = hex::encode(Sha256::digest(bytes));
        let file_name = format!("{}.{}", hash, ext);
        let dir = self.root.join(ASSETS_DIR);
        let target = dir.join(&file_name);

        if !target.exists() {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| VaultError::io("creating", &dir, e))?;
            let tmp = dir.join(format!(".{}.tmp", file_name));
            tokio::fs::write(&tmp, bytes)
                .await
                .map_err(|e| VaultError::io("writing", &tmp, e))?;
            tokio::fs::rename(&tmp, &target)
                .await
                .map_err(|e| VaultError::io("renaming", &target, e))?;
        }

        Ok(StoredAsset {
            hash,
            ext,
            size_bytes: bytes.len() as i64,
            reference: format!("{}/{}", ASSETS_DIR, file_name),
        })
    }
}

/// Syntactic checks on a logical document path.
pub fn validate_document_path(path: &str) -> Result<(), VaultError> {
    let invalid = |reason: &'static str| VaultError::InvalidPath {
        path: path.to_string(),
        reason,
    };

    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.contains('\\') || path.contains('\0') {
        return Err(invalid("contains a backslash or NUL"));
    }
    if path.starts_with('/') || Path::new(path).is_absolute() {
        return Err(invalid("absolute paths are not allowed"));
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(invalid("contains an empty or traversal segment"));
    }
    if segments.len() < 3 || segments[0] != PROJECTS_DIR || !segments[1].starts_with('@') {
        return Err(invalid("must live under projects/@<alias>/"));
    }
    if !path.ends_with(".json") {
        return Err(invalid("document files must end in .json"));
    }
    if segments.last().is_some_and(|s| s.starts_with('.')) {
        return Err(invalid("hidden files are not documents"));
    }

    Ok(())
}

/// Project alias encoded in a logical document path (`projects/@alias/...`).
pub fn project_alias_of(path: &str) -> Option<String> {
    let mut segments = path.split('/');
    if segments.next()? != PROJECTS_DIR {
        return None;
    }
    let dir = segments.next()?;
    dir.strip_prefix('@')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

pub fn alias_from_dir_name(dir_name: &str) -> String {
    dir_name.strip_prefix('@').unwrap_or(dir_name).to_string()
}

/// `my-cool_project` -> `My Cool Project`.
pub fn display_name_from_alias(alias: &str) -> String {
    alias
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_ext(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        None
    } else {
        Some(ext)
    }
}
