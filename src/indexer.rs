//! The Indexer keeps every derived index consistent with the vault.
//!
//! `index_document` re-derives all rows for one document file inside a
//! single unit of work: document record, full-text entry, tags, links and
//! asset links either all change or none do. The change notification that
//! drives auto-commits is sent only after that commit.
//!
//! Asset references whose asset row is not visible to the unit of work
//! (registration still in flight on another connection, or the upload has
//! not happened yet) are recorded as pending instead of failing the save.
//! [`Indexer::late_link_asset`] and [`Indexer::reconcile_pending_assets`]
//! attach them later.

use std::path::Path;
use std::sync::Arc;

use chrono::DateTime;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{IndexError, StoreError};
use crate::models::{Asset, DocRecord, FtsEntry, Link, Project, SearchHit};
use crate::parser::{parse_document, ParsedDocument};
use crate::progress::{ProgressReporter, ReindexProgress};
use crate::store::{AssetLink, Stores};
use crate::sync::ChangeNotifier;
use crate::vault::{display_name_from_alias, project_alias_of, FileStat, ProjectDir, Vault};

/// A progress event is emitted after every this many documents.
pub const PROGRESS_EVERY: u64 = 10;

/// Pseudo-path used in errors for whole-index operations.
const ALL_DOCS: &str = "*";

/// What one `index_document` call wrote.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub record: DocRecord,
    pub tags: usize,
    pub links: u64,
    pub dropped_links: usize,
    pub assets_linked: usize,
    pub assets_pending: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub projects: usize,
    pub total: u64,
    pub indexed: u64,
    pub failed: u64,
    pub assets_reconciled: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredAsset {
    pub asset: Asset,
    /// Logical reference path to use in image/file blocks.
    pub reference: String,
    /// Pending references attached by this registration.
    pub linked: usize,
}

fn store_err<'a>(store: &'static str, path: &'a str) -> impl FnOnce(StoreError) -> IndexError + 'a {
    move |source| IndexError::Store {
        store,
        path: path.to_string(),
        source,
    }
}

fn tx_err<'a>(action: &'static str, path: &'a str) -> impl FnOnce(sqlx::Error) -> IndexError + 'a {
    move |source| IndexError::Transaction {
        path: path.to_string(),
        action,
        source,
    }
}

pub struct Indexer {
    db: Database,
    vault: Vault,
    stores: Stores,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl Indexer {
    pub fn new(pool: SqlitePool, vault: Vault) -> Self {
        Self {
            db: Database::new(pool.clone()),
            vault,
            stores: Stores::new(pool),
            notifier: None,
        }
    }

    /// Send change notifications to `notifier` after each committed write.
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    fn notify(&self, reason: String) {
        if let Some(notifier) = &self.notifier {
            notifier.notify_change(&reason);
        }
    }

    /// Re-derive every index row for one document file.
    pub async fn index_document(&self, path: &str) -> Result<IndexReport, IndexError> {
        let raw = self
            .vault
            .read_document(path)
            .await
            .map_err(|source| IndexError::Read {
                path: path.to_string(),
                source,
            })?;
        let stat = self
            .vault
            .stat_document(path)
            .await
            .map_err(|source| IndexError::Read {
                path: path.to_string(),
                source,
            })?;
        let parsed = parse_document(&raw).map_err(|source| IndexError::Parse {
            path: path.to_string(),
            source,
        })?;

        let record = build_record(path, &parsed, stat);
        let fts = FtsEntry {
            path: path.to_string(),
            title: record.title.clone(),
            headings: parsed.content.headings_text(),
            body: parsed.content.body_text(),
            code: parsed.content.code_text(),
        };

        let mut links: Vec<Link> = Vec::with_capacity(parsed.content.links.len());
        let mut dropped_links = 0;
        for link in &parsed.content.links {
            if link.is_valid() {
                links.push(link.clone());
            } else {
                dropped_links += 1;
                warn!(path, url = %link.url, "dropping invalid link");
            }
        }

        let mut tx = self.db.begin().await.map_err(tx_err("begin", path))?;

        self.stores
            .docs
            .upsert_tx(&mut tx, &record)
            .await
            .map_err(store_err("document", path))?;
        self.stores
            .fts
            .upsert_tx(&mut tx, &fts)
            .await
            .map_err(store_err("full-text", path))?;

        self.stores
            .tags
            .remove_all_for_doc_tx(&mut tx, path)
            .await
            .map_err(store_err("tag", path))?;
        let tags = if parsed.file.meta.tags.is_empty() {
            0
        } else {
            self.stores
                .tags
                .add_to_doc_tx(&mut tx, path, &parsed.file.meta.tags)
                .await
                .map_err(store_err("tag", path))?
        };

        self.stores
            .links
            .remove_all_for_doc_tx(&mut tx, path)
            .await
            .map_err(store_err("link", path))?;
        let link_rows = self
            .stores
            .links
            .add_to_doc_tx(&mut tx, path, &links)
            .await
            .map_err(store_err("link", path))?;

        self.stores
            .assets
            .unlink_all_for_doc_tx(&mut tx, path)
            .await
            .map_err(store_err("asset", path))?;
        let mut assets_linked = 0;
        let mut assets_pending = 0;
        for asset in &parsed.content.assets {
            let Some(hash) = asset.hash() else {
                debug!(path, reference = %asset.path, "asset reference is not content-addressed");
                continue;
            };
            let caption = asset.caption.as_deref();
            match self
                .stores
                .assets
                .link_to_doc_tx(&mut tx, path, &hash, caption)
                .await
                .map_err(store_err("asset", path))?
            {
                AssetLink::Linked => assets_linked += 1,
                AssetLink::NotVisible => {
                    warn!(path, hash = %hash, "asset not visible yet; deferring link");
                    self.stores
                        .assets
                        .record_pending_tx(&mut tx, path, &hash, caption)
                        .await
                        .map_err(store_err("asset", path))?;
                    assets_pending += 1;
                }
            }
        }

        tx.commit().await.map_err(tx_err("commit", path))?;
        debug!(path, tags, links = link_rows, assets_linked, assets_pending, "indexed document");

        self.notify(format!("index {}", path));

        Ok(IndexReport {
            record,
            tags,
            links: link_rows,
            dropped_links,
            assets_linked,
            assets_pending,
        })
    }

    /// Same as [`Indexer::index_document`]; there is no incremental mode.
    pub async fn reindex_document(&self, path: &str) -> Result<IndexReport, IndexError> {
        self.index_document(path).await
    }

    /// Drop the document from search only. Its record and associations stay.
    pub async fn remove_document(&self, path: &str) -> Result<bool, IndexError> {
        let removed = self
            .stores
            .fts
            .delete(path)
            .await
            .map_err(store_err("full-text", path))?;
        if removed {
            self.notify(format!("remove {}", path));
        }
        Ok(removed)
    }

    /// Drop the full-text entry and the record. Tag, link and asset rows go
    /// with the record.
    pub async fn remove_document_completely(&self, path: &str) -> Result<bool, IndexError> {
        let mut tx = self.db.begin().await.map_err(tx_err("begin", path))?;
        self.stores
            .fts
            .delete_tx(&mut tx, path)
            .await
            .map_err(store_err("full-text", path))?;
        let removed = self
            .stores
            .docs
            .delete_tx(&mut tx, path)
            .await
            .map_err(store_err("document", path))?;
        tx.commit().await.map_err(tx_err("commit", path))?;

        self.notify(format!("delete {}", path));
        Ok(removed)
    }

    /// Empty the full-text index and the document table.
    pub async fn clear_index(&self) -> Result<(), IndexError> {
        let mut tx = self.db.begin().await.map_err(tx_err("begin", ALL_DOCS))?;
        self.stores
            .fts
            .clear_tx(&mut tx)
            .await
            .map_err(store_err("full-text", ALL_DOCS))?;
        let n = self
            .stores
            .docs
            .clear_tx(&mut tx)
            .await
            .map_err(store_err("document", ALL_DOCS))?;
        tx.commit().await.map_err(tx_err("commit", ALL_DOCS))?;
        info!(documents = n, "cleared index");
        Ok(())
    }

    /// Reconcile project records, then index every document in the vault.
    ///
    /// Per-document failures are logged and counted. Cancellation is
    /// checked between documents; whatever was committed stays indexed.
    pub async fn scan_and_index_vault(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary, IndexError> {
        let projects = self
            .vault
            .list_projects()
            .map_err(|source| IndexError::Read {
                path: crate::vault::PROJECTS_DIR.to_string(),
                source,
            })?;

        let mut summary = ScanSummary {
            projects: projects.len(),
            ..Default::default()
        };

        let mut paths = Vec::new();
        for project in &projects {
            if let Err(e) = self.reconcile_project(project).await {
                warn!(project = %project.alias, error = %e, "could not reconcile project");
            }
            match self.vault.list_documents(project) {
                Ok(docs) => paths.extend(docs),
                Err(e) => warn!(project = %project.alias, error = %e, "could not list project documents"),
            }
        }

        summary.total = paths.len() as u64;
        info!(projects = projects.len(), documents = summary.total, "scanning vault");

        for (i, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match self.index_document(path).await {
                Ok(_) => summary.indexed += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(path = %path, error = %e, "skipping document");
                }
            }

            let current = i as u64 + 1;
            if current % PROGRESS_EVERY == 0 || current == summary.total {
                progress.report(&ReindexProgress {
                    current,
                    total: summary.total,
                    message: format!("indexed {}", path),
                });
            }
        }

        if summary.cancelled {
            info!(indexed = summary.indexed, total = summary.total, "scan cancelled");
            return Ok(summary);
        }

        summary.assets_reconciled = self.reconcile_pending_assets().await?;
        info!(
            indexed = summary.indexed,
            failed = summary.failed,
            assets_reconciled = summary.assets_reconciled,
            "scan complete"
        );
        Ok(summary)
    }

    async fn reconcile_project(&self, dir: &ProjectDir) -> Result<(), IndexError> {
        let meta = match self.vault.read_project_meta(dir) {
            Ok(meta) => meta.unwrap_or_default(),
            Err(e) => {
                warn!(project = %dir.alias, error = %e, "ignoring unreadable project metadata");
                Default::default()
            }
        };

        let now = crate::store::now_ts();
        let name = meta
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| display_name_from_alias(&dir.alias));
        let project = Project {
            alias: dir.alias.clone(),
            name,
            description: meta.description.filter(|d| !d.trim().is_empty()),
            created_at: meta.created.as_deref().and_then(parse_rfc3339).unwrap_or(now),
            updated_at: meta.updated.as_deref().and_then(parse_rfc3339).unwrap_or(now),
            deleted_at: None,
        };
        self.stores
            .projects
            .upsert(&project)
            .await
            .map_err(store_err("project", &dir.dir_name))
    }

    /// Write asset bytes into the vault, register the asset row, then
    /// attach any references that were waiting for it.
    pub async fn register_asset(&self, bytes: &[u8], ext: &str) -> Result<RegisteredAsset, IndexError> {
        let stored = self
            .vault
            .store_asset(bytes, ext)
            .await
            .map_err(|source| IndexError::Write {
                path: format!("{}/*.{}", crate::vault::ASSETS_DIR, ext),
                source,
            })?;

        let asset = Asset {
            hash: stored.hash.clone(),
            ext: stored.ext.clone(),
            size_bytes: stored.size_bytes,
            mime: mime_guess::from_ext(&stored.ext)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            created_at: crate::store::now_ts(),
            deleted_at: None,
        };
        self.stores
            .assets
            .upsert(&asset)
            .await
            .map_err(store_err("asset", &stored.reference))?;
        info!(hash = %asset.hash, mime = %asset.mime, size = asset.size_bytes, "registered asset");
        self.notify(format!("asset {}", asset.hash));

        let linked = self.link_pending(Some(&asset.hash)).await?;
        Ok(RegisteredAsset {
            asset,
            reference: stored.reference,
            linked,
        })
    }

    /// Attach an asset to a document after the fact, e.g. when indexing ran
    /// before the upload committed. The caption of a pending reference is
    /// kept.
    pub async fn late_link_asset(&self, doc_path: &str, hash: &str) -> Result<AssetLink, IndexError> {
        let caption = self
            .stores
            .assets
            .pending(Some(hash))
            .await
            .map_err(store_err("asset", doc_path))?
            .into_iter()
            .find(|p| p.doc_path == doc_path)
            .and_then(|p| p.caption);

        let outcome = self
            .stores
            .assets
            .link_to_doc(doc_path, hash, caption.as_deref())
            .await
            .map_err(store_err("asset", doc_path))?;
        match outcome {
            AssetLink::Linked => self.notify(format!("link {} {}", doc_path, hash)),
            AssetLink::NotVisible => debug!(doc_path, hash, "late link: asset still not visible"),
        }
        Ok(outcome)
    }

    /// Link every pending reference whose asset is now visible. Returns how
    /// many were attached.
    pub async fn reconcile_pending_assets(&self) -> Result<usize, IndexError> {
        self.link_pending(None).await
    }

    async fn link_pending(&self, hash: Option<&str>) -> Result<usize, IndexError> {
        let pending = self
            .stores
            .assets
            .pending(hash)
            .await
            .map_err(store_err("asset", ALL_DOCS))?;

        let mut linked = 0;
        for p in pending {
            match self
                .stores
                .assets
                .link_to_doc(&p.doc_path, &p.asset_hash, p.caption.as_deref())
                .await
            {
                Ok(AssetLink::Linked) => linked += 1,
                Ok(AssetLink::NotVisible) => {}
                Err(e) => warn!(doc = %p.doc_path, hash = %p.asset_hash, error = %e, "pending asset link failed"),
            }
        }
        if linked > 0 {
            info!(linked, "attached pending asset references");
        }
        Ok(linked)
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<SearchHit>, IndexError> {
        self.stores
            .fts
            .search(query, limit)
            .await
            .map_err(store_err("full-text", query))
    }
}

/// Seconds since the epoch from an RFC3339 string.
fn parse_rfc3339(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw.trim()).ok().map(|ts| ts.timestamp())
}

fn build_record(path: &str, parsed: &ParsedDocument, stat: FileStat) -> DocRecord {
    let meta = &parsed.file.meta;
    let mtime = stat.mtime_ns.div_euclid(1_000_000_000);

    let title = Some(meta.title.trim())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            parsed
                .content
                .headings
                .iter()
                .map(|h| h.trim())
                .find(|h| !h.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string())
        });

    let project = project_alias_of(path).unwrap_or_else(|| meta.project.trim().to_string());

    DocRecord {
        path: path.to_string(),
        project,
        title,
        mtime_ns: stat.mtime_ns,
        size_bytes: stat.size_bytes,
        has_code: parsed.content.has_code,
        has_images: parsed.content.has_images,
        has_links: parsed.content.has_links,
        created_at: parse_rfc3339(&meta.created).unwrap_or(mtime),
        updated_at: parse_rfc3339(&meta.updated).unwrap_or(mtime),
        deleted_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(json: &str) -> ParsedDocument {
        parse_document(json).unwrap()
    }

    const STAT: FileStat = FileStat {
        mtime_ns: 1_700_000_000_123_456_789,
        size_bytes: 42,
    };

    #[test]
    fn title_prefers_meta_then_heading_then_stem() {
        let doc = parsed(
            r#"{"meta":{"title":"  Meta Title "},"blocks":[{"id":"h","type":"heading","content":[{"type":"text","text":"Head"}]}]}"#,
        );
        assert_eq!(build_record("projects/@p/a.json", &doc, STAT).title, "Meta Title");

        let doc = parsed(
            r#"{"meta":{"title":" "},"blocks":[{"id":"h","type":"heading","content":[{"type":"text","text":"Head"}]}]}"#,
        );
        assert_eq!(build_record("projects/@p/a.json", &doc, STAT).title, "Head");

        let doc = parsed(r#"{"meta":{},"blocks":[]}"#);
        assert_eq!(build_record("projects/@p/notes/daily-1.json", &doc, STAT).title, "daily-1");
    }

    #[test]
    fn timestamps_fall_back_to_mtime() {
        let doc = parsed(
            r#"{"meta":{"created":"2024-01-02T03:04:05Z","updated":"not a date"},"blocks":[]}"#,
        );
        let rec = build_record("projects/@p/a.json", &doc, STAT);
        assert_eq!(rec.created_at, 1_704_164_645);
        assert_eq!(rec.updated_at, 1_700_000_000);
        assert_eq!(rec.project, "p");
        assert_eq!(rec.size_bytes, 42);
    }
}
