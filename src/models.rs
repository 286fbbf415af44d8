//! Core data types.
//!
//! [`DocumentFile`] is the on-disk source of truth; everything else here is
//! either produced by the parser ([`ExtractedContent`]) or a row of a derived
//! index.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Maximum stored length of a link URL.
pub const MAX_LINK_LEN: usize = 2048;

/// A document file as read from the vault.
///
/// Blocks stay as raw JSON so one malformed block cannot fail the whole
/// document; the parser decodes them one at a time.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DocumentFile {
    #[serde(default)]
    pub meta: DocMeta,
    #[serde(default)]
    pub blocks: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DocMeta {
    #[serde(default, deserialize_with = "lenient_string")]
    pub project: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub aliases: Vec<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub updated: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// An outbound link found in document content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub url: String,
    pub host: String,
}

impl Link {
    /// Build a link from an `href`, extracting the lower-cased host when the
    /// URL parses. Unparseable hrefs keep an empty host.
    pub fn from_href(href: &str) -> Self {
        let url = href.trim().to_string();
        let host = url::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default();
        Self { url, host }
    }

    /// Basic validation applied before a link is stored.
    pub fn is_valid(&self) -> bool {
        if self.url.is_empty() || self.url.len() > MAX_LINK_LEN {
            return false;
        }
        match url::Url::parse(&self.url) {
            Ok(parsed) => match parsed.scheme() {
                "http" | "https" => !self.host.is_empty(),
                "mailto" => true,
                _ => false,
            },
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetKind {
    Image,
    File,
}

/// A reference from an image/file block to an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub path: String,
    pub caption: Option<String>,
    pub kind: AssetKind,
}

impl AssetRef {
    /// Content hash encoded in the reference path, if it points at a
    /// content-addressed asset (`.../<64 hex>.<ext>`).
    pub fn hash(&self) -> Option<String> {
        asset_hash_from_ref(&self.path)
    }
}

/// Extract the 64-hex-char content hash from an asset reference path.
pub fn asset_hash_from_ref(reference: &str) -> Option<String> {
    let without_suffix = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    let segment = without_suffix.rsplit('/').next()?;
    let stem = segment.split('.').next()?;
    if stem.len() == 64 && stem.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(stem.to_ascii_lowercase())
    } else {
        None
    }
}

/// Structured content pulled out of a document's block tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedContent {
    pub headings: Vec<String>,
    pub body: Vec<String>,
    pub code: Vec<String>,
    pub links: Vec<Link>,
    pub assets: Vec<AssetRef>,
    pub has_code: bool,
    pub has_images: bool,
    pub has_links: bool,
}

impl ExtractedContent {
    pub fn headings_text(&self) -> String {
        self.headings.join("\n")
    }

    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }

    pub fn code_text(&self) -> String {
        self.code.join("\n")
    }

    /// Recompute the presence flags from the buckets.
    pub(crate) fn finish(&mut self) {
        self.has_code = !self.code.is_empty();
        self.has_links = !self.links.is_empty();
        self.has_images = self.assets.iter().any(|a| a.kind == AssetKind::Image);
    }
}

/// Derived metadata row for one document file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocRecord {
    pub path: String,
    pub project: String,
    pub title: String,
    pub mtime_ns: i64,
    pub size_bytes: i64,
    pub has_code: bool,
    pub has_images: bool,
    pub has_links: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// The four weighted full-text fields for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FtsEntry {
    pub path: String,
    pub title: String,
    pub headings: String,
    pub body: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub title: Option<String>,
    pub score: f64,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagUsage {
    pub name: String,
    pub doc_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub hash: String,
    pub ext: String,
    pub size_bytes: i64,
    pub mime: String,
    pub created_at: i64,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub alias: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}
