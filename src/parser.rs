//! Content parser.
//!
//! Turns a document's block tree into [`ExtractedContent`]. Block handling
//! is table-driven: [`BlockKind`] is the closed set of block variants the
//! index cares about and [`EXTRACTORS`] maps each one to its handler.
//! Anything the table doesn't know contributes nothing itself, but its
//! children are still visited.
//!
//! Content never makes parsing fail. Only a document that is not a JSON
//! object at all (or whose `meta`/`blocks` have the wrong container type)
//! produces a [`ParseError`]; odd blocks, spans and table shapes are
//! skipped.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::models::{AssetKind, AssetRef, DocumentFile, ExtractedContent, Link};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading,
    Paragraph,
    CodeBlock,
    ListItem,
    Quote,
    Image,
    File,
    Table,
}

impl BlockKind {
    pub fn from_type(block_type: &str) -> Option<Self> {
        match block_type {
            "heading" => Some(BlockKind::Heading),
            "paragraph" => Some(BlockKind::Paragraph),
            "codeBlock" => Some(BlockKind::CodeBlock),
            "bulletListItem" | "numberedListItem" | "checkListItem" => Some(BlockKind::ListItem),
            "quote" => Some(BlockKind::Quote),
            "image" => Some(BlockKind::Image),
            "file" => Some(BlockKind::File),
            "table" => Some(BlockKind::Table),
            _ => None,
        }
    }
}

/// Borrowed view of one block node.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    pub id: &'a str,
    pub block_type: &'a str,
    pub props: Option<&'a Map<String, Value>>,
    pub content: Option<&'a Value>,
    pub children: &'a [Value],
}

impl<'a> Block<'a> {
    /// `None` for anything that isn't an object with a string `type`.
    pub fn from_value(value: &'a Value) -> Option<Self> {
        let obj = value.as_object()?;
        let block_type = obj.get("type")?.as_str()?;
        Some(Self {
            id: obj.get("id").and_then(Value::as_str).unwrap_or(""),
            block_type,
            props: obj.get("props").and_then(Value::as_object),
            content: obj.get("content"),
            children: obj
                .get("children")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        })
    }

    fn prop_str(&self, key: &str) -> Option<&'a str> {
        self.props?
            .get(key)?
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

type Extractor = fn(&Block<'_>, &mut ExtractedContent);

/// One handler per block variant. Adding a block type is one entry here
/// plus its `BlockKind::from_type` arm.
pub const EXTRACTORS: &[(BlockKind, Extractor)] = &[
    (BlockKind::Heading, extract_heading),
    (BlockKind::Paragraph, extract_text_block),
    (BlockKind::ListItem, extract_text_block),
    (BlockKind::Quote, extract_text_block),
    (BlockKind::CodeBlock, extract_code),
    (BlockKind::Image, extract_image),
    (BlockKind::File, extract_file),
    (BlockKind::Table, extract_table),
];

fn extractor_for(kind: BlockKind) -> Option<Extractor> {
    EXTRACTORS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, f)| *f)
}

/// A document file together with what was extracted from it.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub file: DocumentFile,
    pub content: ExtractedContent,
}

/// Decode raw document JSON and extract its content.
pub fn parse_document(raw: &str) -> Result<ParsedDocument, ParseError> {
    let value: Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err(ParseError::NotAnObject);
    }
    let file: DocumentFile = serde_json::from_value(value)?;
    let content = extract(&file);
    Ok(ParsedDocument { file, content })
}

/// Walk the block tree in document order. Never fails.
pub fn extract(file: &DocumentFile) -> ExtractedContent {
    let mut out = ExtractedContent::default();
    visit_blocks(&file.blocks, &mut out);
    out.finish();
    out
}

fn visit_blocks(blocks: &[Value], out: &mut ExtractedContent) {
    for value in blocks {
        let Some(block) = Block::from_value(value) else {
            continue;
        };
        if let Some(extract) = BlockKind::from_type(block.block_type).and_then(extractor_for) {
            extract(&block, out);
        }
        visit_blocks(block.children, out);
    }
}

fn extract_heading(block: &Block<'_>, out: &mut ExtractedContent) {
    let text = block_text(block, &mut out.links);
    push_non_empty(&mut out.headings, text);
}

fn extract_text_block(block: &Block<'_>, out: &mut ExtractedContent) {
    let text = block_text(block, &mut out.links);
    push_non_empty(&mut out.body, text);
}

fn extract_code(block: &Block<'_>, out: &mut ExtractedContent) {
    // Link-looking spans inside code are code, not links.
    let mut ignored = Vec::new();
    let text = block_text(block, &mut ignored);
    push_non_empty(&mut out.code, text);
}

fn extract_image(block: &Block<'_>, out: &mut ExtractedContent) {
    extract_asset(block, AssetKind::Image, block.prop_str("caption"), out);
}

fn extract_file(block: &Block<'_>, out: &mut ExtractedContent) {
    let label = block.prop_str("name").or_else(|| block.prop_str("caption"));
    extract_asset(block, AssetKind::File, label, out);
}

fn extract_asset(
    block: &Block<'_>,
    kind: AssetKind,
    caption: Option<&str>,
    out: &mut ExtractedContent,
) {
    let Some(url) = block.prop_str("url") else {
        return;
    };
    if let Some(caption) = caption {
        out.body.push(caption.to_string());
    }
    out.assets.push(AssetRef {
        path: url.to_string(),
        caption: caption.map(str::to_string),
        kind,
    });
}

#[derive(Deserialize)]
struct TableContent {
    rows: Vec<TableRow>,
}

#[derive(Deserialize)]
struct TableRow {
    cells: Vec<TableCell>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableCell {
    Spans(Vec<Value>),
    Cell { content: Vec<Value> },
}

fn extract_table(block: &Block<'_>, out: &mut ExtractedContent) {
    let Some(content) = block.content else {
        return;
    };
    // A shape that is valid JSON but not a table is treated as empty.
    let Ok(table) = TableContent::deserialize(content) else {
        return;
    };

    let mut cells = Vec::new();
    for row in &table.rows {
        for cell in &row.cells {
            let spans = match cell {
                TableCell::Spans(spans) => spans,
                TableCell::Cell { content } => content,
            };
            let text = spans_text(spans, &mut out.links);
            let text = text.trim();
            if !text.is_empty() {
                cells.push(text.to_string());
            }
        }
    }
    push_non_empty(&mut out.body, cells.join(" "));
}

fn block_text(block: &Block<'_>, links: &mut Vec<Link>) -> String {
    match block.content {
        Some(Value::Array(spans)) => spans_text(spans, links),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn spans_text(spans: &[Value], links: &mut Vec<Link>) -> String {
    let mut text = String::new();
    for span in spans {
        match span {
            Value::String(s) => text.push_str(s),
            Value::Object(obj) => {
                if obj.get("type").and_then(Value::as_str) == Some("link") {
                    if let Some(href) = obj.get("href").and_then(Value::as_str) {
                        if !href.trim().is_empty() {
                            links.push(Link::from_href(href));
                        }
                    }
                }
                if let Some(t) = obj.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
                if let Some(Value::Array(inner)) = obj.get("content") {
                    text.push_str(&spans_text(inner, links));
                }
            }
            _ => {}
        }
    }
    text
}

fn push_non_empty(bucket: &mut Vec<String>, text: String) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        bucket.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ExtractedContent {
        parse_document(&value.to_string()).unwrap().content
    }

    fn text(t: &str) -> Value {
        json!({"type": "text", "text": t, "styles": {}})
    }

    #[test]
    fn buckets_by_block_type() {
        let content = parse(json!({
            "meta": {"title": "T"},
            "blocks": [
                {"id": "1", "type": "heading", "props": {"level": 1}, "content": [text("Hello")]},
                {"id": "2", "type": "paragraph", "content": [text("Body "), text("text")]},
                {"id": "3", "type": "codeBlock", "props": {"language": "rust"}, "content": [text("fn main() {}")]},
                {"id": "4", "type": "bulletListItem", "content": [text("item")],
                 "children": [{"id": "5", "type": "quote", "content": [text("nested quote")]}]}
            ]
        }));

        assert_eq!(content.headings, vec!["Hello"]);
        assert_eq!(content.body, vec!["Body text", "item", "nested quote"]);
        assert_eq!(content.code, vec!["fn main() {}"]);
        assert!(content.has_code);
        assert!(!content.has_links);
        assert!(!content.has_images);
    }

    #[test]
    fn link_spans_become_links_and_text() {
        let content = parse(json!({
            "blocks": [{
                "id": "1", "type": "paragraph",
                "content": [
                    text("see "),
                    {"type": "link", "href": "https://Example.com/x", "content": [text("example")]}
                ]
            }]
        }));
        assert_eq!(content.body, vec!["see example"]);
        assert_eq!(content.links.len(), 1);
        assert_eq!(content.links[0].host, "example.com");
        assert!(content.has_links);
    }

    #[test]
    fn image_needs_url_and_caption_is_searchable() {
        let content = parse(json!({
            "blocks": [
                {"id": "1", "type": "image", "props": {"url": "assets/abc.png", "caption": "A cat"}},
                {"id": "2", "type": "image", "props": {"url": "", "caption": "orphan"}},
                {"id": "3", "type": "file", "props": {"url": "assets/def.pdf", "name": "report.pdf"}}
            ]
        }));
        assert_eq!(content.assets.len(), 2);
        assert_eq!(content.assets[0].kind, AssetKind::Image);
        assert_eq!(content.assets[0].caption.as_deref(), Some("A cat"));
        assert_eq!(content.assets[1].kind, AssetKind::File);
        assert_eq!(content.body, vec!["A cat", "report.pdf"]);
        assert!(content.has_images);
    }

    #[test]
    fn file_only_does_not_set_has_images() {
        let content = parse(json!({
            "blocks": [{"id": "1", "type": "file", "props": {"url": "assets/x.zip"}}]
        }));
        assert_eq!(content.assets.len(), 1);
        assert!(!content.has_images);
    }

    #[test]
    fn table_cells_flatten_into_one_body_entry() {
        let content = parse(json!({
            "blocks": [{
                "id": "1", "type": "table",
                "content": {
                    "type": "tableContent",
                    "rows": [
                        {"cells": [[text("a")], {"type": "tableCell", "content": [text("b")]}]},
                        {"cells": [[text("c")], []]}
                    ]
                }
            }]
        }));
        assert_eq!(content.body, vec!["a b c"]);
    }

    #[test]
    fn malformed_table_is_empty_not_an_error() {
        let content = parse(json!({
            "blocks": [
                {"id": "1", "type": "table", "content": {"rows": "nope"}},
                {"id": "2", "type": "table", "content": [1, 2, 3]},
                {"id": "3", "type": "paragraph", "content": [text("after")]}
            ]
        }));
        assert_eq!(content.body, vec!["after"]);
    }

    #[test]
    fn odd_blocks_are_skipped() {
        let content = parse(json!({
            "blocks": [
                42,
                "string block",
                {"id": "no-type"},
                {"id": "x", "type": "mystery", "content": [text("ignored")],
                 "children": [{"id": "y", "type": "heading", "content": [text("Kept")]}]},
                {"id": "z", "type": "paragraph", "content": [7, null, text("ok")]}
            ]
        }));
        assert_eq!(content.headings, vec!["Kept"]);
        assert_eq!(content.body, vec!["ok"]);
    }

    #[test]
    fn structural_failures_are_errors() {
        assert!(parse_document("not json").is_err());
        assert!(matches!(
            parse_document("[1, 2]"),
            Err(ParseError::NotAnObject)
        ));
        assert!(parse_document(r#"{"blocks": "nope"}"#).is_err());
    }

    #[test]
    fn empty_document_parses() {
        let parsed = parse_document("{}").unwrap();
        assert_eq!(parsed.content, ExtractedContent::default());
    }

    #[test]
    fn every_kind_has_an_extractor() {
        for kind in [
            BlockKind::Heading,
            BlockKind::Paragraph,
            BlockKind::CodeBlock,
            BlockKind::ListItem,
            BlockKind::Quote,
            BlockKind::Image,
            BlockKind::File,
            BlockKind::Table,
        ] {
            assert!(extractor_for(kind).is_some(), "{:?}", kind);
        }
    }
}
