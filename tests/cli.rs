use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vix_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vix");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let project = root.join("vault/projects/@notes");
    fs::create_dir_all(&project).unwrap();
    fs::write(
        project.join("alpha.json"),
        r#"{
  "meta": {"project": "notes", "title": "Alpha Document", "tags": ["rust", "cargo"]},
  "blocks": [
    {"id": "1", "type": "paragraph", "content": [{"type": "text", "text": "Notes about cargo and crates.", "styles": {}}]},
    {"id": "2", "type": "codeBlock", "props": {"language": "rust"}, "content": [{"type": "text", "text": "fn main() {}", "styles": {}}]}
  ]
}"#,
    )
    .unwrap();
    fs::write(
        project.join("beta.json"),
        r#"{
  "meta": {"project": "notes", "tags": ["python"]},
  "blocks": [
    {"id": "1", "type": "heading", "props": {"level": 1}, "content": [{"type": "text", "text": "Beta Heading", "styles": {}}]},
    {"id": "2", "type": "paragraph", "content": [
      {"type": "text", "text": "Machine learning, see ", "styles": {}},
      {"type": "link", "href": "https://pytorch.org/docs", "content": [{"type": "text", "text": "docs", "styles": {}}]}
    ]}
  ]
}"#,
    )
    .unwrap();
    fs::write(
        project.join("gamma.json"),
        r#"{"meta": {}, "blocks": [{"id": "1", "type": "paragraph", "content": "Kubernetes deployment notes"}]}"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/vix.sqlite"

[vault]
root = "{root}/vault"

[sync]
enabled = false

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("vix.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vix(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vix_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vix binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn init_and_scan(config_path: &Path) {
    let (stdout, stderr, success) = run_vix(config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    let (stdout, stderr, success) = run_vix(config_path, &["scan", "--progress", "off"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vix(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_vix(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_vix(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_check_passes_on_fresh_database() {
    let (_tmp, config_path) = setup_test_env();
    run_vix(&config_path, &["init"]);

    let (stdout, _, success) = run_vix(&config_path, &["check"]);
    assert!(success);
    assert_eq!(stdout.trim(), "ok");
}

#[test]
fn test_scan_indexes_vault() {
    let (_tmp, config_path) = setup_test_env();
    run_vix(&config_path, &["init"]);

    let (stdout, stderr, success) = run_vix(&config_path, &["scan", "--progress", "off"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("projects: 1"));
    assert!(stdout.contains("documents: 3"));
    assert!(stdout.contains("indexed: 3"));
    assert!(stdout.contains("failed: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_scan_json_progress_goes_to_stderr() {
    let (_tmp, config_path) = setup_test_env();
    run_vix(&config_path, &["init"]);

    let (stdout, stderr, success) = run_vix(&config_path, &["scan", "--progress", "json"]);
    assert!(success);
    assert!(!stdout.contains("reindex_progress"));
    assert!(stderr.contains("\"event\":\"reindex_progress\""));
    assert!(stderr.contains("\"current\":3"));
}

#[test]
fn test_search_keyword() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, _, success) = run_vix(&config_path, &["search", "cargo"]);
    assert!(success);
    assert!(stdout.contains("Alpha Document"));
    assert!(stdout.contains("path: projects/@notes/alpha.json"));
    assert!(!stdout.contains("beta.json"));
}

#[test]
fn test_search_uses_heading_title() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, _, success) = run_vix(&config_path, &["search", "learning"]);
    assert!(success);
    assert!(stdout.contains("Beta Heading"));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, _, success) = run_vix(&config_path, &["search", "   "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_doc_json() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, stderr, success) =
        run_vix(&config_path, &["doc", "projects/@notes/alpha.json", "--json"]);
    assert!(success, "doc failed: {}", stderr);

    let doc: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(doc["record"]["title"], "Alpha Document");
    assert_eq!(doc["record"]["project"], "notes");
    assert_eq!(doc["record"]["has_code"], true);
    assert_eq!(doc["searchable"], true);
    assert_eq!(doc["tags"], serde_json::json!(["cargo", "rust"]));
}

#[test]
fn test_doc_untitled_falls_back_to_file_name() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, _, success) = run_vix(&config_path, &["doc", "projects/@notes/gamma.json"]);
    assert!(success);
    assert!(stdout.contains("title:       gamma"));
}

#[test]
fn test_doc_missing_fails() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (_, stderr, success) = run_vix(&config_path, &["doc", "projects/@notes/nope.json"]);
    assert!(!success);
    assert!(stderr.contains("not indexed"));
}

#[test]
fn test_remove_then_search() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, _, success) = run_vix(&config_path, &["remove", "projects/@notes/alpha.json"]);
    assert!(success);
    assert!(stdout.contains("removed"));

    let (stdout, _, _) = run_vix(&config_path, &["search", "cargo"]);
    assert!(stdout.contains("No results."));

    // The record survives a soft removal.
    let (stdout, _, success) = run_vix(&config_path, &["doc", "projects/@notes/alpha.json"]);
    assert!(success);
    assert!(stdout.contains("searchable:  false"));

    let (_, _, success) = run_vix(
        &config_path,
        &["remove", "projects/@notes/alpha.json", "--completely"],
    );
    assert!(success);
    let (_, _, success) = run_vix(&config_path, &["doc", "projects/@notes/alpha.json"]);
    assert!(!success);
}

#[test]
fn test_tags_and_projects() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, _, success) = run_vix(&config_path, &["tags"]);
    assert!(success);
    assert!(stdout.contains("rust"));
    assert!(stdout.contains("python"));

    let (stdout, _, success) = run_vix(&config_path, &["projects"]);
    assert!(success);
    assert!(stdout.contains("notes"));
    assert!(stdout.contains("Notes"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (stdout, _, success) = run_vix(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:      3 (0 soft-deleted)"));
    assert!(stdout.contains("Searchable:     3"));
    assert!(stdout.contains("Last auto-sync: never"));
}

#[test]
fn test_asset_add_and_link() {
    let (tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let file = tmp.path().join("diagram.png");
    fs::write(&file, b"not really a png").unwrap();

    let (stdout, stderr, success) = run_vix(
        &config_path,
        &[
            "asset",
            "add",
            file.to_str().unwrap(),
            "--doc",
            "projects/@notes/beta.json",
        ],
    );
    assert!(success, "asset add failed: {}", stderr);
    assert!(stdout.starts_with("assets/"));
    assert!(stdout.contains("mime: image/png"));
    assert!(stdout.contains("linked to projects/@notes/beta.json"));

    let (stdout, _, _) = run_vix(
        &config_path,
        &["doc", "projects/@notes/beta.json", "--json"],
    );
    let doc: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(doc["assets"].as_array().unwrap().len(), 1);
}

#[test]
fn test_clear_then_fresh_scan() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (_, _, success) = run_vix(&config_path, &["clear"]);
    assert!(success);
    let (stdout, _, _) = run_vix(&config_path, &["stats"]);
    assert!(stdout.contains("Documents:      0"));

    let (stdout, _, success) =
        run_vix(&config_path, &["scan", "--fresh", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("indexed: 3"));
}

#[test]
fn test_sync_disabled_is_an_error() {
    let (_tmp, config_path) = setup_test_env();
    init_and_scan(&config_path);

    let (_, stderr, success) = run_vix(&config_path, &["sync", "now"]);
    assert!(!success);
    assert!(stderr.contains("sync is disabled"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[db]\npath = \"x.sqlite\"\nmax_connections = 0\n[vault]\nroot = \".\"\n").unwrap();

    let (_, stderr, success) = run_vix(&config_path, &["check"]);
    assert!(!success);
    assert!(stderr.contains("max_connections"));
}

#[test]
fn test_completions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing.toml");

    let (stdout, _, success) = run_vix(&missing, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("vix"));
}
