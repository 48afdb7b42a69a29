use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn shelf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("shelf");
    path
}

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("archive")).unwrap();
    fs::write(
        files_dir.join("ACME-kickoff.md"),
        "# Kickoff\n\nProject kickoff notes: budget review and staffing.",
    )
    .unwrap();
    fs::write(
        files_dir.join("minutes.txt"),
        "Board minutes. The budget was approved after a long review.",
    )
    .unwrap();
    fs::write(
        files_dir.join("archive/contacts.csv"),
        "name,city\nAna,Recife\nBruno,Natal\n",
    )
    .unwrap();
    fs::write(files_dir.join("archive/tmp.log"), "not indexed").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/shelf.sqlite"

[scan]
batch_size = 2

[search]
default_limit = 20

[links]
download_base = "https://files.example/download"
"#,
        root.display()
    );

    let config_path = config_dir.join("shelf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path, files_dir)
}

fn run_shelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = shelf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shelf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// init, add the files dir as root 1, scan and index it.
fn prepared_env() -> (TempDir, PathBuf) {
    let (tmp, config_path, files_dir) = setup_test_env();
    run_shelf(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_shelf(&config_path, &["root", "add", files_dir.to_str().unwrap()]);
    assert!(success, "root add failed: stdout={}, stderr={}", stdout, stderr);
    let (_, stderr, success) = run_shelf(&config_path, &["scan", "1", "--progress", "off"]);
    assert!(success, "scan failed: {}", stderr);
    let (_, stderr, success) = run_shelf(&config_path, &["index", "--progress", "off"]);
    assert!(success, "index failed: {}", stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_shelf(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, _, success1) = run_shelf(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_shelf(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_root_add_and_list() {
    let (_tmp, config_path, files_dir) = setup_test_env();
    run_shelf(&config_path, &["init"]);

    let (stdout, _, success) =
        run_shelf(&config_path, &["root", "add", files_dir.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("root 1 added"));

    let (_, _, dup) = run_shelf(&config_path, &["root", "add", files_dir.to_str().unwrap()]);
    assert!(!dup, "duplicate root path should fail");

    let (stdout, _, success) = run_shelf(&config_path, &["root", "list", "--json"]);
    assert!(success);
    let roots: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(roots.as_array().unwrap().len(), 1);
    assert_eq!(roots[0]["id"], 1);
}

#[test]
fn test_scan_reports_counts() {
    let (_tmp, config_path, files_dir) = setup_test_env();
    run_shelf(&config_path, &["init"]);
    run_shelf(&config_path, &["root", "add", files_dir.to_str().unwrap()]);

    let (stdout, stderr, success) =
        run_shelf(&config_path, &["scan", "1", "--progress", "off"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("candidates: 4"));
    assert!(stdout.contains("inserted: 4"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_scan_idempotent_no_duplicates() {
    let (_tmp, config_path, files_dir) = setup_test_env();
    run_shelf(&config_path, &["init"]);
    run_shelf(&config_path, &["root", "add", files_dir.to_str().unwrap()]);
    run_shelf(&config_path, &["scan", "1", "--progress", "off"]);

    let (stdout, _, success) =
        run_shelf(&config_path, &["scan", "1", "--json", "--progress", "off"]);
    assert!(success);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["inserted"], 0);
    assert_eq!(summary["updated"], 0);
    assert_eq!(summary["skipped"], 4);
    assert_eq!(summary["files_count"], 4);
}

#[test]
fn test_scan_unknown_root_fails() {
    let (_tmp, config_path, _) = setup_test_env();
    run_shelf(&config_path, &["init"]);

    let (_, stderr, success) = run_shelf(&config_path, &["scan", "7", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr={}", stderr);
}

#[test]
fn test_index_skips_unsupported_and_unchanged() {
    let (_tmp, config_path) = prepared_env();

    // Only .md, .txt and .csv are candidates; .log is not an indexable type.
    let (stdout, _, success) =
        run_shelf(&config_path, &["index", "--json", "--progress", "off"]);
    assert!(success);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["candidates"], 3);
    assert_eq!(summary["indexed"], 0);
    assert_eq!(summary["skipped"], 3);
}

#[test]
fn test_index_rejects_unsupported_extension() {
    let (_tmp, config_path) = prepared_env();

    let (_, stderr, success) =
        run_shelf(&config_path, &["index", "--ext", "exe", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains(".exe"), "stderr={}", stderr);
}

#[test]
fn test_search_returns_results() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, stderr, success) = run_shelf(&config_path, &["search", "budget"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ACME-kickoff.md"));
    assert!(stdout.contains("minutes.txt"));
    assert!(stdout.contains("[budget]"));
    assert!(stdout.contains("https://files.example/download/"));
}

#[test]
fn test_search_json_with_project_boost() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) = run_shelf(
        &config_path,
        &["search", "budget", "--project", "ACME", "--json"],
    );
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["name"], "ACME-kickoff.md");
    assert!(hits[0]["score"].as_f64().unwrap() > 0.0);
    assert_eq!(hits[1]["score"].as_f64().unwrap(), 0.0);
    assert!(hits[0]["file_link"].as_str().unwrap().starts_with("file:///"));
}

#[test]
fn test_search_fts_syntax() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) =
        run_shelf(&config_path, &["search", "budget NOT staffing", "--json"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["name"], "minutes.txt");

    let (stdout, _, success) = run_shelf(&config_path, &["search", "Reci*", "--json"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits[0]["name"], "contacts.csv");
}

#[test]
fn test_search_ext_filter() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) =
        run_shelf(&config_path, &["search", "budget", "--ext", "txt", "--json"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["ext"], ".txt");
}

#[test]
fn test_search_no_results() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) = run_shelf(&config_path, &["search", "xyznonexistent"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_bad_limit_fails() {
    let (_tmp, config_path) = prepared_env();

    let (_, _, success) = run_shelf(&config_path, &["search", "budget", "--limit", "0"]);
    assert!(!success);
}

#[test]
fn test_search_as_principal() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) =
        run_shelf(&config_path, &["--as", "ana", "search", "budget", "--json"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(hits.as_array().unwrap().is_empty());

    let (_, _, success) = run_shelf(&config_path, &["grant", "1", "ana", "read"]);
    assert!(success);
    let (stdout, _, success) = run_shelf(&config_path, &["grants", "1", "--json"]);
    assert!(success);
    let grants: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(grants[0]["principal"], "ana");
    assert_eq!(grants[0]["access_level"], "read");
    let (stdout, _, success) =
        run_shelf(&config_path, &["--as", "ana", "search", "budget", "--json"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 2);

    let (stdout, _, success) = run_shelf(&config_path, &["revoke", "1", "ana"]);
    assert!(success);
    assert!(stdout.contains("revoked"));
    let (_, stderr, success) = run_shelf(
        &config_path,
        &["--as", "ana", "search", "budget", "--root", "1"],
    );
    assert!(!success);
    assert!(stderr.contains("permission denied"), "stderr={}", stderr);
}

#[test]
fn test_grant_rejects_unknown_level() {
    let (_tmp, config_path) = prepared_env();

    let (_, _, success) = run_shelf(&config_path, &["grant", "1", "ana", "owner"]);
    assert!(!success);
}

#[test]
fn test_files_and_get() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) =
        run_shelf(&config_path, &["files", "--ext", "md", "--json"]);
    assert!(success);
    let files: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let files = files.as_array().unwrap();
    assert_eq!(files.len(), 1);
    let id = files[0]["id"].as_i64().unwrap().to_string();

    let (stdout, _, success) = run_shelf(&config_path, &["get", &id]);
    assert!(success);
    assert!(stdout.contains("ACME-kickoff.md"));
    assert!(stdout.contains("Project kickoff notes"));

    let (_, _, success) = run_shelf(&config_path, &["get", "999"]);
    assert!(!success);
}

#[test]
fn test_files_bad_date_fails() {
    let (_tmp, config_path) = prepared_env();

    let (_, _, success) = run_shelf(&config_path, &["files", "--since", "03/01/2024"]);
    assert!(!success);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) = run_shelf(&config_path, &["stats", "--json"]);
    assert!(success);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats[0]["cataloged"], 4);
    assert_eq!(stats[0]["indexed"], 3);

    let (stdout, _, success) = run_shelf(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Cataloged:   4"));
}

#[test]
fn test_root_remove_clears_search() {
    let (_tmp, config_path) = prepared_env();

    let (stdout, _, success) = run_shelf(&config_path, &["root", "remove", "1"]);
    assert!(success);
    assert!(stdout.contains("removed"));

    let (stdout, _, success) = run_shelf(&config_path, &["search", "budget"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_shelf(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
