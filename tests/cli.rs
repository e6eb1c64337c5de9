use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn kidx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kidx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let knowledge = root.join("knowledge");
    fs::create_dir_all(&knowledge).unwrap();
    fs::write(
        knowledge.join("accounts.txt"),
        "Checking accounts offer debit cards. Savings accounts earn interest.",
    )
    .unwrap();
    fs::write(
        knowledge.join("loans.txt"),
        "Personal loans carry fixed rates.\n\nMortgage terms run fifteen or thirty years.",
    )
    .unwrap();
    fs::write(knowledge.join("README.md"), "not indexed").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[knowledge]
dir = "{root}/knowledge"

[index]
path = "{root}/vector_db"
collection = "banking_knowledge"

[embedding]
provider = "hash"
dims = 128
"#,
        root = root.display()
    );
    let config_path = config_dir.join("kidx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kidx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kidx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kidx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_rebuild_then_skip() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kidx(&config_path, &["rebuild", "--force"]);
    assert!(success, "rebuild failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("from 2 files"), "stdout={}", stdout);
    assert!(stdout.contains("Time taken"));

    let (stdout, _, success) = run_kidx(&config_path, &["rebuild"]);
    assert!(success);
    assert!(stdout.contains("up to date"), "stdout={}", stdout);
}

#[test]
fn test_info_lists_collection_and_files() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_kidx(&config_path, &["info"]);
    assert!(success);
    assert!(stdout.contains("Status: not found"));
    assert!(stdout.contains("Text files: 2"));

    run_kidx(&config_path, &["rebuild", "--force"]);
    let (stdout, _, success) = run_kidx(&config_path, &["info"]);
    assert!(success);
    assert!(stdout.contains("Collection: banking_knowledge"));
    assert!(stdout.contains("Status: active"));
    assert!(stdout.contains("Vector size: 128"));
    assert!(stdout.contains(" - accounts.txt ("));
    assert!(!stdout.contains("README.md"));
}

#[test]
fn test_collection_flag_overrides_config() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_kidx(&config_path, &["-c", "faq", "rebuild", "--force"]);
    assert!(success);
    let (stdout, _, success) = run_kidx(&config_path, &["collections"]);
    assert!(success);
    assert!(stdout.contains("1. faq"), "stdout={}", stdout);
}

#[test]
fn test_collections_empty() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, _, success) = run_kidx(&config_path, &["collections"]);
    assert!(success);
    assert!(stdout.contains("No collections found."));
}

#[test]
fn test_query_builds_on_demand() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_kidx(&config_path, &["query", "What is a checking account?"]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Source: accounts.txt"), "stdout={}", stdout);
    assert!(stdout.contains("Content:\nChecking accounts offer debit cards."));
}

#[test]
fn test_backup_delete_restore() {
    let (tmp, config_path) = setup_test_env();
    run_kidx(&config_path, &["rebuild", "--force"]);

    let (stdout, stderr, success) = run_kidx(&config_path, &["backup"]);
    assert!(success, "backup failed: stdout={}, stderr={}", stdout, stderr);
    let backup_path = stdout
        .lines()
        .find_map(|l| l.strip_prefix("Backup created at "))
        .expect("backup path in output")
        .trim()
        .to_string();

    let (stdout, _, success) = run_kidx(&config_path, &["delete", "--confirm"]);
    assert!(success);
    assert!(stdout.contains("has been deleted"));
    assert!(!tmp.path().join("vector_db").exists());

    let (stdout, stderr, success) = run_kidx(&config_path, &["restore", "-b", &backup_path]);
    assert!(success, "restore failed: stdout={}, stderr={}", stdout, stderr);

    let (stdout, _, _) = run_kidx(&config_path, &["info"]);
    assert!(stdout.contains("Status: active"));
}

#[test]
fn test_delete_without_confirmation_is_cancelled() {
    let (tmp, config_path) = setup_test_env();
    run_kidx(&config_path, &["rebuild", "--force"]);

    let (stdout, _, success) = run_kidx(&config_path, &["delete"]);
    assert!(success);
    assert!(stdout.contains("Deletion cancelled."));
    assert!(tmp.path().join("vector_db").exists());
}

#[test]
fn test_restore_missing_backup_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope");
    let (_, stderr, success) =
        run_kidx(&config_path, &["restore", "-b", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("backup directory not found"), "stderr={}", stderr);
}

#[test]
fn test_rebuild_empty_knowledge_fails() {
    let (tmp, config_path) = setup_test_env();
    let empty = tmp.path().join("empty");
    fs::create_dir_all(&empty).unwrap();

    let (_, stderr, success) = run_kidx(
        &config_path,
        &["-k", empty.to_str().unwrap(), "rebuild", "--force"],
    );
    assert!(!success);
    assert!(stderr.contains("No text files found"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.toml");
    let db = tmp.path().join("db");
    let (stdout, _, success) = run_kidx(
        &missing,
        &["-d", db.to_str().unwrap(), "collections"],
    );
    assert!(success);
    assert!(stdout.contains("No collections found."));
}
