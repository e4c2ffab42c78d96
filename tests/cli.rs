//! Binary-level tests for the kbsync CLI.

use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SETTINGS_ENV: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "ASSISTANT_ID",
    "VECTOR_STORE_ID",
    "ARTICLES_DIR",
    "SYNC_STATE_FILE",
    "RUN_SUMMARY_FILE",
    "SCRAPE_COMMAND",
    "MIN_SNAPSHOT_RATIO",
    "RUST_LOG",
];

/// `kbsync` in `dir` with no inherited settings.
fn kbsync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kbsync").unwrap();
    cmd.current_dir(dir);
    for var in SETTINGS_ENV {
        cmd.env_remove(var);
    }
    cmd
}

fn write_article(dir: &Path, name: &str, content: &str) {
    let articles = dir.join("articles");
    fs::create_dir_all(&articles).unwrap();
    fs::write(articles.join(name), content).unwrap();
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn stderr_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stderr).unwrap()
}

#[test]
fn test_version_json() {
    let temp = TempDir::new().unwrap();
    let output = kbsync(temp.path())
        .args(["version", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let info = stdout_json(&output);
    assert_eq!(info["name"], "kbsync");
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info["state_file"], "sync_state.json");
}

#[test]
fn test_run_without_credentials_is_config_error() {
    let temp = TempDir::new().unwrap();
    write_article(temp.path(), "a.md", "# A");

    let output = kbsync(temp.path()).args(["run", "--json"]).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    let err = stderr_json(&output);
    assert_eq!(err["error"]["code"], "MISSING_CREDENTIAL");
    assert!(!temp.path().join("sync_state.json").exists());

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp.path().join("runs/last_run.json")).unwrap())
            .unwrap();
    assert_eq!(summary["status"], "error");
    assert_eq!(summary["error"]["code"], "MISSING_CREDENTIAL");
}

#[test]
fn test_run_missing_ids_writes_error_summary() {
    let temp = TempDir::new().unwrap();
    write_article(temp.path(), "a.md", "# A");

    let output = kbsync(temp.path())
        .env("OPENAI_API_KEY", "sk-test")
        .args(["run", "--json", "--summary-file", "out/summary.json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp.path().join("out/summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["status"], "error");
    assert_eq!(summary["error"]["code"], "MISSING_CREDENTIAL");
    assert_eq!(summary["uploaded"], 0);
}

#[test]
fn test_status_reports_new_documents() {
    let temp = TempDir::new().unwrap();
    write_article(temp.path(), "b.md", "# B");
    write_article(temp.path(), "a.md", "# A");
    write_article(temp.path(), "notes.txt", "ignored");

    let output = kbsync(temp.path())
        .args(["status", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let status = stdout_json(&output);
    assert_eq!(status["documents"], 2);
    assert_eq!(status["added"], serde_json::json!(["a.md", "b.md"]));
    assert_eq!(status["removed"], serde_json::json!([]));
    assert!(status.get("guard_violation").is_none());
}

#[test]
fn test_status_against_existing_state() {
    let temp = TempDir::new().unwrap();
    write_article(temp.path(), "a.md", "# A");
    fs::write(
        temp.path().join("sync_state.json"),
        r#"{"files": {"a.md": {"sha256": "stale", "file_id": "file-1"}, "gone.md": {"sha256": "x"}}}"#,
    )
    .unwrap();

    let output = kbsync(temp.path())
        .args(["status", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let status = stdout_json(&output);
    assert_eq!(status["updated"][0]["key"], "a.md");
    assert_eq!(status["updated"][0]["reason"], "content");
    assert_eq!(status["removed"], serde_json::json!(["gone.md"]));
}

#[test]
fn test_status_missing_directory() {
    let temp = TempDir::new().unwrap();

    let output = kbsync(temp.path())
        .args(["status", "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stderr_json(&output)["error"]["code"], "SOURCE_MISSING");
}

#[test]
fn test_completions() {
    let temp = TempDir::new().unwrap();
    kbsync(temp.path())
        .args(["completions", "bash"])
        .assert()
        .success();
}
