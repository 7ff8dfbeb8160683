//! Smoke tests of the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> (TempDir, Command) {
    let dir = TempDir::new().expect("temp dir");
    let mut cmd = Command::cargo_bin("quay-usage").expect("binary builds");
    cmd.current_dir(dir.path());
    cmd.arg("--db").arg(dir.path().join("usage.db"));
    (dir, cmd)
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("quay-usage")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetch"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("growth"));
}

#[test]
fn stats_on_fresh_store_reports_zero_entries() {
    let (_dir, mut cmd) = cmd();
    cmd.args(["stats", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_entries\": 0"));
}

#[test]
fn export_on_fresh_store_emits_header_only() {
    let (_dir, mut cmd) = cmd();
    let output = cmd.args(["export", "--format", "csv"]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.starts_with("timestamp,repository,datetime_text,kind"));
    assert_eq!(stdout.lines().count(), 1);
}

#[test]
fn fetch_without_token_fails_clearly() {
    let (_dir, mut cmd) = cmd();
    cmd.env_remove("QUAY_API_TOKEN")
        .arg("fetch")
        .assert()
        .failure()
        .stderr(predicate::str::contains("QUAY_API_TOKEN"));
}

#[test]
fn fetch_rejects_malformed_dates() {
    let (_dir, mut cmd) = cmd();
    cmd.env("QUAY_API_TOKEN", "test-token")
        .args(["fetch", "--start-date", "05/01/2025"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid date format"));
}
