//! Smoke tests to verify command wiring

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("bulkmail").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_serve_help() {
    let mut cmd = Command::cargo_bin("bulkmail").unwrap();
    cmd.arg("serve").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("API_TOKEN"))
        .stdout(predicate::str::contains("--batch-delay-ms"));
}

#[test]
fn test_migrate_help() {
    let mut cmd = Command::cargo_bin("bulkmail").unwrap();
    cmd.arg("migrate").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_serve_requires_token() {
    let mut cmd = Command::cargo_bin("bulkmail").unwrap();
    cmd.env_remove("API_TOKEN")
        .env_remove("DATABASE_URL")
        .current_dir(std::env::temp_dir())
        .arg("serve");

    cmd.assert().failure();
}

#[test]
fn test_unknown_log_format_rejected() {
    let mut cmd = Command::cargo_bin("bulkmail").unwrap();
    cmd.args(["--log-format", "xml", "migrate", "--database-url", "x"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("xml"));
}
