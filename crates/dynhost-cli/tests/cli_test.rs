//! CLI Tests

use assert_cmd::Command;
use predicates::prelude::*;

fn dynhost() -> Command {
    let mut cmd = Command::cargo_bin("dynhost").unwrap();
    cmd.env_remove("DYNHOST_CANONICALIZE")
        .env_remove("DYNHOST_INIT_SUFFIX")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help() {
    dynhost()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("open"));
}

#[test]
fn test_open_missing_file_fails() {
    dynhost()
        .args(["open", "/nonexistent/dynhost/missing.so"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("realpath failed"));
}

#[test]
fn test_open_non_library_fails_with_native_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fake.so");
    std::fs::write(&path, b"not an ELF").unwrap();

    dynhost()
        .args(["--json", "open", path.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"failed\""));
}

#[test]
fn test_config_file_and_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dynhost.toml");
    std::fs::write(&path, "init_suffix = \"._start\"\n").unwrap();

    dynhost()
        .args(["--config", path.to_str().unwrap(), "config"])
        .env("DYNHOST_CANONICALIZE", "false")
        .assert()
        .success()
        .stdout(predicate::str::contains("init_suffix = \"._start\""))
        .stdout(predicate::str::contains("canonicalize_paths = false"));
}

#[test]
fn test_invalid_config_reports_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "init_suffix = \"\"\n").unwrap();

    dynhost()
        .args(["--config", path.to_str().unwrap(), "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("init_suffix"));
}

#[test]
fn test_default_log_level_shows_info() {
    dynhost()
        .args(["open", "/nonexistent/dynhost/missing.so"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Opened 0 of 1 plugin(s)"))
        .stderr(predicate::str::contains("Not every requested plugin"));
}
