//! End-to-end CLI tests for the harvester binary.
//!
//! None of these reach a browser: each run stops at argument parsing, config
//! loading, or recognizer lookup.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with config discovery pointed at an empty directory.
fn harvester(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("HARVESTER_TESSERACT_PATH")
        .env_remove("HARVESTER_CHROMIUM_PATH")
        .env_remove("RUST_LOG")
        .current_dir(home.path());
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Harvest datasets"))
        .stdout(predicate::str::contains("--captcha-attempts"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvester"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_verbose_and_quiet_conflict() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .args(["-v", "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_binary_rejects_inverted_page_range() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .args(["--first-page", "5", "--last-page", "2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("last_page"));
}

#[test]
fn test_binary_rejects_zero_captcha_attempts() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .args(["--captcha-attempts", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("captcha-attempts"));
}

#[test]
fn test_binary_rejects_invalid_base_url() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .args(["--base-url", "not a url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("base-url"));
}

#[test]
fn test_binary_missing_config_file_fails() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("nope.toml");
    harvester(&home)
        .arg("--config")
        .arg(&missing)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load config file"));
}

#[test]
fn test_binary_rejects_unknown_config_key() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("harvester.toml");
    fs::write(&config, "first_page = 1\ncolour = \"blue\"\n").unwrap();

    harvester(&home)
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("colour"));
}

#[test]
fn test_binary_default_config_file_is_applied() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config").join("portal-harvester");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), "first_page = 9\nlast_page = 3\n").unwrap();

    harvester(&home)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("last_page (3)"));
}

#[test]
fn test_binary_missing_tesseract_fails_before_browser() {
    let home = TempDir::new().unwrap();
    harvester(&home)
        .args(["--tesseract-path", "/nonexistent/tesseract", "-q"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CAPTCHA recognition is unavailable"));

    assert!(!home.path().join("telanganadatasets").exists());
}
