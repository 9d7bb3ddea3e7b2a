//! Integration tests for the `devlink` CLI binary.
//!
//! These cover argument parsing, help output, shell completions, config
//! handling and error exit codes. None of them need a live device.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `devlink` binary with env isolation.
///
/// Clears all `DEVLINK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn devlink_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("devlink");
    cmd.env("HOME", "/tmp/devlink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/devlink-cli-test-nonexistent")
        .env_remove("DEVLINK_PROFILE")
        .env_remove("DEVLINK_CONFIG")
        .env_remove("DEVLINK_USERNAME")
        .env_remove("DEVLINK_PASSWORD")
        .env_remove("DEVLINK_TOKEN")
        .env_remove("DEVLINK_SESSION_KEY")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Write `contents` as the config file inside `dir`.
fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

const PANEL_CONFIG: &str = r#"
default_profile = "panel"

[profiles.panel]
transport = "tcp"
host = "127.0.0.1"
port = 1
auth = "password"
username = "installer"
password = "hunter2"

[profiles.gateway]
transport = "http"
url = "http://192.0.2.10/production.json"
poll_interval = "30s"

[profiles.broken]
transport = "websocket"
"#;

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = devlink_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    devlink_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("monitor")
            .and(predicate::str::contains("request"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    devlink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("devlink"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    devlink_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    devlink_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    devlink_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    devlink_cmd()
        .args(["config", "path", "--config", "/tmp/devlink-elsewhere.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/devlink-elsewhere.toml"));
}

#[test]
fn test_config_show_masks_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    devlink_cmd()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("installer")
                .and(predicate::str::contains("********"))
                .and(predicate::str::contains("hunter2").not()),
        );
}

#[test]
fn test_config_profiles_marks_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    devlink_cmd()
        .args(["config", "profiles", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("panel *")
                .and(predicate::str::contains("gateway"))
                .and(predicate::str::contains("gateway *").not()),
        );
}

#[test]
fn test_config_use_switches_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    devlink_cmd()
        .args(["config", "use", "gateway", "--config"])
        .arg(&path)
        .assert()
        .success();

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains(r#"default_profile = "gateway""#), "{saved}");
}

#[test]
fn test_config_validate_reports_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    devlink_cmd()
        .args(["config", "validate", "-p", "gateway", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains(r#""valid": true"#)
                .and(predicate::str::contains("http://192.0.2.10/production.json")),
        );
}

#[test]
fn test_config_validate_incomplete_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    devlink_cmd()
        .args(["config", "validate", "-p", "broken", "--config"])
        .arg(&path)
        .assert()
        .code(9);
}

#[test]
fn test_unknown_profile_lists_alternatives() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    let output = devlink_cmd()
        .args(["config", "validate", "-p", "attic", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(9));
    let text = combined_output(&output);
    assert!(text.contains("attic"), "{text}");
    assert!(text.contains("gateway"), "{text}");
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = devlink_cmd().arg("foobar").output().unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid subcommand"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_malformed_entity_key() {
    devlink_cmd()
        .args(["request", "zone-three", "status"])
        .assert()
        .code(2);
}

#[test]
fn test_request_args_must_be_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    devlink_cmd()
        .args(["request", "zone:3", "bypass", "--args", "{level", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--args"));
}

#[test]
fn test_request_without_config_names_the_profile() {
    let output = devlink_cmd()
        .args(["request", "zone:3", "status"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(9));
    let text = combined_output(&output);
    assert!(text.contains("default"), "{text}");
}

#[test]
fn test_request_to_unreachable_device() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), PANEL_CONFIG);

    let output = devlink_cmd()
        .args(["request", "zone:3", "status", "--connect-timeout", "3s", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    let code = output.status.code();
    assert!(
        code == Some(7) || code == Some(8),
        "Expected connection or timeout exit code, got {code:?}:\n{}",
        combined_output(&output)
    );
}
