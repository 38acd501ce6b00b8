//! Integration tests for the `ligo` binary.
//!
//! These tests exercise the CLI binary via `assert_cmd`. Commands that need
//! a USB bus are only checked through `--help`, since the test host may have
//! no usbfs access.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn cli() -> assert_cmd::Command {
    cargo_bin_cmd!("ligo")
}

#[test]
fn cli_help_succeeds() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ligo"));
}

#[test]
fn cli_version_prints_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_without_subcommand_fails() {
    cli().assert().failure();
}

// ── config ──

#[test]
fn cli_config_json_produces_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let output = cli()
        .args(["--json", "config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value =
        serde_json::from_slice(&output).expect("config --json should produce valid JSON");
    assert!(json["settings"].is_object());
    assert_eq!(json["config_file_exists"], false);
    assert_eq!(json["settings"]["identity"]["manufacturer"], "ligo");
}

#[test]
fn cli_config_save_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    cli()
        .args(["config", "--save", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("(loaded)"));
    assert!(path.exists());
}

#[test]
fn cli_config_reports_custom_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[identity]\nmodel = \"Dock\"\n").unwrap();
    cli()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Dock\""));
}

#[test]
fn cli_config_invalid_toml_warns_and_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "this is { not toml").unwrap();
    cli()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("config parse error"));
}

// ── --verbose flag ──

#[test]
fn cli_verbose_flag_accepted() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .args(["-v", "config", "--config"])
        .arg(dir.path().join("config.toml"))
        .assert()
        .success();
}

#[test]
fn cli_verbose_long_flag_accepted() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .args(["--verbose", "config", "--config"])
        .arg(dir.path().join("config.toml"))
        .assert()
        .success();
}

// ── Device commands (help only) ──

#[test]
fn cli_devices_help_succeeds() {
    cli()
        .args(["devices", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("accessory mode"));
}

#[test]
fn cli_probe_help_succeeds() {
    cli()
        .args(["probe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("protocol version"));
}

#[test]
fn cli_switch_help_lists_identity_overrides() {
    cli()
        .args(["switch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--manufacturer"))
        .stdout(predicate::str::contains("--wait"));
}

#[test]
fn cli_read_help_succeeds() {
    cli()
        .args(["read", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--hex"));
}

#[test]
fn cli_write_help_succeeds() {
    cli()
        .args(["write", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stdin"));
}

#[test]
fn cli_rejects_bad_device_selector() {
    cli()
        .args(["endpoints", "--device", "phone"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid USB ID"));
}
