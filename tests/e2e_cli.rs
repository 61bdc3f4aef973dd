//! CLI end-to-end tests
//!
//! Tests for the mediamill command-line interface.

mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the mediamill binary
#[allow(deprecated)]
fn mediamill_cmd() -> Command {
    Command::cargo_bin("mediamill").unwrap()
}

/// Config that keeps image work on the in-process encoder.
fn in_process_config(dir: &Path) -> PathBuf {
    let path = dir.join("mediamill.toml");
    fs::write(
        &path,
        "[queue]\nconcurrency = 2\n\n[tools]\nimage_tool_candidates = []\n",
    )
    .unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = mediamill_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = mediamill_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediamill"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = mediamill_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "mediamill {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_formats_json() {
    let output = mediamill_cmd()
        .args(["formats", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let image = json["image"].as_array().unwrap();
    assert!(image.iter().any(|f| f == "webp"));
    assert!(json["7z"].as_array().unwrap().iter().any(|f| f == "7z"));
    assert!(json["document"].as_array().unwrap().iter().any(|f| f == "pdf"));
}

#[test]
fn test_cli_formats_plain() {
    mediamill_cmd()
        .arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("video"))
        .stdout(predicate::str::contains("mp4"));
}

#[test]
fn test_cli_check_tools_json() {
    let output = mediamill_cmd()
        .args(["check-tools", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(json["tools"].as_array().unwrap().iter().any(|t| t["name"] == "ffmpeg"));
    // The in-process encoder keeps images available regardless of tools.
    assert_eq!(json["families"]["image"], true);
    assert!(json["all_required_available"].is_boolean());
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = in_process_config(dir.path());

    mediamill_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Concurrency: 2"))
        .stdout(predicate::str::contains("image_tool_candidates is empty"));
}

#[test]
fn test_cli_validate_rejects_zero_concurrency() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[queue]\nconcurrency = 0\n").unwrap();

    mediamill_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_cli_convert_png_to_bmp() {
    let dir = tempdir().unwrap();
    let config = in_process_config(dir.path());
    let input = common::noisy_png(dir.path(), "pic.png", 16);

    let output = mediamill_cmd()
        .arg("--config")
        .arg(&config)
        .arg("convert")
        .arg(&input)
        .args(["--to", "bmp"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let out_path = PathBuf::from(String::from_utf8(output.stdout).unwrap().trim());
    assert_eq!(out_path.extension().unwrap(), "bmp");
    assert!(out_path.exists());
}

#[test]
fn test_cli_convert_rejects_bad_options() {
    let dir = tempdir().unwrap();
    let input = common::noisy_png(dir.path(), "pic.png", 4);

    mediamill_cmd()
        .arg("convert")
        .arg(&input)
        .args(["--to", "jpg", "--options", r#"{"quality": 500}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid options"));
}

#[test]
fn test_cli_convert_missing_input() {
    mediamill_cmd()
        .args(["convert", "/nonexistent/file.png", "--to", "jpg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_convert_unsupported_format() {
    let dir = tempdir().unwrap();
    let input = common::noisy_png(dir.path(), "pic.png", 4);

    mediamill_cmd()
        .arg("convert")
        .arg(&input)
        .args(["--to", "xyz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xyz"));
}

#[test]
fn test_cli_compress_requires_minimum_target() {
    let dir = tempdir().unwrap();
    let input = common::noisy_png(dir.path(), "pic.png", 4);

    mediamill_cmd()
        .arg("compress")
        .arg(&input)
        .args(["--target", "100"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("minimum"));
}

#[test]
fn test_cli_compress_already_small() {
    let dir = tempdir().unwrap();
    let input = common::noisy_png(dir.path(), "pic.png", 4);

    mediamill_cmd()
        .arg("compress")
        .arg(&input)
        .args(["--target", "20480"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trials: 0"));
}

#[test]
fn test_cli_batch_reports_failures() {
    let dir = tempdir().unwrap();
    let config = in_process_config(dir.path());
    let good = common::noisy_png(dir.path(), "a.png", 8);
    let missing = dir.path().join("gone.png");

    mediamill_cmd()
        .arg("--config")
        .arg(&config)
        .args(["batch", "--to", "bmp"])
        .arg(&good)
        .arg(&missing)
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 converted, 1 failed"));
}

#[test]
fn test_cli_zero_concurrency_override_fails() {
    let dir = tempdir().unwrap();
    let input = common::noisy_png(dir.path(), "pic.png", 4);

    mediamill_cmd()
        .args(["--concurrency", "0", "convert"])
        .arg(&input)
        .args(["--to", "bmp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}
