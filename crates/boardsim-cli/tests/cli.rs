//! End-to-end tests for the boardsim binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn boardsim() -> Command {
    let mut cmd = Command::cargo_bin("boardsim").expect("binary should build");
    cmd.env_remove("BOARDSIM_CONFIG");
    cmd
}

fn write_config(dir: &Path, json: &str) -> std::path::PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, json).expect("Failed to write config");
    path
}

#[test]
fn test_decode_prints_frame() {
    boardsim()
        .args(["decode", "3 0xC0 0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 192 0"))
        .stdout(predicate::str::contains("leds [......**] digits [0000]"));
}

#[test]
fn test_decode_dark_digits() {
    // anodes 0b1110: only the rightmost digit is driven
    boardsim()
        .args(["decode", "0 0x92 14"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digits [___5]"));
}

#[test]
fn test_decode_json() {
    let output = boardsim()
        .args(["decode", "--json", "1 0xF9 0"])
        .output()
        .expect("Failed to run boardsim");
    assert!(output.status.success());

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("decode --json should print JSON");
    assert_eq!(value["output"]["leds"], 1);
    assert_eq!(value["output"]["segments"], 0xF9);
    assert_eq!(value["digit"], 1);
    assert_eq!(value["frame"]["leds"][0], true);
}

#[test]
fn test_decode_uses_config_layout() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(dir.path(), r#"{ "layout": { "leds": 4, "digits": 2 } }"#);

    boardsim()
        .args(["decode", "5 0xC0 0", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("leds [.*.*] digits [00]"));
}

#[test]
fn test_decode_malformed_payload_fails() {
    boardsim()
        .args(["decode", "1 2"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("protocol error"));

    boardsim()
        .args(["decode", "1 256 0"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_backend_native() {
    // keep the user's own config out of the test
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(dir.path(), "{}");

    boardsim()
        .env("BOARDSIM_CONFIG", &config)
        .args(["backend", "native"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("native"));
}

#[test]
fn test_backend_unknown_fails() {
    boardsim()
        .args(["backend", "docker"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend"));
}

#[test]
fn test_run_requires_files() {
    boardsim().arg("run").assert().failure().code(2);
}

#[test]
fn test_run_missing_source_is_staging_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(dir.path(), r#"{ "channel": { "bind": "127.0.0.1:0" } }"#);

    boardsim()
        .args(["run", "--backend", "native", "--config"])
        .arg(&config)
        .arg(dir.path().join("missing.v"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to stage"))
        .stderr(predicate::str::contains("hint:"));
}

#[cfg(unix)]
#[test]
fn test_run_reports_compile_failure() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source = dir.path().join("top.v");
    fs::write(&source, "module top(; endmodule").expect("Failed to write source");
    let config = write_config(
        dir.path(),
        r#"{
            "toolchain": {
                "configure": { "program": "sh", "args": ["-c", "echo delay={sim_delay}"] },
                "build": { "program": "sh", "args": ["-c", "echo 'top.v:1: syntax error' >&2; exit 1"] },
                "binary": "sim"
            },
            "channel": { "bind": "127.0.0.1:0" }
        }"#,
    );

    boardsim()
        .args(["run", "--backend", "native", "--sim-delay", "7", "--config"])
        .arg(&config)
        .arg(&source)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("delay=7"))
        .stderr(predicate::str::contains("syntax error"))
        .stderr(predicate::str::contains("build step failed with exit code 1"));
}
