//! CLI tests for `procstream run` and `procstream init-config`.
//!
//! Spawns the binary and checks printed lines and exit codes.

#![cfg(unix)]

use std::process::Command;
use std::time::{Duration, Instant};

use procstream::exit_codes;
use procstream::io::config::{StreamConfig, load_config};

fn procstream() -> Command {
    Command::new(env!("CARGO_BIN_EXE_procstream"))
}

#[test]
fn run_prints_both_streams_and_forwards_exit_code() {
    let output = procstream()
        .args(["run", "--", "sh", "-c", "echo started; echo oops >&2; exit 3"])
        .output()
        .expect("procstream run");

    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stdout: started"), "{stdout}");
    assert!(stdout.contains("stderr: oops"), "{stdout}");
}

#[test]
fn cancel_after_stops_printing_stdout() {
    let output = procstream()
        .args([
            "run",
            "--no-stderr",
            "--cancel-after",
            "1",
            "--",
            "sh",
            "-c",
            "echo started; echo closed",
        ])
        .output()
        .expect("procstream run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "stdout: started\n");
}

#[test]
fn sync_mode_reads_with_blocking_readers() {
    let output = procstream()
        .args(["run", "--sync", "--", "sh", "-c", "printf 'a\\r\\nb'"])
        .output()
        .expect("procstream run --sync");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "stdout: a\nstdout: b\n");
}

#[test]
fn timeout_kills_child() {
    let output = procstream()
        .args([
            "run",
            "--no-stderr",
            "--timeout-ms",
            "200",
            "--",
            "sh",
            "-c",
            "exec sleep 30",
        ])
        .output()
        .expect("procstream run");

    assert_eq!(output.status.code(), Some(exit_codes::TIMED_OUT));
}

#[test]
fn sync_mode_timeout_kills_child() {
    let started = Instant::now();
    let output = procstream()
        .args([
            "run",
            "--sync",
            "--timeout-ms",
            "200",
            "--",
            "sh",
            "-c",
            "echo begin; exec sleep 30",
        ])
        .output()
        .expect("procstream run --sync");

    assert_eq!(output.status.code(), Some(exit_codes::TIMED_OUT));
    assert!(started.elapsed() < Duration::from_secs(20));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("stdout: begin"), "stdout: {stdout}");
}

#[test]
fn missing_program_is_invalid() {
    let output = procstream()
        .args(["run", "--", "procstream-no-such-program"])
        .output()
        .expect("procstream run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("start process"), "{stderr}");
}

#[test]
fn init_config_writes_defaults_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("procstream.toml");

    let status = procstream()
        .arg("init-config")
        .arg(&path)
        .status()
        .expect("init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(load_config(&path).expect("load"), StreamConfig::default());

    let status = procstream()
        .arg("init-config")
        .arg(&path)
        .status()
        .expect("init-config again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = procstream()
        .args(["init-config", "--force"])
        .arg(&path)
        .status()
        .expect("init-config --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}
