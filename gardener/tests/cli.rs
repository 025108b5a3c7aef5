//! CLI tests for `gardener run` and `gardener config`.
//!
//! Spawns the gardener binary with a scrubbed CI environment. `PATH` points
//! at an empty directory so any attempt to reach the hosting service fails.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use gardener::exit_codes;

fn gardener(workdir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gardener"));
    cmd.current_dir(workdir)
        .args(args)
        .arg("--workdir")
        .arg(workdir)
        .env("PATH", workdir.join("no-bin"))
        .env_remove("GITHUB_EVENT_PATH")
        .env_remove("GITHUB_OUTPUT")
        .env_remove("GITHUB_REPOSITORY")
        .env_remove("GITHUB_WORKSPACE")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn unknown_event_exits_with_unknown_event_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let outputs = temp.path().join("outputs");

    let output = gardener(temp.path(), &["run", "issues"])
        .env("GITHUB_OUTPUT", &outputs)
        .output()
        .expect("gardener run");

    assert_eq!(output.status.code(), Some(exit_codes::UNKNOWN_EVENT));
    assert!(stdout(&output).contains("Unknown event type: issues"));
    assert!(!outputs.exists());
}

#[test]
fn push_without_marker_is_ignored() {
    let temp = tempfile::tempdir().expect("tempdir");
    let event = temp.path().join("event.json");
    fs::write(&event, r#"{"head_commit":{"message":"Bump deps"}}"#).expect("write event");

    let output = gardener(temp.path(), &["run", "push"])
        .env("GITHUB_EVENT_PATH", &event)
        .output()
        .expect("gardener run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("Push is not from a gardener PR"));
}

#[test]
fn review_event_without_pull_request_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let event = temp.path().join("event.json");
    fs::write(&event, r#"{"review":{"state":"approved"}}"#).expect("write event");

    let output = gardener(temp.path(), &["run", "pull_request_review"])
        .env("GITHUB_EVENT_PATH", &event)
        .output()
        .expect("gardener run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("pull_request.number"));
}

#[test]
fn config_prints_effective_settings() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("gardener.toml"),
        "[workers]\nmax_concurrent = 7\n",
    )
    .expect("write config");

    let output = gardener(temp.path(), &["config"]).output().expect("gardener config");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("[workers]"));
    assert!(text.contains("max_concurrent = 7"));
    assert!(text.contains("max_iterations_per_pr = 5"));
}

#[test]
fn config_write_scaffolds_default_file() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = gardener(temp.path(), &["config", "--write"])
        .output()
        .expect("gardener config --write");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let written = fs::read_to_string(temp.path().join("gardener.toml")).expect("config written");
    let cfg = gardener::io::config::parse_config(&written).expect("parse");
    assert_eq!(cfg, gardener::io::config::GardenerConfig::default());
}
