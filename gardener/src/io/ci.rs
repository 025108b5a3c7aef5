//! CI environment: the only place process environment variables are read.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::debug;

use crate::io::outputs::OutputSink;

/// Values the CI runner passes through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiEnv {
    /// `GITHUB_EVENT_PATH`: JSON payload of the triggering event.
    pub event_path: Option<PathBuf>,
    /// `GITHUB_OUTPUT`: file step outputs are appended to.
    pub output_path: Option<PathBuf>,
    /// `GITHUB_REPOSITORY`: `owner/name`.
    pub repository: Option<String>,
    /// `GITHUB_WORKSPACE`: checkout root.
    pub workspace: Option<PathBuf>,
}

impl CiEnv {
    pub fn from_process() -> Self {
        let ci = Self {
            event_path: non_empty_var("GITHUB_EVENT_PATH").map(PathBuf::from),
            output_path: non_empty_var("GITHUB_OUTPUT").map(PathBuf::from),
            repository: non_empty_var("GITHUB_REPOSITORY"),
            workspace: non_empty_var("GITHUB_WORKSPACE").map(PathBuf::from),
        };
        debug!(?ci, "ci environment");
        ci
    }

    /// Event payload; an unset variable or a missing file yields an empty object.
    pub fn load_payload(&self) -> Result<Value> {
        match &self.event_path {
            Some(path) => load_payload(path),
            None => Ok(Value::Object(Map::new())),
        }
    }

    pub fn output_sink(&self) -> OutputSink {
        match &self.output_path {
            Some(path) => OutputSink::File(path.clone()),
            None => OutputSink::Stdout,
        }
    }

    /// Checkout root: the explicit override, then `GITHUB_WORKSPACE`, then `.`.
    pub fn workdir(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.workspace.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn load_payload(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "event payload missing, using empty payload");
        return Ok(Value::Object(Map::new()));
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("read event payload {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse event payload {}", path.display()))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_payload_file_is_empty_object() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ci = CiEnv {
            event_path: Some(temp.path().join("absent.json")),
            ..CiEnv::default()
        };
        assert_eq!(ci.load_payload().expect("load"), Value::Object(Map::new()));
        assert_eq!(CiEnv::default().load_payload().expect("load"), Value::Object(Map::new()));
    }

    #[test]
    fn reads_payload_and_rejects_garbage() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("event.json");
        fs::write(&path, r#"{"head_commit":{"message":"x"}}"#).expect("write");
        let ci = CiEnv {
            event_path: Some(path.clone()),
            ..CiEnv::default()
        };
        assert_eq!(ci.load_payload().expect("load")["head_commit"]["message"], "x");

        fs::write(&path, "{not json").expect("write");
        assert!(ci.load_payload().is_err());
    }

    #[test]
    fn workdir_prefers_explicit_then_workspace() {
        let ci = CiEnv {
            workspace: Some(PathBuf::from("/ws")),
            ..CiEnv::default()
        };
        assert_eq!(ci.workdir(Some(Path::new("/explicit"))), PathBuf::from("/explicit"));
        assert_eq!(ci.workdir(None), PathBuf::from("/ws"));
        assert_eq!(CiEnv::default().workdir(None), PathBuf::from("."));
        assert_eq!(CiEnv::default().output_sink(), OutputSink::Stdout);
    }
}
