//! Shared types passed between the decision core and its collaborators.
//!
//! Pull requests and comments are owned by the hosting service; the core only
//! reads these snapshots and asks the hosting adapter for mutations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// File paths touched by in-flight automated pull requests.
///
/// Ordered so that rendered instructions are stable across runs.
pub type LockSet = BTreeSet<String>;

/// Snapshot of a pull request as reported by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Free-text description; the hosting service reports `null` for empty bodies.
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub head_branch: String,
    pub url: String,
}

impl PullRequest {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label == name)
    }

    /// True if every label in `required` is present (logical AND).
    pub fn has_all_labels(&self, required: &[String]) -> bool {
        required.iter().all(|label| self.has_label(label))
    }
}

/// Inline code-review comment attached to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub path: String,
    pub line: Option<u64>,
    pub author: String,
    pub body: String,
}

/// Conversation comment on the pull request itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub author: String,
    pub body: String,
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub base: String,
    pub head: String,
    pub title: String,
    pub body: String,
}

/// Identity of a freshly created pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPullRequest {
    pub number: u64,
    pub url: String,
}

/// Label definition used when a label may need to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    /// Six hex digits, no leading `#`.
    pub color: String,
    pub description: Option<String>,
}

/// A unit of work handed to the coding agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    pub category: String,
    /// Complete natural-language directive sent to the agent.
    pub instruction_text: String,
    /// Advisory exclusions; the agent is asked not to touch these.
    pub locked_paths: LockSet,
}

/// Result reported by an agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentOutcome {
    pub success: bool,
    pub title: Option<String>,
    pub body: Option<String>,
    pub raw_output: String,
    pub error: Option<String>,
}

impl AgentOutcome {
    pub fn succeeded(raw_output: impl Into<String>) -> Self {
        Self {
            success: true,
            raw_output: raw_output.into(),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Failure reason suitable for a status line.
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "agent reported failure".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_all_labels_is_logical_and() {
        let pr = PullRequest {
            number: 1,
            title: "t".to_string(),
            body: None,
            labels: vec!["gardener".to_string(), "gardener:lint".to_string()],
            head_branch: "b".to_string(),
            url: String::new(),
        };
        assert!(pr.has_all_labels(&["gardener".to_string()]));
        assert!(pr.has_all_labels(&[
            "gardener".to_string(),
            "gardener:lint".to_string()
        ]));
        assert!(!pr.has_all_labels(&["gardener".to_string(), "other".to_string()]));
        assert!(pr.has_all_labels(&[]));
    }
}
