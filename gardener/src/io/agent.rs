//! Coding-agent abstraction.
//!
//! The [`Agent`] trait decouples orchestration from the actual agent backend
//! (an external CLI, `claude --print` by default). Tests use scripted agents
//! that return predetermined outcomes without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::types::AgentOutcome;
use crate::io::config::AgentConfig;
use crate::io::git::Git;
use crate::io::process::{Limits, run_bounded};

/// Bytes of agent output quoted in a failure reason.
const FAILURE_TAIL_BYTES: usize = 2_000;

/// Parameters for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    /// Natural-language directive passed to the agent.
    pub instruction: String,
    /// Remote branch the agent works on; it must already exist.
    pub branch: String,
    /// Message for the commit that captures the agent's edits.
    pub commit_message: String,
}

/// Abstraction over agent execution backends.
///
/// `Ok` with an unsuccessful outcome means the agent ran and failed (timeout,
/// non-zero exit, no edits). `Err` is reserved for infrastructure failures
/// such as git plumbing.
pub trait Agent {
    fn run(&self, request: &AgentRequest) -> Result<AgentOutcome>;
}

/// Agent that runs a configured CLI inside a git checkout, then commits and
/// pushes whatever it changed.
#[derive(Debug, Clone)]
pub struct CliAgent {
    git: Git,
    command: Vec<String>,
    limits: Limits,
    remote: String,
}

impl CliAgent {
    pub fn new(git: Git, config: &AgentConfig) -> Self {
        Self {
            git,
            command: config.command.clone(),
            limits: Limits {
                timeout: Duration::from_secs(config.timeout_secs),
                output_limit_bytes: config.output_limit_bytes,
            },
            remote: config.remote.clone(),
        }
    }

    fn build_command(&self, instruction: &str) -> Option<Command> {
        let (program, args) = self.command.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(instruction).current_dir(self.git.workdir());
        Some(cmd)
    }
}

impl Agent for CliAgent {
    #[instrument(skip_all, fields(branch = %request.branch, timeout_secs = self.limits.timeout.as_secs()))]
    fn run(&self, request: &AgentRequest) -> Result<AgentOutcome> {
        self.git
            .fetch_branch(&self.remote, &request.branch)
            .with_context(|| format!("fetch {}", request.branch))?;
        self.git
            .checkout_remote_branch(&self.remote, &request.branch)
            .with_context(|| format!("checkout {}", request.branch))?;

        let Some(cmd) = self.build_command(&request.instruction) else {
            return Ok(AgentOutcome::failed("agent command is empty"));
        };
        info!(program = %self.command[0], "starting agent");
        let output = match run_bounded(cmd, &self.limits) {
            Ok(output) => output,
            Err(err) => {
                let reason = format!("agent could not be started: {err:#}");
                warn!(err = %reason, "agent spawn failed");
                return Ok(AgentOutcome::failed(reason));
            }
        };
        let raw_output = output.transcript();

        if output.timed_out {
            warn!("agent timed out");
            return Ok(AgentOutcome {
                raw_output,
                ..AgentOutcome::failed(format!("agent timed out after {:?}", self.limits.timeout))
            });
        }
        if !output.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            let reason = format!(
                "agent exited with status {:?}: {}",
                output.status.code(),
                tail(&raw_output, FAILURE_TAIL_BYTES)
            );
            return Ok(AgentOutcome {
                raw_output,
                ..AgentOutcome::failed(reason)
            });
        }

        if !self.git.has_changes()? {
            info!("agent made no changes");
            return Ok(AgentOutcome {
                raw_output,
                ..AgentOutcome::failed("no changes were made")
            });
        }

        self.git.add_all()?;
        self.git
            .commit_staged(&request.commit_message)
            .context("commit agent changes")?;
        self.git
            .push_branch(&self.remote, &request.branch)
            .with_context(|| format!("push {}", request.branch))?;
        debug!("agent changes pushed");

        Ok(AgentOutcome::succeeded(raw_output))
    }
}

/// Last `max_bytes` of `text`, cut on a char boundary.
fn tail(text: &str, max_bytes: usize) -> &str {
    let trimmed = text.trim();
    if trimmed.len() <= max_bytes {
        return trimmed;
    }
    let mut start = trimmed.len() - max_bytes;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    fn agent(repo: &TestRepo, script: &str) -> CliAgent {
        let config = AgentConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs: 30,
            ..AgentConfig::default()
        };
        CliAgent::new(Git::new(repo.workdir()), &config)
    }

    fn request(branch: &str) -> AgentRequest {
        AgentRequest {
            instruction: "improve things".to_string(),
            branch: branch.to_string(),
            commit_message: "[gardener] Automated improvements".to_string(),
        }
    }

    #[test]
    fn commits_and_pushes_agent_edits() {
        let repo = TestRepo::new();
        repo.create_remote_branch("gardener/lint/1");
        let agent = agent(
            &repo,
            "echo fixed > fix.txt; echo 'PR_TITLE: Fix lint'; echo \"got: $0\"",
        );

        let outcome = agent.run(&request("gardener/lint/1")).expect("run");

        assert!(outcome.success, "{outcome:?}");
        assert!(outcome.raw_output.contains("PR_TITLE: Fix lint"));
        assert!(outcome.raw_output.contains("got: improve things"));
        assert_eq!(
            repo.remote_head_subject("gardener/lint/1"),
            "[gardener] Automated improvements"
        );
    }

    #[test]
    fn clean_worktree_is_a_failure() {
        let repo = TestRepo::new();
        repo.create_remote_branch("gardener/lint/2");
        let outcome = agent(&repo, "echo nothing to do")
            .run(&request("gardener/lint/2"))
            .expect("run");
        assert!(!outcome.success);
        assert_eq!(outcome.failure_reason(), "no changes were made");
    }

    #[test]
    fn non_zero_exit_reports_output_tail() {
        let repo = TestRepo::new();
        repo.create_remote_branch("gardener/lint/3");
        let outcome = agent(&repo, "echo boom >&2; exit 3")
            .run(&request("gardener/lint/3"))
            .expect("run");
        assert!(!outcome.success);
        let reason = outcome.failure_reason();
        assert!(reason.contains("Some(3)"), "{reason}");
        assert!(reason.contains("boom"), "{reason}");
    }

    #[test]
    fn missing_remote_branch_is_an_error() {
        let repo = TestRepo::new();
        let err = agent(&repo, "true").run(&request("gardener/absent")).unwrap_err();
        assert!(format!("{err:#}").contains("fetch gardener/absent"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("  short  ", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("aé", 1), "");
    }
}
