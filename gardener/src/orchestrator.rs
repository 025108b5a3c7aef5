//! Single-pass controller: one inbound event in, one [`RunOutcome`] out.
//!
//! Three control paths:
//!
//! - **Manual trigger**: global capacity gate, task selection, branch creation,
//!   agent run, pull request creation.
//! - **Review feedback**: iteration ceiling check (escalating to a human), then
//!   an agent run on the pull request branch and a metadata update.
//! - **Merge follow-up**: a push whose head commit carries the marker re-runs
//!   the manual path with automatic category selection.
//!
//! Capacity and "no work" are normal stops. Agent failures end the cycle
//! without retry. Hosting failures propagate to the caller.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::event::{CategoryChoice, Event, ReviewState, has_marker};
use crate::core::iteration::{IterationRecord, format_timestamp};
use crate::core::labels::label_spec;
use crate::core::pr_info::{compose_pr_body, pr_title, resolve_pr_text};
use crate::core::types::{NewPullRequest, PullRequest, WorkRequest};
use crate::exit_codes;
use crate::io::agent::{Agent, AgentRequest};
use crate::io::config::GardenerConfig;
use crate::io::hosting::Hosting;
use crate::io::outputs::Outputs;
use crate::io::prompt::{FeedbackPromptInputs, PromptBuilder};
use crate::select::{SelectOutcome, TaskSelector};

/// Result of one orchestrator pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    AtCapacity {
        open: usize,
        max: u32,
    },
    NoWork,
    PullRequestCreated {
        category: String,
        branch: String,
        number: u64,
        url: String,
    },
    AgentFailed {
        category: String,
        branch: String,
        reason: String,
    },
    /// Review on a pull request without the base label.
    NotManaged {
        number: u64,
    },
    ReadyToMerge {
        number: u64,
    },
    /// Review state that needs no action (e.g. `dismissed`).
    ReviewIgnored {
        number: u64,
        state: String,
    },
    /// Iteration ceiling reached; handed to a human.
    Escalated {
        number: u64,
        max_iterations: u32,
    },
    FeedbackAddressed {
        number: u64,
        iteration: u32,
    },
    FeedbackFailed {
        number: u64,
        reason: String,
    },
    /// Push not made on behalf of the gardener.
    PushIgnored,
    /// Outcome of the manual path re-run after a gardener merge.
    MergeFollowUp(Box<RunOutcome>),
    UnknownEvent {
        kind: String,
    },
}

impl RunOutcome {
    /// One human-readable line for stdout.
    pub fn status_line(&self) -> String {
        match self {
            Self::AtCapacity { max, .. } => {
                format!("At worker capacity ({max} concurrent PRs). Exiting.")
            }
            Self::NoWork => {
                "No tasks available. All categories at max PRs or no work to do.".to_string()
            }
            Self::PullRequestCreated { number, url, .. } => format!("Created PR #{number}: {url}"),
            Self::AgentFailed { reason, .. } => format!("Agent failed: {reason}"),
            Self::NotManaged { number } => format!("PR #{number} is not a gardener PR. Skipping."),
            Self::ReadyToMerge { number } => format!("PR #{number} approved! Ready to merge."),
            Self::ReviewIgnored { number, state } => {
                format!("Ignoring review on PR #{number} ({state}).")
            }
            Self::Escalated { number, max_iterations } => format!(
                "PR #{number} has reached max iterations ({max_iterations}). Handed to a human."
            ),
            Self::FeedbackAddressed { number, iteration } => {
                format!("Feedback addressed on PR #{number}. Iteration {iteration} completed.")
            }
            Self::FeedbackFailed { number, reason } => {
                format!("Failed to address feedback on PR #{number}: {reason}")
            }
            Self::PushIgnored => "Push is not from a gardener PR. Skipping.".to_string(),
            Self::MergeFollowUp(inner) => {
                format!("Gardener PR merged. {}", inner.status_line())
            }
            Self::UnknownEvent { kind } => format!("Unknown event type: {kind}"),
        }
    }

    /// Named step outputs; `base_label` is echoed wherever a category is reported.
    pub fn outputs(&self, base_label: &str) -> Outputs {
        match self {
            Self::AtCapacity { .. } | Self::NoWork => vec![("skipped", "true".to_string())],
            Self::PullRequestCreated {
                category,
                number,
                url,
                ..
            } => vec![
                ("skipped", "false".to_string()),
                ("category", category.clone()),
                ("base_label", base_label.to_string()),
                ("pr_number", number.to_string()),
                ("pr_url", url.clone()),
            ],
            Self::AgentFailed { category, .. } => vec![
                ("skipped", "false".to_string()),
                ("category", category.clone()),
                ("base_label", base_label.to_string()),
                ("pr_number", String::new()),
                ("pr_url", String::new()),
            ],
            Self::FeedbackAddressed { number, iteration } => vec![
                ("pr_number", number.to_string()),
                ("iteration", iteration.to_string()),
            ],
            Self::Escalated { number, .. } => vec![
                ("pr_number", number.to_string()),
                ("escalated", "true".to_string()),
            ],
            Self::MergeFollowUp(inner) => inner.outputs(base_label),
            Self::NotManaged { .. }
            | Self::ReadyToMerge { .. }
            | Self::ReviewIgnored { .. }
            | Self::FeedbackFailed { .. }
            | Self::PushIgnored
            | Self::UnknownEvent { .. } => Vec::new(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownEvent { .. } => exit_codes::UNKNOWN_EVENT,
            Self::MergeFollowUp(inner) => inner.exit_code(),
            _ => exit_codes::OK,
        }
    }
}

/// Drives one event through hosting and agent collaborators.
pub struct Orchestrator<'a, H: Hosting, A: Agent> {
    config: &'a GardenerConfig,
    hosting: &'a H,
    agent: &'a A,
    now: DateTime<Utc>,
}

impl<'a, H: Hosting, A: Agent> Orchestrator<'a, H, A> {
    pub fn new(config: &'a GardenerConfig, hosting: &'a H, agent: &'a A) -> Self {
        Self {
            config,
            hosting,
            agent,
            now: Utc::now(),
        }
    }

    /// Fix the clock used for branch names and `started` timestamps.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn run(&self, event: &Event) -> Result<RunOutcome> {
        match event {
            Event::ManualTrigger { category } => self.manual(category),
            Event::Review { number, state } => self.review(*number, state),
            Event::Push { commit_message } => self.push(commit_message),
            Event::Unknown { kind } => {
                warn!(kind = %kind, "unknown event type");
                Ok(RunOutcome::UnknownEvent { kind: kind.clone() })
            }
        }
    }

    #[instrument(skip(self))]
    fn manual(&self, choice: &CategoryChoice) -> Result<RunOutcome> {
        let selector = TaskSelector::new(self.config, self.hosting);
        match selector.run(choice)? {
            SelectOutcome::AtCapacity { open, max } => Ok(RunOutcome::AtCapacity { open, max }),
            SelectOutcome::NoWork => Ok(RunOutcome::NoWork),
            SelectOutcome::Selected(work) => self.execute(&work),
        }
    }

    #[instrument(skip_all, fields(category = %work.category))]
    fn execute(&self, work: &WorkRequest) -> Result<RunOutcome> {
        let base = self.hosting.default_branch()?;
        let branch = branch_name(&work.category, self.now);
        self.hosting
            .create_branch(&branch, &base)
            .with_context(|| format!("create branch {branch}"))?;
        info!(branch = %branch, "created work branch");

        let request = AgentRequest {
            instruction: work.instruction_text.clone(),
            branch: branch.clone(),
            commit_message: format!("{} Automated improvements", self.config.marker),
        };
        let outcome = match self.agent.run(&request) {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = err.context(format!("run agent on {branch}"));
                return Err(match self.hosting.delete_branch(&branch) {
                    Ok(()) => err,
                    Err(cleanup) => {
                        err.context(format!("cleanup of {branch} also failed: {cleanup:#}"))
                    }
                });
            }
        };
        if !outcome.success {
            let reason = outcome.failure_reason();
            warn!(branch = %branch, reason = %reason, "agent failed, deleting branch");
            self.hosting
                .delete_branch(&branch)
                .with_context(|| format!("delete branch {branch}"))?;
            return Ok(RunOutcome::AgentFailed {
                category: work.category.clone(),
                branch,
                reason,
            });
        }

        let labels = self.config.labels_for_category(&work.category);
        ensure_labels(self.hosting, self.config, &labels)?;
        let (title, body) = resolve_pr_text(&outcome);
        let record = IterationRecord::started(&work.category, format_timestamp(self.now));
        let created = self
            .hosting
            .create_pull_request(&NewPullRequest {
                base,
                head: branch.clone(),
                title: pr_title(&title),
                body: compose_pr_body(&body, &record),
            })
            .context("create pull request")?;
        self.hosting
            .add_labels(created.number, &labels)
            .with_context(|| format!("label #{}", created.number))?;
        info!(number = created.number, url = %created.url, "created pull request");

        Ok(RunOutcome::PullRequestCreated {
            category: work.category.clone(),
            branch,
            number: created.number,
            url: created.url,
        })
    }

    #[instrument(skip(self))]
    fn review(&self, number: u64, state: &ReviewState) -> Result<RunOutcome> {
        let pr = self.hosting.get_pull_request(number)?;
        debug!(number, state = state.as_str(), "review received");
        if !pr.has_label(&self.config.labels.base) {
            return Ok(RunOutcome::NotManaged { number });
        }
        match state {
            ReviewState::Approved => Ok(RunOutcome::ReadyToMerge { number }),
            ReviewState::ChangesRequested | ReviewState::Commented => self.address_feedback(&pr),
            ReviewState::Other(raw) => Ok(RunOutcome::ReviewIgnored {
                number,
                state: raw.clone(),
            }),
        }
    }

    fn address_feedback(&self, pr: &PullRequest) -> Result<RunOutcome> {
        let mut record =
            IterationRecord::parse_at(pr.body.as_deref(), &format_timestamp(self.now));
        let max_iterations = self.config.guardrails.max_iterations_per_pr;
        if record.iteration_count >= max_iterations {
            return self.escalate(pr.number, record.iteration_count);
        }
        info!(
            number = pr.number,
            next_iteration = record.iteration_count + 1,
            "addressing review feedback"
        );

        let review_comments = self.hosting.list_review_comments(pr.number)?;
        let issue_comments = self.hosting.list_issue_comments(pr.number)?;
        let instruction = PromptBuilder::new(self.config.agent.prompt_budget_bytes).build_feedback(
            &FeedbackPromptInputs {
                pull_request: pr,
                review_comments: &review_comments,
                issue_comments: &issue_comments,
            },
        )?;
        let outcome = self
            .agent
            .run(&AgentRequest {
                instruction,
                branch: pr.head_branch.clone(),
                commit_message: format!("{} Address review feedback", self.config.marker),
            })
            .with_context(|| format!("run agent on #{}", pr.number))?;
        if !outcome.success {
            return Ok(RunOutcome::FeedbackFailed {
                number: pr.number,
                reason: outcome.failure_reason(),
            });
        }

        record.increment();
        let body = record.render_into(pr.body.as_deref().unwrap_or_default());
        self.hosting
            .update_pull_request_body(pr.number, &body)
            .with_context(|| format!("update metadata of #{}", pr.number))?;
        self.hosting.add_comment(
            pr.number,
            &format!("Iteration {} completed.", record.iteration_count),
        )?;
        Ok(RunOutcome::FeedbackAddressed {
            number: pr.number,
            iteration: record.iteration_count,
        })
    }

    fn escalate(&self, number: u64, iterations: u32) -> Result<RunOutcome> {
        let max_iterations = self.config.guardrails.max_iterations_per_pr;
        info!(number, iterations, max_iterations, "escalating to a human");
        let needs_human = self.config.labels.needs_human.clone();
        ensure_labels(self.hosting, self.config, std::slice::from_ref(&needs_human))?;
        self.hosting
            .add_labels(number, &[needs_human])
            .with_context(|| format!("label #{number} for escalation"))?;
        self.hosting.add_comment(
            number,
            &format!(
                "This PR has reached the maximum number of iterations ({max_iterations}).\n\
                 A human needs to review and either provide guidance or take over."
            ),
        )?;
        Ok(RunOutcome::Escalated {
            number,
            max_iterations,
        })
    }

    fn push(&self, commit_message: &str) -> Result<RunOutcome> {
        if !has_marker(commit_message, &self.config.marker) {
            return Ok(RunOutcome::PushIgnored);
        }
        info!("gardener change merged, checking for more work");
        let follow_up = self.manual(&CategoryChoice::Auto)?;
        Ok(RunOutcome::MergeFollowUp(Box::new(follow_up)))
    }

}

/// Create any of `labels` missing on the hosting service, using the label catalogue.
pub(crate) fn ensure_labels<H: Hosting>(
    hosting: &H,
    config: &GardenerConfig,
    labels: &[String],
) -> Result<()> {
    let base = &config.labels.base;
    let needs_human = &config.labels.needs_human;
    for name in labels {
        hosting
            .ensure_label_exists(&label_spec(name, base, needs_human))
            .with_context(|| format!("ensure label {name}"))?;
    }
    Ok(())
}

/// `gardener/<category>/<YYYYmmdd-HHMMSS>`.
pub fn branch_name(category: &str, at: DateTime<Utc>) -> String {
    format!("gardener/{category}/{}", at.format("%Y%m%d-%H%M%S"))
}
