//! `gardener open-pr`: turn edits left in the checkout by a separate agent
//! step into a labelled pull request.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::core::iteration::{IterationRecord, format_timestamp};
use crate::core::pr_info::{compose_pr_body, humanize_category, pr_title};
use crate::core::types::NewPullRequest;
use crate::io::config::GardenerConfig;
use crate::io::git::Git;
use crate::io::hosting::Hosting;
use crate::io::outputs::Outputs;
use crate::orchestrator::{branch_name, ensure_labels};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenPrOutcome {
    /// The worktree was clean; nothing was committed.
    NoChanges,
    Created {
        branch: String,
        number: u64,
        url: String,
    },
}

impl OpenPrOutcome {
    pub fn status_line(&self) -> String {
        match self {
            Self::NoChanges => "No changes were made. Skipping PR creation.".to_string(),
            Self::Created { number, url, .. } => format!("Created PR #{number}: {url}"),
        }
    }

    pub fn outputs(&self) -> Outputs {
        match self {
            Self::NoChanges => vec![("pr_number", String::new()), ("pr_url", String::new())],
            Self::Created { number, url, .. } => {
                vec![("pr_number", number.to_string()), ("pr_url", url.clone())]
            }
        }
    }
}

/// Commit the worktree to a new `gardener/<category>/<ts>` branch, push it
/// and open a pull request carrying fresh iteration metadata.
#[instrument(skip(config, hosting, git, now))]
pub fn open_pull_request<H: Hosting>(
    config: &GardenerConfig,
    hosting: &H,
    git: &Git,
    category: &str,
    now: DateTime<Utc>,
) -> Result<OpenPrOutcome> {
    if !git.has_changes()? {
        info!("worktree is clean");
        return Ok(OpenPrOutcome::NoChanges);
    }

    let branch = branch_name(category, now);
    let summary = format!("{} improvements", humanize_category(category));
    git.checkout_new_branch(&branch)?;
    git.add_all()?;
    git.commit_staged(&format!(
        "{} {summary}\n\nAutomated improvements by Gardener.\n\nCategory: {category}\n",
        config.marker
    ))
    .context("commit changes")?;
    git.push_branch(&config.agent.remote, &branch)
        .with_context(|| format!("push {branch}"))?;

    let labels = config.labels_for_category(category);
    ensure_labels(hosting, config, &labels)?;
    let base = hosting.default_branch()?;
    let record = IterationRecord::started(category, format_timestamp(now));
    let description = format!(
        "## Summary\n\nAutomated improvements by Gardener.\n\n**Category:** {category}"
    );
    let created = hosting
        .create_pull_request(&NewPullRequest {
            base,
            head: branch.clone(),
            title: pr_title(&summary),
            body: compose_pr_body(&description, &record),
        })
        .context("create pull request")?;
    hosting
        .add_labels(created.number, &labels)
        .with_context(|| format!("label #{}", created.number))?;
    info!(number = created.number, url = %created.url, "created pull request");

    Ok(OpenPrOutcome::Created {
        branch,
        number: created.number,
        url: created.url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeHosting, TestRepo};
    use chrono::TimeZone;

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 8, 0, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn clean_worktree_creates_nothing() {
        let repo = TestRepo::new();
        let hosting = FakeHosting::new();
        let outcome = open_pull_request(
            &GardenerConfig::default(),
            &hosting,
            &Git::new(repo.workdir()),
            "linter_fixes",
            clock(),
        )
        .expect("open");
        assert_eq!(outcome, OpenPrOutcome::NoChanges);
        assert_eq!(
            outcome.outputs(),
            vec![("pr_number", String::new()), ("pr_url", String::new())]
        );
        assert!(hosting.mutations().is_empty());
    }

    #[test]
    fn commits_pushes_and_opens_labelled_pr() {
        let repo = TestRepo::new();
        repo.write_file("src/lib.rs", "pub fn fixed() {}\n");
        let branch = "gardener/linter_fixes/20260402-080000";
        let hosting = FakeHosting::new().with_branch(branch);

        let outcome = open_pull_request(
            &GardenerConfig::default(),
            &hosting,
            &Git::new(repo.workdir()),
            "linter_fixes",
            clock(),
        )
        .expect("open");

        let OpenPrOutcome::Created { number, .. } = &outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(repo.remote_branches().contains(&branch.to_string()));
        assert_eq!(
            repo.remote_head_subject(branch),
            "[gardener] Linter fixes improvements"
        );
        let pr = hosting.pull_request(*number).expect("pr");
        assert_eq!(pr.title, "[Gardener] Linter fixes improvements");
        assert_eq!(pr.labels, vec!["gardener", "gardener:linter_fixes"]);
        let record = IterationRecord::parse(pr.body.as_deref());
        assert_eq!(record.iteration_count, 1);
        assert_eq!(record.category.as_deref(), Some("linter_fixes"));
    }
}
