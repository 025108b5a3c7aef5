//! Hosting-service abstraction (pull requests, labels, comments, branches).
//!
//! The [`Hosting`] trait decouples orchestration from the concrete service
//! (currently GitHub through the `gh` CLI, see [`crate::io::github`]). Tests use
//! an in-memory fake that records every mutation.

use anyhow::Result;

use crate::core::types::{
    CreatedPullRequest, IssueComment, LabelSpec, NewPullRequest, PullRequest, ReviewComment,
};

/// Operations the gardener needs from the hosting service.
///
/// Implementations surface failures as errors and never retry; the only
/// failure they absorb is deleting a branch that is already gone.
pub trait Hosting {
    /// Open pull requests carrying every label in `labels`.
    fn list_open_pull_requests(&self, labels: &[String]) -> Result<Vec<PullRequest>>;

    fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Paths changed by a pull request.
    fn list_changed_files(&self, number: u64) -> Result<Vec<String>>;

    fn list_review_comments(&self, number: u64) -> Result<Vec<ReviewComment>>;

    fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>>;

    fn create_pull_request(&self, request: &NewPullRequest) -> Result<CreatedPullRequest>;

    fn update_pull_request_body(&self, number: u64, body: &str) -> Result<()>;

    fn add_labels(&self, number: u64, labels: &[String]) -> Result<()>;

    /// Create the label if it does not exist; existing labels are left untouched.
    fn ensure_label_exists(&self, label: &LabelSpec) -> Result<()>;

    fn add_comment(&self, number: u64, body: &str) -> Result<()>;

    /// Create branch `name` pointing at the head of `from_ref`.
    fn create_branch(&self, name: &str, from_ref: &str) -> Result<()>;

    /// Delete branch `name`; succeeds if it is already absent.
    fn delete_branch(&self, name: &str) -> Result<()>;

    fn default_branch(&self) -> Result<String>;
}
