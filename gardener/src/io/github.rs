//! GitHub hosting adapter driven through the `gh` CLI.
//!
//! Every call goes through `gh api` against the REST endpoints, with
//! `{owner}/{repo}` resolved by `gh` from `GH_REPO` (when a repository is
//! configured) or from the current checkout. Listing endpoints are paginated
//! and reshaped with `--jq` so responses deserialize straight into core types.

use std::cell::OnceCell;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::core::types::{
    CreatedPullRequest, IssueComment, LabelSpec, NewPullRequest, PullRequest, ReviewComment,
};
use crate::io::hosting::Hosting;

const PULL_FIELDS: &str =
    "{number, title, body, url: .html_url, labels: [.labels[].name], head_branch: .head.ref}";

/// Failed `gh` invocation.
///
/// Kept as a typed error so callers can recognise HTTP statuses after the
/// error has been wrapped in context.
#[derive(Debug)]
pub struct GhError {
    pub args: Vec<String>,
    pub code: Option<i32>,
    pub stderr: String,
}

impl GhError {
    pub fn is_not_found(&self) -> bool {
        self.stderr.contains("HTTP 404") || self.stderr.contains("Not Found")
    }

    pub fn is_unprocessable(&self) -> bool {
        self.stderr.contains("HTTP 422")
    }
}

impl fmt::Display for GhError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gh {} failed (exit {:?}): {}",
            self.args.join(" "),
            self.code,
            self.stderr.trim()
        )
    }
}

impl std::error::Error for GhError {}

/// [`Hosting`] implementation backed by `gh api`.
#[derive(Debug)]
pub struct GhHosting {
    program: PathBuf,
    repository: Option<String>,
    default_branch: OnceCell<String>,
}

impl GhHosting {
    /// `repository` is `owner/name`; `None` lets `gh` infer it from the checkout.
    pub fn new(repository: Option<String>) -> Self {
        Self::with_program("gh", repository)
    }

    pub fn with_program(program: impl Into<PathBuf>, repository: Option<String>) -> Self {
        Self {
            program: program.into(),
            repository,
            default_branch: OnceCell::new(),
        }
    }

    fn api(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["api"];
        full.extend_from_slice(args);
        self.gh(&full)
    }

    fn gh(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(repo) = &self.repository {
            cmd.env("GH_REPO", repo);
        }
        debug!(args = ?args, "running gh");
        let output = cmd
            .output()
            .with_context(|| format!("spawn {}", self.program.display()))?;
        if !output.status.success() {
            return Err(GhError {
                args: args.iter().map(|arg| arg.to_string()).collect(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Hosting for GhHosting {
    #[instrument(skip(self))]
    fn list_open_pull_requests(&self, labels: &[String]) -> Result<Vec<PullRequest>> {
        let jq = format!(".[] | {PULL_FIELDS}");
        let out = self
            .api(&[
                "repos/{owner}/{repo}/pulls?state=open&per_page=100",
                "--paginate",
                "--jq",
                &jq,
            ])
            .context("list open pull requests")?;
        let pulls: Vec<PullRequest> = parse_json_stream(&out).context("parse pull requests")?;
        let matching: Vec<PullRequest> = pulls
            .into_iter()
            .filter(|pr| pr.has_all_labels(labels))
            .collect();
        debug!(count = matching.len(), "open pull requests matched labels");
        Ok(matching)
    }

    #[instrument(skip(self))]
    fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/pulls/{number}");
        let out = self
            .api(&[&endpoint, "--jq", PULL_FIELDS])
            .with_context(|| format!("get pull request #{number}"))?;
        serde_json::from_str(&out).with_context(|| format!("parse pull request #{number}"))
    }

    #[instrument(skip(self))]
    fn list_changed_files(&self, number: u64) -> Result<Vec<String>> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/pulls/{number}/files?per_page=100");
        let out = self
            .api(&[&endpoint, "--paginate", "--jq", ".[].filename"])
            .with_context(|| format!("list files of pull request #{number}"))?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip(self))]
    fn list_review_comments(&self, number: u64) -> Result<Vec<ReviewComment>> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/pulls/{number}/comments?per_page=100");
        let out = self
            .api(&[
                &endpoint,
                "--paginate",
                "--jq",
                ".[] | {path, line, author: .user.login, body}",
            ])
            .with_context(|| format!("list review comments of #{number}"))?;
        parse_json_stream(&out).context("parse review comments")
    }

    #[instrument(skip(self))]
    fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/issues/{number}/comments?per_page=100");
        let out = self
            .api(&[
                &endpoint,
                "--paginate",
                "--jq",
                ".[] | {author: .user.login, body}",
            ])
            .with_context(|| format!("list comments of #{number}"))?;
        parse_json_stream(&out).context("parse comments")
    }

    #[instrument(skip(self, request), fields(head = %request.head))]
    fn create_pull_request(&self, request: &NewPullRequest) -> Result<CreatedPullRequest> {
        #[derive(Deserialize)]
        struct Created {
            number: u64,
            url: String,
        }

        let base = format!("base={}", request.base);
        let head = format!("head={}", request.head);
        let title = format!("title={}", request.title);
        let body = format!("body={}", request.body);
        let out = self
            .api(&[
                "repos/{owner}/{repo}/pulls",
                "-X",
                "POST",
                "-f",
                &base,
                "-f",
                &head,
                "-f",
                &title,
                "-f",
                &body,
                "--jq",
                "{number, url: .html_url}",
            ])
            .with_context(|| format!("create pull request from {}", request.head))?;
        let created: Created = serde_json::from_str(&out).context("parse created pull request")?;
        Ok(CreatedPullRequest {
            number: created.number,
            url: created.url,
        })
    }

    #[instrument(skip(self, body))]
    fn update_pull_request_body(&self, number: u64, body: &str) -> Result<()> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/pulls/{number}");
        let field = format!("body={body}");
        self.api(&[&endpoint, "-X", "PATCH", "-f", &field, "--silent"])
            .with_context(|| format!("update body of #{number}"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let endpoint = format!("repos/{{owner}}/{{repo}}/issues/{number}/labels");
        let fields: Vec<String> = labels.iter().map(|label| format!("labels[]={label}")).collect();
        let mut args = vec![endpoint.as_str(), "-X", "POST"];
        for field in &fields {
            args.push("-f");
            args.push(field);
        }
        args.push("--silent");
        self.api(&args)
            .with_context(|| format!("add labels to #{number}"))?;
        Ok(())
    }

    #[instrument(skip(self, label), fields(name = %label.name))]
    fn ensure_label_exists(&self, label: &LabelSpec) -> Result<()> {
        let endpoint = format!(
            "repos/{{owner}}/{{repo}}/labels/{}",
            encode_path_segment(&label.name)
        );
        match self.api(&[&endpoint, "--silent"]) {
            Ok(_) => return Ok(()),
            Err(err) if is_not_found(&err) => {}
            Err(err) => return Err(err.context(format!("look up label {}", label.name))),
        }

        debug!(name = %label.name, "creating label");
        let name = format!("name={}", label.name);
        let color = format!("color={}", label.color);
        let description = format!("description={}", label.description.as_deref().unwrap_or(""));
        self.api(&[
            "repos/{owner}/{repo}/labels",
            "-X",
            "POST",
            "-f",
            &name,
            "-f",
            &color,
            "-f",
            &description,
            "--silent",
        ])
        .with_context(|| format!("create label {}", label.name))?;
        Ok(())
    }

    #[instrument(skip(self, body))]
    fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/issues/{number}/comments");
        let field = format!("body={body}");
        self.api(&[&endpoint, "-X", "POST", "-f", &field, "--silent"])
            .with_context(|| format!("comment on #{number}"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn create_branch(&self, name: &str, from_ref: &str) -> Result<()> {
        let ref_endpoint = format!("repos/{{owner}}/{{repo}}/git/ref/heads/{from_ref}");
        let sha = self
            .api(&[&ref_endpoint, "--jq", ".object.sha"])
            .with_context(|| format!("resolve head of {from_ref}"))?;
        let sha = sha.trim();
        if sha.is_empty() {
            return Err(anyhow!("empty sha for {from_ref}"));
        }

        let git_ref = format!("ref=refs/heads/{name}");
        let sha_field = format!("sha={sha}");
        self.api(&[
            "repos/{owner}/{repo}/git/refs",
            "-X",
            "POST",
            "-f",
            &git_ref,
            "-f",
            &sha_field,
            "--silent",
        ])
        .with_context(|| format!("create branch {name}"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_branch(&self, name: &str) -> Result<()> {
        let endpoint = format!("repos/{{owner}}/{{repo}}/git/refs/heads/{name}");
        match self.api(&[&endpoint, "-X", "DELETE", "--silent"]) {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) || is_unprocessable(&err) => {
                debug!(branch = name, "branch already absent");
                Ok(())
            }
            Err(err) => Err(err.context(format!("delete branch {name}"))),
        }
    }

    fn default_branch(&self) -> Result<String> {
        if let Some(branch) = self.default_branch.get() {
            return Ok(branch.clone());
        }
        let out = self
            .api(&["repos/{owner}/{repo}", "--jq", ".default_branch"])
            .context("look up default branch")?;
        let branch = out.trim().to_string();
        if branch.is_empty() {
            return Err(anyhow!("hosting service reported an empty default branch"));
        }
        Ok(self.default_branch.get_or_init(|| branch).clone())
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GhError>().is_some_and(GhError::is_not_found)
}

fn is_unprocessable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GhError>()
        .is_some_and(GhError::is_unprocessable)
}

/// Parse concatenated JSON values (one per `--jq` result) into a list.
fn parse_json_stream<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>> {
    serde_json::Deserializer::from_str(raw)
        .into_iter::<T>()
        .map(|item| item.map_err(anyhow::Error::from))
        .collect()
}

/// Percent-encode a single URL path segment (label names may contain spaces).
fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b':' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
