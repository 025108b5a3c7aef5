//! Test-only fakes and fixtures: an in-memory hosting service, a scripted
//! agent and a throwaway git repository with a bare `origin`.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::types::{
    AgentOutcome, CreatedPullRequest, IssueComment, LabelSpec, NewPullRequest, PullRequest,
    ReviewComment,
};
use crate::io::agent::{Agent, AgentRequest};
use crate::io::hosting::Hosting;

/// Mutation recorded by [`FakeHosting`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostingCall {
    CreateBranch { name: String, from: String },
    DeleteBranch(String),
    CreateLabel(String),
    CreatePullRequest(NewPullRequest),
    UpdateBody { number: u64, body: String },
    AddLabels { number: u64, labels: Vec<String> },
    AddComment { number: u64, body: String },
}

/// In-memory hosting service.
///
/// Reads are served from seeded state; every mutation is applied to that state
/// and appended to a call log so tests can assert on exact side effects.
#[derive(Debug)]
pub struct FakeHosting {
    default_branch: String,
    pulls: RefCell<Vec<PullRequest>>,
    files: RefCell<BTreeMap<u64, Vec<String>>>,
    failing_files: RefCell<BTreeSet<u64>>,
    review_comments: RefCell<BTreeMap<u64, Vec<ReviewComment>>>,
    issue_comments: RefCell<BTreeMap<u64, Vec<IssueComment>>>,
    branches: RefCell<BTreeSet<String>>,
    labels: RefCell<BTreeSet<String>>,
    failing_deletes: Cell<bool>,
    calls: RefCell<Vec<HostingCall>>,
    next_number: Cell<u64>,
}

impl Default for FakeHosting {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHosting {
    pub fn new() -> Self {
        Self {
            default_branch: "main".to_string(),
            pulls: RefCell::new(Vec::new()),
            files: RefCell::new(BTreeMap::new()),
            failing_files: RefCell::new(BTreeSet::new()),
            review_comments: RefCell::new(BTreeMap::new()),
            issue_comments: RefCell::new(BTreeMap::new()),
            branches: RefCell::new(BTreeSet::from(["main".to_string()])),
            labels: RefCell::new(BTreeSet::new()),
            failing_deletes: Cell::new(false),
            calls: RefCell::new(Vec::new()),
            next_number: Cell::new(100),
        }
    }

    pub fn with_pull_request(self, pr: PullRequest) -> Self {
        self.pulls.borrow_mut().push(pr);
        self
    }

    pub fn with_files(self, number: u64, files: &[&str]) -> Self {
        self.files
            .borrow_mut()
            .insert(number, files.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Make file listing for `number` fail.
    pub fn with_failing_files(self, number: u64) -> Self {
        self.failing_files.borrow_mut().insert(number);
        self
    }

    pub fn with_review_comments(self, number: u64, comments: Vec<ReviewComment>) -> Self {
        self.review_comments.borrow_mut().insert(number, comments);
        self
    }

    pub fn with_issue_comments(self, number: u64, comments: Vec<IssueComment>) -> Self {
        self.issue_comments.borrow_mut().insert(number, comments);
        self
    }

    /// Branch that exists on the remote without going through `create_branch`.
    pub fn with_branch(self, name: &str) -> Self {
        self.branches.borrow_mut().insert(name.to_string());
        self
    }

    /// Make every `delete_branch` fail with a server error.
    pub fn with_failing_branch_deletes(self) -> Self {
        self.failing_deletes.set(true);
        self
    }

    pub fn with_label(self, name: &str) -> Self {
        self.labels.borrow_mut().insert(name.to_string());
        self
    }

    /// Every mutation in call order.
    pub fn mutations(&self) -> Vec<HostingCall> {
        self.calls.borrow().clone()
    }

    pub fn pull_request(&self, number: u64) -> Option<PullRequest> {
        self.pulls
            .borrow()
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
    }

    pub fn branches(&self) -> BTreeSet<String> {
        self.branches.borrow().clone()
    }

    pub fn labels(&self) -> BTreeSet<String> {
        self.labels.borrow().clone()
    }

    fn record(&self, call: HostingCall) {
        self.calls.borrow_mut().push(call);
    }

    fn with_pull_mut<T>(&self, number: u64, f: impl FnOnce(&mut PullRequest) -> T) -> Result<T> {
        let mut pulls = self.pulls.borrow_mut();
        let pr = pulls
            .iter_mut()
            .find(|pr| pr.number == number)
            .ok_or_else(|| anyhow!("pull request #{number} not found"))?;
        Ok(f(pr))
    }
}

impl Hosting for FakeHosting {
    fn list_open_pull_requests(&self, labels: &[String]) -> Result<Vec<PullRequest>> {
        Ok(self
            .pulls
            .borrow()
            .iter()
            .filter(|pr| pr.has_all_labels(labels))
            .cloned()
            .collect())
    }

    fn get_pull_request(&self, number: u64) -> Result<PullRequest> {
        self.pull_request(number)
            .ok_or_else(|| anyhow!("pull request #{number} not found"))
    }

    fn list_changed_files(&self, number: u64) -> Result<Vec<String>> {
        if self.failing_files.borrow().contains(&number) {
            bail!("listing files of #{number} failed");
        }
        Ok(self.files.borrow().get(&number).cloned().unwrap_or_default())
    }

    fn list_review_comments(&self, number: u64) -> Result<Vec<ReviewComment>> {
        Ok(self
            .review_comments
            .borrow()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    fn list_issue_comments(&self, number: u64) -> Result<Vec<IssueComment>> {
        Ok(self
            .issue_comments
            .borrow()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    fn create_pull_request(&self, request: &NewPullRequest) -> Result<CreatedPullRequest> {
        if !self.branches.borrow().contains(&request.head) {
            bail!("head branch {} does not exist", request.head);
        }
        self.record(HostingCall::CreatePullRequest(request.clone()));
        let number = self.next_number.get();
        self.next_number.set(number + 1);
        let url = format!("https://example.test/pull/{number}");
        self.pulls.borrow_mut().push(PullRequest {
            number,
            title: request.title.clone(),
            body: Some(request.body.clone()),
            labels: Vec::new(),
            head_branch: request.head.clone(),
            url: url.clone(),
        });
        Ok(CreatedPullRequest { number, url })
    }

    fn update_pull_request_body(&self, number: u64, body: &str) -> Result<()> {
        self.with_pull_mut(number, |pr| pr.body = Some(body.to_string()))?;
        self.record(HostingCall::UpdateBody {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    fn add_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        for label in labels {
            if !self.labels.borrow().contains(label) {
                bail!("label {label} does not exist");
            }
        }
        self.with_pull_mut(number, |pr| {
            for label in labels {
                if !pr.has_label(label) {
                    pr.labels.push(label.clone());
                }
            }
        })?;
        self.record(HostingCall::AddLabels {
            number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    fn ensure_label_exists(&self, label: &LabelSpec) -> Result<()> {
        if self.labels.borrow_mut().insert(label.name.clone()) {
            self.record(HostingCall::CreateLabel(label.name.clone()));
        }
        Ok(())
    }

    fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        self.get_pull_request(number)?;
        self.issue_comments
            .borrow_mut()
            .entry(number)
            .or_default()
            .push(IssueComment {
                author: "gardener".to_string(),
                body: body.to_string(),
            });
        self.record(HostingCall::AddComment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    fn create_branch(&self, name: &str, from_ref: &str) -> Result<()> {
        if !self.branches.borrow().contains(from_ref) {
            bail!("base ref {from_ref} does not exist");
        }
        if !self.branches.borrow_mut().insert(name.to_string()) {
            bail!("branch {name} already exists");
        }
        self.record(HostingCall::CreateBranch {
            name: name.to_string(),
            from: from_ref.to_string(),
        });
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        if self.failing_deletes.get() {
            bail!("HTTP 500 deleting {name}");
        }
        self.branches.borrow_mut().remove(name);
        self.record(HostingCall::DeleteBranch(name.to_string()));
        Ok(())
    }

    fn default_branch(&self) -> Result<String> {
        Ok(self.default_branch.clone())
    }
}

/// Agent returning predetermined outcomes in order, recording each request.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    outcomes: RefCell<VecDeque<Result<AgentOutcome, String>>>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(outcomes: Vec<AgentOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into_iter().map(Ok).collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Agent whose single invocation returns an infrastructure error.
    pub fn erroring(message: &str) -> Self {
        Self {
            outcomes: RefCell::new(VecDeque::from([Err(message.to_string())])),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }
}

impl Agent for ScriptedAgent {
    fn run(&self, request: &AgentRequest) -> Result<AgentOutcome> {
        self.requests.borrow_mut().push(request.clone());
        match self.outcomes.borrow_mut().pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted agent has no outcome left")),
        }
    }
}

/// Open pull request with deterministic title, branch and URL.
pub fn pr(number: u64, labels: &[&str], body: Option<&str>) -> PullRequest {
    PullRequest {
        number,
        title: format!("PR {number}"),
        body: body.map(str::to_string),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        head_branch: format!("gardener/test/{number}"),
        url: format!("https://example.test/pull/{number}"),
    }
}

/// Git checkout in a temp dir with one commit on `main`, pushed to a bare
/// `origin` repository next to it.
pub struct TestRepo {
    _temp: TempDir,
    workdir: PathBuf,
    origin: PathBuf,
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRepo {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let origin = temp.path().join("origin.git");
        let workdir = temp.path().join("work");
        std::fs::create_dir_all(&workdir).expect("create workdir");

        git(temp.path(), &["init", "--bare", "-b", "main", "origin.git"]);
        git(&workdir, &["init", "-b", "main"]);
        git(&workdir, &["config", "user.email", "gardener@example.test"]);
        git(&workdir, &["config", "user.name", "Gardener Test"]);
        git(&workdir, &["config", "commit.gpgsign", "false"]);
        std::fs::write(workdir.join("README.md"), "seed\n").expect("write seed");
        git(&workdir, &["add", "-A"]);
        git(&workdir, &["commit", "-m", "seed"]);
        let origin_arg = origin.to_string_lossy().into_owned();
        git(&workdir, &["remote", "add", "origin", &origin_arg]);
        git(&workdir, &["push", "-u", "origin", "main"]);

        Self {
            _temp: temp,
            workdir,
            origin,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Create `name` on the remote at the current `main`.
    pub fn create_remote_branch(&self, name: &str) {
        let refspec = format!("main:refs/heads/{name}");
        git(&self.workdir, &["push", "origin", &refspec]);
    }

    /// Subject line of the remote branch's head commit.
    pub fn remote_head_subject(&self, branch: &str) -> String {
        git(&self.origin, &["log", "-1", "--format=%s", branch])
            .trim()
            .to_string()
    }

    pub fn remote_branches(&self) -> Vec<String> {
        git(
            &self.origin,
            &["for-each-ref", "--format=%(refname:short)", "refs/heads"],
        )
        .lines()
        .map(str::to_string)
        .collect()
    }

    pub fn write_file(&self, rel: &str, contents: &str) {
        let path = self.workdir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, contents).expect("write file");
    }
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}
