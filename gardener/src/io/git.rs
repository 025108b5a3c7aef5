//! Git adapter for the local checkout the agent edits.
//!
//! Branches are created on the hosting service; locally we only fetch, check
//! out, commit and push.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Paths with staged, unstaged or untracked changes.
    pub fn changed_paths(&self) -> Result<Vec<String>> {
        let out = self.stdout(&["status", "--porcelain=v1", "-uall", "-z"])?;
        Ok(porcelain_paths(&out))
    }

    pub fn has_changes(&self) -> Result<bool> {
        Ok(!self.changed_paths()?.is_empty())
    }

    #[instrument(skip(self))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Stage everything, respecting `.gitignore`.
    pub fn add_all(&self) -> Result<()> {
        self.git(&["add", "-A"])?;
        Ok(())
    }

    /// Commit the index; `Ok(false)` when nothing is staged.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if self.stdout(&["diff", "--cached", "--name-only"])?.trim().is_empty() {
            debug!("index is empty, nothing to commit");
            return Ok(false);
        }
        self.git(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Fetch `branch` into `refs/remotes/<remote>/<branch>`.
    ///
    /// The refspec is explicit so shallow single-branch CI clones still get
    /// the tracking ref.
    #[instrument(skip(self))]
    pub fn fetch_branch(&self, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("+refs/heads/{branch}:refs/remotes/{remote}/{branch}");
        self.git(&["fetch", remote, &refspec])?;
        Ok(())
    }

    /// Check out `branch` at its remote tracking ref, creating or resetting the local branch.
    #[instrument(skip(self))]
    pub fn checkout_remote_branch(&self, remote: &str, branch: &str) -> Result<()> {
        let start_point = format!("{remote}/{branch}");
        self.git(&["checkout", "-B", branch, &start_point])?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn push_branch(&self, remote: &str, branch: &str) -> Result<()> {
        self.git(&["push", "-u", remote, branch])?;
        Ok(())
    }

    fn stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

/// Destination paths from NUL-separated `status --porcelain=v1 -z` output.
///
/// Renames and copies are followed by their source path as a separate
/// record, which is skipped.
fn porcelain_paths(out: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut records = out.split('\0').filter(|r| !r.is_empty());
    while let Some(record) = records.next() {
        let Some((code, path)) = record.split_at_checked(3) else {
            continue;
        };
        if code.starts_with('R') || code.starts_with('C') {
            records.next();
        }
        paths.push(path.to_string());
    }
    paths
}
