//! Advisory file locks derived from in-flight automated pull requests.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::LockSet;
use crate::io::hosting::Hosting;

/// Union of the changed files of every open pull request carrying `base_label`.
///
/// Recomputed on every call. A failure to list any pull request's files
/// aborts the whole computation, since a partial set would under-lock.
#[instrument(skip(hosting))]
pub fn compute_lock_set<H: Hosting>(hosting: &H, base_label: &str) -> Result<LockSet> {
    let open = hosting
        .list_open_pull_requests(&[base_label.to_string()])
        .context("list automated pull requests for lock set")?;

    let mut locked = LockSet::new();
    for pr in &open {
        let files = hosting
            .list_changed_files(pr.number)
            .with_context(|| format!("list changed files of #{}", pr.number))?;
        locked.extend(files);
    }
    debug!(
        pull_requests = open.len(),
        locked = locked.len(),
        "computed lock set"
    );
    Ok(locked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeHosting, pr};

    #[test]
    fn unions_changed_files_of_automated_prs() {
        let hosting = FakeHosting::new()
            .with_pull_request(pr(1, &["gardener"], None))
            .with_pull_request(pr(2, &["gardener", "gardener:lint"], None))
            .with_pull_request(pr(3, &["human"], None))
            .with_files(1, &["a", "b"])
            .with_files(2, &["b", "c"])
            .with_files(3, &["d"]);

        let locked = compute_lock_set(&hosting, "gardener").expect("locks");
        assert_eq!(
            locked.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn no_open_prs_means_no_locks() {
        let locked = compute_lock_set(&FakeHosting::new(), "gardener").expect("locks");
        assert!(locked.is_empty());
    }

    #[test]
    fn any_listing_failure_aborts() {
        let hosting = FakeHosting::new()
            .with_pull_request(pr(1, &["gardener"], None))
            .with_pull_request(pr(2, &["gardener"], None))
            .with_files(1, &["a"])
            .with_failing_files(2);

        let err = compute_lock_set(&hosting, "gardener").unwrap_err();
        assert!(format!("{err:#}").contains("#2"));
    }
}
