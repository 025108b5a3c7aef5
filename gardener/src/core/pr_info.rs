//! Extraction of the `PR_TITLE:` / `PR_BODY:` convention from agent output.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::iteration::IterationRecord;
use crate::core::types::AgentOutcome;

pub const DEFAULT_TITLE: &str = "Automated code improvements";
pub const DEFAULT_BODY: &str = "This PR contains automated improvements made by Gardener.";

const TITLE_PREFIX: &str = "[Gardener]";
const FOOTER: &str = "\u{1f916} *This PR was created by Gardener*";

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)PR_TITLE:[ \t]*(.+)$").expect("title pattern is valid"));
static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PR_BODY:\s*").expect("body pattern is valid"));
static NEXT_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*PR_TITLE:").expect("title marker pattern is valid"));

/// Title and body parsed out of free-form agent output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrInfo {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Scan `output` for the labelled summary lines.
///
/// The title is the rest of its line; the body runs until the next line
/// starting with `PR_TITLE:` or the end of output.
pub fn extract_pr_info(output: &str) -> PrInfo {
    let title = TITLE_RE
        .captures(output)
        .map(|caps| caps[1].trim().to_string())
        .filter(|title| !title.is_empty());

    let body = BODY_RE.find(output).and_then(|start| {
        let rest = &output[start.end()..];
        let end = NEXT_TITLE_RE.find(rest).map_or(rest.len(), |m| m.start());
        let body = rest[..end].trim();
        (!body.is_empty()).then(|| body.to_string())
    });

    PrInfo { title, body }
}

/// Title and body for a new pull request.
///
/// Structured fields from the agent win, then the labelled convention in raw
/// output, then the defaults.
pub fn resolve_pr_text(outcome: &AgentOutcome) -> (String, String) {
    let parsed = extract_pr_info(&outcome.raw_output);
    let title = outcome
        .title
        .clone()
        .or(parsed.title)
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let body = outcome
        .body
        .clone()
        .or(parsed.body)
        .unwrap_or_else(|| DEFAULT_BODY.to_string());
    (title, body)
}

/// Pull request title with the automation prefix.
pub fn pr_title(title: &str) -> String {
    format!("{TITLE_PREFIX} {}", title.trim())
}

/// Full pull request body: description, separator, metadata block, footer.
pub fn compose_pr_body(body: &str, record: &IterationRecord) -> String {
    format!(
        "{}\n\n---\n\n{}\n\n{FOOTER}\n",
        body.trim_end(),
        record.to_block()
    )
}

/// `linter_fixes` -> `Linter fixes`.
pub fn humanize_category(category: &str) -> String {
    let spaced = category.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_multiline_body() {
        let output = "working...\nPR_TITLE: Add tests for User model\nPR_BODY: Added tests.\n\n- covers validation\n";
        let info = extract_pr_info(output);
        assert_eq!(info.title.as_deref(), Some("Add tests for User model"));
        assert_eq!(
            info.body.as_deref(),
            Some("Added tests.\n\n- covers validation")
        );
    }

    #[test]
    fn body_stops_at_following_title() {
        let output = "pr_body: first\nPR_TITLE: later";
        let info = extract_pr_info(output);
        assert_eq!(info.body.as_deref(), Some("first"));
        assert_eq!(info.title.as_deref(), Some("later"));
    }

    #[test]
    fn body_keeps_inline_title_mentions() {
        let output = "PR_BODY: Renamed the PR_TITLE: parser helper.\nMore detail.";
        let info = extract_pr_info(output);
        assert_eq!(
            info.body.as_deref(),
            Some("Renamed the PR_TITLE: parser helper.\nMore detail.")
        );
    }

    #[test]
    fn missing_markers_yield_none() {
        assert_eq!(extract_pr_info("nothing here"), PrInfo::default());
    }

    #[test]
    fn structured_fields_take_precedence() {
        let outcome = AgentOutcome {
            success: true,
            title: Some("Structured".to_string()),
            body: None,
            raw_output: "PR_TITLE: Parsed\nPR_BODY: Parsed body".to_string(),
            error: None,
        };
        let (title, body) = resolve_pr_text(&outcome);
        assert_eq!(title, "Structured");
        assert_eq!(body, "Parsed body");
    }

    #[test]
    fn falls_back_to_defaults() {
        let (title, body) = resolve_pr_text(&AgentOutcome::succeeded("done"));
        assert_eq!(title, DEFAULT_TITLE);
        assert_eq!(body, DEFAULT_BODY);
    }

    #[test]
    fn composed_body_round_trips_metadata() {
        let record = IterationRecord::started("linter_fixes", "2026-03-01T12:00:00Z");
        let body = compose_pr_body("Fixed warnings.\n", &record);
        assert!(body.starts_with("Fixed warnings.\n\n---\n\n<!-- gardener-metadata\n"));
        assert!(body.ends_with("*This PR was created by Gardener*\n"));
        assert_eq!(IterationRecord::parse(Some(&body)), record);
    }

    #[test]
    fn titles_and_category_names() {
        assert_eq!(pr_title(" Fix lint "), "[Gardener] Fix lint");
        assert_eq!(humanize_category("linter_fixes"), "Linter fixes");
        assert_eq!(humanize_category("SECURITY"), "Security");
        assert_eq!(humanize_category(""), "");
    }
}
