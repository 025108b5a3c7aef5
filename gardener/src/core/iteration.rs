//! Iteration metadata embedded in pull request bodies.
//!
//! The hosting service offers no structured field for per-PR bookkeeping, so
//! the record lives in an HTML comment block inside the body:
//!
//! ```text
//! <!-- gardener-metadata
//! iteration: 2
//! category: test_coverage
//! started: 2026-01-15T10:00:00Z
//! -->
//! ```
//!
//! Nothing outside this module touches the raw block format.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

/// Marker that opens the metadata comment. Comments carrying it are bookkeeping, not feedback.
pub const METADATA_MARKER: &str = "gardener-metadata";

static METADATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*gardener-metadata\r?\n(.*?)\r?\n?-->").expect("metadata pattern is valid")
});

static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+):\s*(.*)$").expect("field pattern is valid"));

/// Per-PR review iteration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    pub iteration_count: u32,
    pub category: Option<String>,
    pub started_at: String,
}

impl IterationRecord {
    /// Fresh record for a newly opened pull request.
    pub fn started(category: &str, started_at: impl Into<String>) -> Self {
        Self {
            iteration_count: 1,
            category: Some(category.to_string()),
            started_at: started_at.into(),
        }
    }

    /// Parse the first metadata block in `body`.
    ///
    /// Absent bodies and bodies without a block yield iteration 1 with no
    /// category, started now. Malformed fields fall back individually.
    pub fn parse(body: Option<&str>) -> Self {
        Self::parse_at(body, &now_rfc3339())
    }

    /// Like [`IterationRecord::parse`] with an explicit fallback start time.
    pub fn parse_at(body: Option<&str>, now: &str) -> Self {
        let Some(content) = body
            .and_then(|text| METADATA_RE.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            return Self {
                iteration_count: 1,
                category: None,
                started_at: now.to_string(),
            };
        };

        let mut iteration_count = 1;
        let mut category = None;
        let mut started_at = None;
        for line in content.lines() {
            let Some(caps) = FIELD_RE.captures(line.trim_end()) else {
                continue;
            };
            let value = caps[2].trim();
            match &caps[1] {
                "iteration" => {
                    iteration_count = value.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or(1);
                }
                "category" => category = (!value.is_empty()).then(|| value.to_string()),
                "started" => started_at = (!value.is_empty()).then(|| value.to_string()),
                _ => {}
            }
        }

        Self {
            iteration_count,
            category,
            started_at: started_at.unwrap_or_else(|| now.to_string()),
        }
    }

    pub fn increment(&mut self) {
        self.iteration_count += 1;
    }

    /// Serialized block without a trailing newline.
    pub fn to_block(&self) -> String {
        format!(
            "<!-- {METADATA_MARKER}\niteration: {}\ncategory: {}\nstarted: {}\n-->",
            self.iteration_count,
            self.category.as_deref().unwrap_or(""),
            self.started_at
        )
    }

    /// Splice the current record into `body`.
    ///
    /// Replaces the first existing block in place, otherwise appends a new
    /// block after a blank line. Text outside the block is kept verbatim.
    pub fn render_into(&self, body: &str) -> String {
        let block = self.to_block();
        if let Some(found) = METADATA_RE.find(body) {
            let mut out = String::with_capacity(body.len() + block.len());
            out.push_str(&body[..found.start()]);
            out.push_str(&block);
            out.push_str(&body[found.end()..]);
            return out;
        }
        if body.is_empty() {
            return format!("{block}\n");
        }
        format!("{body}\n\n{block}\n")
    }
}

/// Current UTC time in the `started` field format (`2026-01-15T10:00:00Z`).
pub fn now_rfc3339() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
