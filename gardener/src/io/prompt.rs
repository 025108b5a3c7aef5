//! Instruction text for the coding agent, rendered from minijinja templates.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::iteration::METADATA_MARKER;
use crate::core::registry::Category;
use crate::core::types::{IssueComment, LockSet, PullRequest, ReviewComment};

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const FEEDBACK_TEMPLATE: &str = include_str!("prompts/feedback.md");
const GENERIC_CATEGORY_TEMPLATE: &str = include_str!("prompts/category.md");

/// Built-in templates for the default categories.
const CATEGORY_TEMPLATES: [(&str, &str); 4] = [
    ("test_coverage", include_str!("prompts/test_coverage.md")),
    ("security_fixes", include_str!("prompts/security_fixes.md")),
    ("linter_fixes", include_str!("prompts/linter_fixes.md")),
    ("code_improvements", include_str!("prompts/code_improvements.md")),
];

/// Feedback sections dropped, in order, when the prompt exceeds its budget.
const DROP_ORDER: [&str; 2] = ["description", "conversation"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker pattern is valid")
});

/// Everything the task prompt needs besides the category itself.
#[derive(Debug, Clone)]
pub struct TaskPromptInputs<'a> {
    pub locked_paths: &'a LockSet,
    pub excluded_paths: &'a [String],
    pub max_files: u32,
    pub require_tests: bool,
}

/// Review state the feedback prompt is built from.
#[derive(Debug, Clone)]
pub struct FeedbackPromptInputs<'a> {
    pub pull_request: &'a PullRequest,
    pub review_comments: &'a [ReviewComment],
    pub issue_comments: &'a [IssueComment],
}

#[derive(Debug, Serialize)]
struct CommentContext {
    location: String,
    author: String,
    quoted: String,
}

/// Renders agent instructions; the feedback prompt is kept within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Instruction text for new work in `category`.
    ///
    /// The category's inline template wins over the built-in one; unknown
    /// categories get a generic template naming the category.
    pub fn build_task(&self, category: &Category, inputs: &TaskPromptInputs<'_>) -> Result<String> {
        let env = engine()?;
        let category_prompt = match &category.prompt {
            Some(inline) => inline.trim().to_string(),
            None => {
                let source = CATEGORY_TEMPLATES
                    .iter()
                    .find(|(id, _)| *id == category.id)
                    .map_or(GENERIC_CATEGORY_TEMPLATE, |(_, source)| *source);
                env.render_str(source, context! { category => &category.id })
                    .with_context(|| format!("render category prompt {}", category.id))?
                    .trim()
                    .to_string()
            }
        };

        // The prompt travels as one argv element, so a long lock list is
        // halved until the prompt fits the budget.
        let template = env.get_template("task")?;
        let locked: Vec<&String> = inputs.locked_paths.iter().collect();
        let mut shown = locked.len();
        loop {
            let rendered = template
                .render(context! {
                    category_prompt => &category_prompt,
                    custom_instructions => &category.custom_instructions,
                    max_files => inputs.max_files,
                    require_tests => inputs.require_tests,
                    locked_paths => &locked[..shown],
                    locked_more => locked.len() - shown,
                    excluded_paths => inputs.excluded_paths,
                })
                .context("render task prompt")?;
            let prompt = collapse_blank_lines(&rendered);
            if prompt.len() <= self.budget_bytes || shown == 0 {
                if prompt.len() > self.budget_bytes {
                    warn!(
                        bytes = prompt.len(),
                        budget = self.budget_bytes,
                        "task prompt over budget"
                    );
                }
                if shown < locked.len() {
                    debug!(shown, total = locked.len(), "locked file list shortened");
                }
                return Ok(prompt);
            }
            shown /= 2;
        }
    }

    /// Instruction text for addressing review feedback on an open pull request.
    ///
    /// Conversation comments carrying iteration metadata are bookkeeping and
    /// are left out.
    pub fn build_feedback(&self, inputs: &FeedbackPromptInputs<'_>) -> Result<String> {
        let pr = inputs.pull_request;
        let review_comments: Vec<CommentContext> = inputs
            .review_comments
            .iter()
            .map(|comment| CommentContext {
                location: format!(
                    "{}:{}",
                    comment.path,
                    comment
                        .line
                        .map_or_else(|| "general".to_string(), |line| line.to_string())
                ),
                author: comment.author.clone(),
                quoted: quote(&comment.body),
            })
            .collect();
        let conversation: Vec<CommentContext> = inputs
            .issue_comments
            .iter()
            .filter(|comment| !comment.body.contains(METADATA_MARKER))
            .map(|comment| CommentContext {
                location: String::new(),
                author: comment.author.clone(),
                quoted: quote(&comment.body),
            })
            .collect();

        let env = engine()?;
        let rendered = env
            .get_template("feedback")?
            .render(context! {
                number => pr.number,
                title => &pr.title,
                description => pr.body.as_deref().map(str::trim).filter(|s| !s.is_empty()),
                review_comments => review_comments,
                conversation => conversation,
            })
            .context("render feedback prompt")?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}

fn engine() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("task", TASK_TEMPLATE)
        .context("load task template")?;
    env.add_template("feedback", FEEDBACK_TEMPLATE)
        .context("load feedback template")?;
    Ok(env)
}

/// Markdown block quote of a comment body.
fn quote(body: &str) -> String {
    format!("> {}", body.trim_end().replace('\n', "\n> "))
}

/// Squash runs of blank lines left by skipped template blocks.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.trim().lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// A section of rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
///
/// Empty droppable sections are omitted.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let required = kind.as_str() == "required";
        let content = collapse_blank_lines(&rendered[whole.end()..end])
            .trim_end()
            .to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Drop droppable sections in [`DROP_ORDER`] until the prompt fits, then
/// truncate the longest remaining section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize {
        secs.iter().map(|s| s.content.len()).sum::<usize>() + secs.len().saturating_sub(1) * 2
    };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(longest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let before_len = longest.content.len();
    let allowed = before_len.saturating_sub(total - budget);
    let marker = "\n[truncated]";
    let mut cut = allowed.saturating_sub(marker.len());
    while !longest.content.is_char_boundary(cut) {
        cut -= 1;
    }
    longest.content.truncate(cut);
    longest.content.push_str(marker);
    debug!(
        section = %longest.key,
        before_len,
        after_len = longest.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[ParsedSection]) -> String {
    let mut out = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}
