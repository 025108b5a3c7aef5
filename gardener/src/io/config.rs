//! Gardener configuration stored in `gardener.toml` at the repository root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::labels::labels_for_category;
use crate::core::registry::{Category, CategoryRegistry};

pub const DEFAULT_CONFIG_FILE: &str = "gardener.toml";

/// Gardener configuration (TOML).
///
/// Every field is optional in the file; missing or out-of-range values fall
/// back to the defaults below so a run always has a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GardenerConfig {
    pub version: u32,

    /// Tag that marks commits made on behalf of the gardener.
    pub marker: String,

    /// Globs the agent is told not to modify.
    pub excluded_paths: Vec<String>,

    pub workers: WorkersConfig,

    /// Work categories, highest priority first.
    pub priorities: Vec<Category>,

    pub guardrails: GuardrailsConfig,

    pub labels: LabelsConfig,

    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkersConfig {
    /// Global cap on open automated pull requests.
    pub max_concurrent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GuardrailsConfig {
    /// Review cycles before a pull request is handed to a human.
    pub max_iterations_per_pr: u32,
    pub max_files_per_pr: u32,
    pub require_tests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LabelsConfig {
    /// Label identifying automated pull requests.
    pub base: String,
    /// Also apply `<base>:<category>` sub-labels.
    pub categories: bool,
    /// Label applied on escalation.
    pub needs_human: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent argv; the instruction text is appended as the final argument.
    pub command: Vec<String>,

    /// Wall-clock budget for one agent invocation, in seconds.
    pub timeout_secs: u64,

    /// Truncate captured agent output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Maximum bytes for the feedback prompt before dropping sections.
    pub prompt_budget_bytes: usize,

    /// Git remote branches are pushed to.
    pub remote: String,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_iterations_per_pr: 5,
            max_files_per_pr: 10,
            require_tests: true,
        }
    }
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            base: "gardener".to_string(),
            categories: true,
            needs_human: "needs-human".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "claude".to_string(),
                "--print".to_string(),
                "--dangerously-skip-permissions".to_string(),
            ],
            timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            prompt_budget_bytes: 40_000,
            remote: "origin".to_string(),
        }
    }
}

impl Default for GardenerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            marker: "[gardener]".to_string(),
            excluded_paths: vec!["vendor/**".to_string(), "node_modules/**".to_string()],
            workers: WorkersConfig::default(),
            priorities: default_priorities(),
            guardrails: GuardrailsConfig::default(),
            labels: LabelsConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

fn default_priorities() -> Vec<Category> {
    vec![
        Category::new("test_coverage", 3),
        Category::new("security_fixes", 2),
        Category::new("linter_fixes", 5),
        Category::new("code_improvements", 3),
    ]
}

impl GardenerConfig {
    pub fn registry(&self) -> CategoryRegistry<'_> {
        CategoryRegistry::new(&self.priorities)
    }

    /// Labels applied to (and used to count) pull requests of `category`.
    pub fn labels_for_category(&self, category: &str) -> Vec<String> {
        labels_for_category(&self.labels.base, self.labels.categories, category)
    }

    /// Replace out-of-range values with defaults, logging each correction.
    pub fn normalize(mut self) -> Self {
        let defaults = Self::default();

        if self.workers.max_concurrent == 0 {
            warn!("workers.max_concurrent must be > 0, using default");
            self.workers.max_concurrent = defaults.workers.max_concurrent;
        }
        if self.guardrails.max_iterations_per_pr == 0 {
            warn!("guardrails.max_iterations_per_pr must be > 0, using default");
            self.guardrails.max_iterations_per_pr = defaults.guardrails.max_iterations_per_pr;
        }
        if self.guardrails.max_files_per_pr == 0 {
            warn!("guardrails.max_files_per_pr must be > 0, using default");
            self.guardrails.max_files_per_pr = defaults.guardrails.max_files_per_pr;
        }
        if self.labels.base.trim().is_empty() {
            warn!("labels.base must not be empty, using default");
            self.labels.base = defaults.labels.base.clone();
        }
        if self.labels.needs_human.trim().is_empty() {
            warn!("labels.needs_human must not be empty, using default");
            self.labels.needs_human = defaults.labels.needs_human.clone();
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            warn!("agent.command must be a non-empty array, using default");
            self.agent.command = defaults.agent.command.clone();
        }
        if self.agent.timeout_secs == 0 {
            warn!("agent.timeout_secs must be > 0, using default");
            self.agent.timeout_secs = defaults.agent.timeout_secs;
        }
        if self.agent.output_limit_bytes == 0 {
            warn!("agent.output_limit_bytes must be > 0, using default");
            self.agent.output_limit_bytes = defaults.agent.output_limit_bytes;
        }
        if self.agent.prompt_budget_bytes == 0 {
            warn!("agent.prompt_budget_bytes must be > 0, using default");
            self.agent.prompt_budget_bytes = defaults.agent.prompt_budget_bytes;
        }
        if self.agent.remote.trim().is_empty() {
            warn!("agent.remote must not be empty, using default");
            self.agent.remote = defaults.agent.remote.clone();
        }

        let mut seen = Vec::new();
        self.priorities.retain_mut(|category| {
            category.id = category.id.trim().to_string();
            if category.id.is_empty() {
                warn!("dropping priority entry without a category name");
                return false;
            }
            if seen.contains(&category.id) {
                warn!(category = %category.id, "dropping duplicate priority entry");
                return false;
            }
            if category.max_concurrent_prs == 0 {
                warn!(category = %category.id, "max_prs must be > 0, using default");
                category.max_concurrent_prs = Category::default().max_concurrent_prs;
            }
            seen.push(category.id.clone());
            true
        });

        self
    }
}

/// Load config from a TOML file.
///
/// A missing file yields the defaults. An unreadable or unparseable file is
/// logged and also yields the defaults: configuration problems never stop a run.
pub fn load_config(path: &Path) -> GardenerConfig {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        return GardenerConfig::default();
    }
    match read_config(path) {
        Ok(cfg) => cfg.normalize(),
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(path = %path.display(), err = %reason, "invalid config, using defaults");
            GardenerConfig::default()
        }
    }
}

fn read_config(path: &Path) -> Result<GardenerConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Parse TOML text, layering it over the defaults.
pub fn parse_config(contents: &str) -> Result<GardenerConfig> {
    let cfg: GardenerConfig = toml::from_str(contents)?;
    Ok(cfg)
}

/// Render a config as TOML with a trailing newline.
pub fn render_config(cfg: &GardenerConfig) -> Result<String> {
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    Ok(buf)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &GardenerConfig) -> Result<()> {
    let buf = render_config(cfg)?;
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml"));
        assert_eq!(cfg, GardenerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gardener.toml");
        let mut cfg = GardenerConfig::default();
        cfg.priorities[1].enabled = false;
        cfg.priorities[0].custom_instructions = vec!["cover the parser".to_string()];
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path), cfg);
    }

    #[test]
    fn partial_file_layers_over_defaults() {
        let cfg = parse_config(
            r#"
[workers]
max_concurrent = 2

[guardrails]
max_iterations_per_pr = 3

[[priorities]]
category = "docs"
max_prs = 1
tasks = ["document public functions"]
"#,
        )
        .expect("parse");
        assert_eq!(cfg.workers.max_concurrent, 2);
        assert_eq!(cfg.guardrails.max_iterations_per_pr, 3);
        assert_eq!(cfg.guardrails.max_files_per_pr, 10);
        assert!(cfg.guardrails.require_tests);
        assert_eq!(cfg.labels.base, "gardener");
        assert_eq!(cfg.priorities.len(), 1);
        assert_eq!(cfg.priorities[0].id, "docs");
        assert!(cfg.priorities[0].enabled);
        assert_eq!(
            cfg.priorities[0].custom_instructions,
            vec!["document public functions"]
        );
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gardener.toml");
        fs::write(&path, "workers = [not toml").expect("write");
        assert_eq!(load_config(&path), GardenerConfig::default());
    }

    #[test]
    fn normalize_repairs_out_of_range_values() {
        let cfg = parse_config(
            r#"
[workers]
max_concurrent = 0

[agent]
command = []

[[priorities]]
category = "a"
max_prs = 0

[[priorities]]
max_prs = 2

[[priorities]]
category = "a"
max_prs = 4
"#,
        )
        .expect("parse")
        .normalize();
        assert_eq!(cfg.workers.max_concurrent, 3);
        assert_eq!(cfg.agent.command, AgentConfig::default().command);
        assert_eq!(cfg.priorities.len(), 1);
        assert_eq!(cfg.priorities[0].max_concurrent_prs, 3);
    }

    #[test]
    fn labels_follow_category_toggle() {
        let mut cfg = GardenerConfig::default();
        assert_eq!(
            cfg.labels_for_category("test_coverage"),
            vec!["gardener", "gardener:test_coverage"]
        );
        cfg.labels.categories = false;
        assert_eq!(cfg.labels_for_category("test_coverage"), vec!["gardener"]);
    }
}
