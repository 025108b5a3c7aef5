//! Task selection for `gardener select` and the manual-trigger path.

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::event::CategoryChoice;
use crate::core::registry::Category;
use crate::core::types::WorkRequest;
use crate::io::config::GardenerConfig;
use crate::io::hosting::Hosting;
use crate::io::outputs::Outputs;
use crate::io::prompt::{PromptBuilder, TaskPromptInputs};
use crate::locks::compute_lock_set;

/// Structured selection outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Open automated pull requests already meet the global cap.
    AtCapacity { open: usize, max: u32 },
    /// No requested or enabled category has capacity.
    NoWork,
    Selected(WorkRequest),
}

impl SelectOutcome {
    pub fn status_line(&self) -> String {
        match self {
            Self::AtCapacity { max, .. } => {
                format!("At worker capacity ({max} concurrent PRs). Skipping.")
            }
            Self::NoWork => {
                "No tasks available. All categories at max PRs or no work to do.".to_string()
            }
            Self::Selected(work) => format!("Selected task: {}", work.category),
        }
    }

    /// Step outputs for `gardener select`.
    pub fn outputs(&self, base_label: &str) -> Outputs {
        match self {
            Self::AtCapacity { .. } | Self::NoWork => vec![("skipped", "true".to_string())],
            Self::Selected(work) => vec![
                ("skipped", "false".to_string()),
                ("category", work.category.clone()),
                ("base_label", base_label.to_string()),
                ("prompt", work.instruction_text.clone()),
            ],
        }
    }
}

/// Chooses the next unit of work under per-category capacity limits.
pub struct TaskSelector<'a, H: Hosting> {
    config: &'a GardenerConfig,
    hosting: &'a H,
    prompts: PromptBuilder,
}

impl<'a, H: Hosting> TaskSelector<'a, H> {
    pub fn new(config: &'a GardenerConfig, hosting: &'a H) -> Self {
        Self {
            config,
            hosting,
            prompts: PromptBuilder::new(config.agent.prompt_budget_bytes),
        }
    }

    /// Open pull requests carrying the base label.
    pub fn open_automated_count(&self) -> Result<usize> {
        let open = self
            .hosting
            .list_open_pull_requests(std::slice::from_ref(&self.config.labels.base))
            .context("count automated pull requests")?;
        Ok(open.len())
    }

    /// Work for `id`, if it is configured, enabled and below its cap.
    #[instrument(skip(self))]
    pub fn select_for_category(&self, id: &str) -> Result<Option<WorkRequest>> {
        let Some(category) = self.config.registry().lookup(id) else {
            debug!(category = id, "category not configured");
            return Ok(None);
        };
        if !category.enabled {
            debug!(category = id, "category disabled");
            return Ok(None);
        }
        if !self.has_capacity(category)? {
            return Ok(None);
        }
        self.build_request(category).map(Some)
    }

    /// Work for the highest-priority enabled category with capacity.
    ///
    /// Capacity is checked lazily, one category at a time.
    pub fn select_next(&self) -> Result<Option<WorkRequest>> {
        for category in self.config.registry().enabled_categories() {
            if self.has_capacity(category)? {
                return self.build_request(category).map(Some);
            }
        }
        debug!("no enabled category has capacity");
        Ok(None)
    }

    pub fn select(&self, choice: &CategoryChoice) -> Result<Option<WorkRequest>> {
        match choice {
            CategoryChoice::Auto => self.select_next(),
            CategoryChoice::Named(id) => self.select_for_category(id),
        }
    }

    /// Global capacity gate followed by selection.
    pub fn run(&self, choice: &CategoryChoice) -> Result<SelectOutcome> {
        let open = self.open_automated_count()?;
        let max = self.config.workers.max_concurrent;
        if open >= max as usize {
            info!(open, max, "at worker capacity");
            return Ok(SelectOutcome::AtCapacity { open, max });
        }
        Ok(match self.select(choice)? {
            Some(work) => {
                info!(category = %work.category, locked = work.locked_paths.len(), "selected task");
                SelectOutcome::Selected(work)
            }
            None => SelectOutcome::NoWork,
        })
    }

    fn has_capacity(&self, category: &Category) -> Result<bool> {
        let labels = self.config.labels_for_category(&category.id);
        let open = self
            .hosting
            .list_open_pull_requests(&labels)
            .with_context(|| format!("count open pull requests for {}", category.id))?
            .len();
        let has_capacity = open < category.max_concurrent_prs as usize;
        debug!(
            category = %category.id,
            open,
            max = category.max_concurrent_prs,
            has_capacity,
            "category capacity"
        );
        Ok(has_capacity)
    }

    fn build_request(&self, category: &Category) -> Result<WorkRequest> {
        let locked_paths = compute_lock_set(self.hosting, &self.config.labels.base)?;
        let guardrails = &self.config.guardrails;
        let instruction_text = self.prompts.build_task(
            category,
            &TaskPromptInputs {
                locked_paths: &locked_paths,
                excluded_paths: &self.config.excluded_paths,
                max_files: guardrails.max_files_per_pr,
                require_tests: guardrails.require_tests,
            },
        )?;
        Ok(WorkRequest {
            category: category.id.clone(),
            instruction_text,
            locked_paths,
        })
    }
}
