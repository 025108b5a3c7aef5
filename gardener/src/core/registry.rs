//! Configured work categories in priority order.

use serde::{Deserialize, Serialize};

/// A configured class of improvement work.
///
/// TOML keys follow the `[[priorities]]` table layout (`category`, `max_prs`,
/// `enabled`, `tasks`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Category {
    #[serde(rename = "category")]
    pub id: String,

    /// Maximum number of open pull requests for this category.
    #[serde(rename = "max_prs")]
    pub max_concurrent_prs: u32,

    pub enabled: bool,

    /// Extra task lines appended to the category prompt.
    #[serde(rename = "tasks")]
    pub custom_instructions: Vec<String>,

    /// Inline template replacing the built-in category prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl Default for Category {
    fn default() -> Self {
        Self {
            id: String::new(),
            max_concurrent_prs: 3,
            enabled: true,
            custom_instructions: Vec::new(),
            prompt: None,
        }
    }
}

impl Category {
    pub fn new(id: &str, max_concurrent_prs: u32) -> Self {
        Self {
            id: id.to_string(),
            max_concurrent_prs,
            ..Self::default()
        }
    }
}

/// Read-only view over the configured categories.
///
/// Order is priority: the first category wins ties during automatic selection.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRegistry<'a> {
    categories: &'a [Category],
}

impl<'a> CategoryRegistry<'a> {
    pub fn new(categories: &'a [Category]) -> Self {
        Self { categories }
    }

    /// Enabled categories, highest priority first.
    pub fn enabled_categories(self) -> impl Iterator<Item = &'a Category> {
        self.categories.iter().filter(|category| category.enabled)
    }

    pub fn lookup(&self, id: &str) -> Option<&'a Category> {
        self.categories.iter().find(|category| category.id == id)
    }
}
