//! Label naming and the label catalogue (colors, descriptions).

use crate::core::types::LabelSpec;

const DEFAULT_COLOR: &str = "ededed";
const BASE_COLOR: &str = "1d76db";
const NEEDS_HUMAN_COLOR: &str = "e99695";

/// Colors for the sub-labels of the default categories.
const CATEGORY_COLORS: [(&str, &str); 4] = [
    ("test_coverage", "0e8a16"),
    ("security_fixes", "d93f0b"),
    ("linter_fixes", "fbca04"),
    ("code_improvements", "c5def5"),
];

/// Sub-label for a category, e.g. `gardener:test_coverage`.
pub fn category_label(base: &str, category: &str) -> String {
    format!("{base}:{category}")
}

/// Labels an automated pull request for `category` carries.
///
/// With category sub-labels disabled only the base label is used, which also
/// means per-category counts degrade to the base-label count.
pub fn labels_for_category(base: &str, include_categories: bool, category: &str) -> Vec<String> {
    if include_categories {
        vec![base.to_string(), category_label(base, category)]
    } else {
        vec![base.to_string()]
    }
}

/// Catalogue entry for `name`, used when the label may need creating.
pub fn label_spec(name: &str, base: &str, needs_human: &str) -> LabelSpec {
    if name == base {
        return LabelSpec {
            name: name.to_string(),
            color: BASE_COLOR.to_string(),
            description: Some("PR created by Gardener".to_string()),
        };
    }
    if name == needs_human {
        return LabelSpec {
            name: name.to_string(),
            color: NEEDS_HUMAN_COLOR.to_string(),
            description: Some("Gardener PR that needs human intervention".to_string()),
        };
    }
    let color = name
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|category| {
            CATEGORY_COLORS
                .iter()
                .find(|(known, _)| *known == category)
                .map(|(_, color)| *color)
        })
        .unwrap_or(DEFAULT_COLOR);
    LabelSpec {
        name: name.to_string(),
        color: color.to_string(),
        description: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_labels_follow_toggle() {
        assert_eq!(
            labels_for_category("gardener", true, "linter_fixes"),
            vec!["gardener", "gardener:linter_fixes"]
        );
        assert_eq!(
            labels_for_category("gardener", false, "linter_fixes"),
            vec!["gardener"]
        );
    }

    #[test]
    fn catalogue_colors() {
        assert_eq!(label_spec("gardener", "gardener", "needs-human").color, "1d76db");
        assert_eq!(
            label_spec("gardener:security_fixes", "gardener", "needs-human").color,
            "d93f0b"
        );
        assert_eq!(
            label_spec("gardener:docs", "gardener", "needs-human").color,
            "ededed"
        );
        let human = label_spec("needs-human", "gardener", "needs-human");
        assert_eq!(human.color, "e99695");
        assert!(human.description.is_some());
    }
}
