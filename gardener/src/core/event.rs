//! Inbound events that drive a single orchestrator pass.

use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::Value;

/// Category requested by a manual trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryChoice {
    /// Pick the highest-priority category with capacity.
    Auto,
    Named(String),
}

impl CategoryChoice {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Self::Auto
        } else {
            Self::Named(trimmed.to_string())
        }
    }
}

/// Review outcome carried by a `pull_request_review` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    /// Any other state (e.g. `dismissed`); not acted upon.
    Other(String),
}

impl ReviewState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Self::Approved,
            "changes_requested" => Self::ChangesRequested,
            "commented" => Self::Commented,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::Commented => "commented",
            Self::Other(raw) => raw,
        }
    }
}

/// One inbound event, dispatched by the orchestrator with a single `match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ManualTrigger { category: CategoryChoice },
    Review { number: u64, state: ReviewState },
    Push { commit_message: String },
    Unknown { kind: String },
}

#[derive(Debug, Default, Deserialize)]
struct ReviewPayload {
    pull_request: Option<NumberRef>,
    review: Option<StateRef>,
}

#[derive(Debug, Deserialize)]
struct NumberRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct StateRef {
    state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    head_commit: Option<HeadCommit>,
}

#[derive(Debug, Deserialize)]
struct HeadCommit {
    message: Option<String>,
}

impl Event {
    /// Build an event from the CI event name and its JSON payload.
    ///
    /// `category` is only consulted for manual triggers. A review event
    /// without a pull request number is rejected.
    pub fn from_payload(kind: &str, payload: &Value, category: CategoryChoice) -> Result<Self> {
        match kind {
            "workflow_dispatch" => Ok(Self::ManualTrigger { category }),
            "pull_request_review" => {
                let parsed: ReviewPayload = if payload.is_null() {
                    ReviewPayload::default()
                } else {
                    ReviewPayload::deserialize(payload)
                        .map_err(|err| anyhow!("parse review payload: {err}"))?
                };
                let number = parsed
                    .pull_request
                    .map(|pr| pr.number)
                    .ok_or_else(|| anyhow!("review event missing pull_request.number"))?;
                let state = parsed
                    .review
                    .and_then(|review| review.state)
                    .unwrap_or_default();
                Ok(Self::Review {
                    number,
                    state: ReviewState::parse(&state),
                })
            }
            "push" => {
                let parsed: PushPayload = if payload.is_null() {
                    PushPayload::default()
                } else {
                    PushPayload::deserialize(payload)
                        .map_err(|err| anyhow!("parse push payload: {err}"))?
                };
                let commit_message = parsed
                    .head_commit
                    .and_then(|commit| commit.message)
                    .unwrap_or_default();
                Ok(Self::Push { commit_message })
            }
            other => Ok(Self::Unknown {
                kind: other.to_string(),
            }),
        }
    }
}

/// True if `message` carries the automation marker (case-insensitive).
pub fn has_marker(message: &str, marker: &str) -> bool {
    !marker.is_empty() && message.to_lowercase().contains(&marker.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_choice_treats_auto_and_blank_alike() {
        assert_eq!(CategoryChoice::parse("auto"), CategoryChoice::Auto);
        assert_eq!(CategoryChoice::parse(" AUTO "), CategoryChoice::Auto);
        assert_eq!(CategoryChoice::parse(""), CategoryChoice::Auto);
        assert_eq!(
            CategoryChoice::parse("linter_fixes"),
            CategoryChoice::Named("linter_fixes".to_string())
        );
    }

    #[test]
    fn parses_review_event() {
        let payload = json!({
            "pull_request": { "number": 123, "labels": [{ "name": "gardener" }] },
            "review": { "state": "changes_requested" }
        });
        let event =
            Event::from_payload("pull_request_review", &payload, CategoryChoice::Auto).expect("event");
        assert_eq!(
            event,
            Event::Review {
                number: 123,
                state: ReviewState::ChangesRequested
            }
        );
    }

    #[test]
    fn review_without_number_is_rejected() {
        let err = Event::from_payload("pull_request_review", &json!({}), CategoryChoice::Auto)
            .unwrap_err();
        assert!(err.to_string().contains("pull_request.number"));
    }

    #[test]
    fn parses_push_event_with_missing_commit() {
        let event = Event::from_payload("push", &Value::Null, CategoryChoice::Auto).expect("event");
        assert_eq!(
            event,
            Event::Push {
                commit_message: String::new()
            }
        );
    }

    #[test]
    fn unrecognised_kind_becomes_unknown() {
        let event = Event::from_payload("issue_comment", &json!({}), CategoryChoice::Auto)
            .expect("event");
        assert_eq!(
            event,
            Event::Unknown {
                kind: "issue_comment".to_string()
            }
        );
    }

    #[test]
    fn marker_match_ignores_case() {
        assert!(has_marker("[Gardener] Add tests (#12)", "[gardener]"));
        assert!(has_marker("* [gardener] Automated improvements", "[gardener]"));
        assert!(!has_marker("Regular commit", "[gardener]"));
        assert!(!has_marker("anything", ""));
    }

    #[test]
    fn review_state_round_trips_names() {
        for raw in ["approved", "changes_requested", "commented", "dismissed"] {
            assert_eq!(ReviewState::parse(raw).as_str(), raw);
        }
    }
}
