//! Lifecycle tests driving the orchestrator across several events.
//!
//! State only lives on the fake hosting service between runs, the same way
//! separate CI invocations only share labels and pull request bodies.

use chrono::{DateTime, TimeZone, Utc};

use gardener::core::event::{CategoryChoice, Event, ReviewState};
use gardener::core::iteration::IterationRecord;
use gardener::core::registry::Category;
use gardener::core::types::{AgentOutcome, ReviewComment};
use gardener::exit_codes;
use gardener::io::config::GardenerConfig;
use gardener::orchestrator::{Orchestrator, RunOutcome};
use gardener::test_support::{FakeHosting, HostingCall, ScriptedAgent};

fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 15, 0)
        .single()
        .expect("valid time")
}

fn config() -> GardenerConfig {
    let mut cfg = GardenerConfig {
        priorities: vec![Category::new("security_fixes", 3)],
        ..GardenerConfig::default()
    };
    cfg.guardrails.max_iterations_per_pr = 2;
    cfg.workers.max_concurrent = 1;
    cfg
}

fn changes_requested(number: u64) -> Event {
    Event::Review {
        number,
        state: ReviewState::ChangesRequested,
    }
}

/// Manual trigger → feedback round → ceiling reached → escalation.
///
/// The second review arrives once the metadata says two iterations have
/// run, so it must escalate without invoking the agent.
#[test]
fn pull_request_is_escalated_after_iteration_ceiling() {
    let cfg = config();
    let hosting = FakeHosting::new();
    let agent = ScriptedAgent::new(vec![
        AgentOutcome::succeeded("PR_TITLE: Pin TLS versions\nPR_BODY: Reject TLS 1.0."),
        AgentOutcome::succeeded("addressed"),
    ]);

    let created = Orchestrator::new(&cfg, &hosting, &agent)
        .with_clock(clock())
        .run(&Event::ManualTrigger {
            category: CategoryChoice::Auto,
        })
        .expect("manual run");
    let RunOutcome::PullRequestCreated { number, .. } = created else {
        panic!("unexpected outcome {created:?}");
    };

    let hosting = hosting.with_review_comments(
        number,
        vec![ReviewComment {
            path: "src/tls.rs".to_string(),
            line: Some(12),
            author: "octo".to_string(),
            body: "Also reject 1.1".to_string(),
        }],
    );
    let first = Orchestrator::new(&cfg, &hosting, &agent)
        .run(&changes_requested(number))
        .expect("first review");
    assert_eq!(
        first,
        RunOutcome::FeedbackAddressed {
            number,
            iteration: 2
        }
    );
    let requests = agent.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].instruction.contains("Also reject 1.1"));
    assert_eq!(requests[1].branch, requests[0].branch);

    let second = Orchestrator::new(&cfg, &hosting, &agent)
        .run(&changes_requested(number))
        .expect("second review");
    assert_eq!(
        second,
        RunOutcome::Escalated {
            number,
            max_iterations: 2
        }
    );
    assert_eq!(agent.requests().len(), 2);

    let pr = hosting.pull_request(number).expect("pr");
    assert!(pr.labels.contains(&"needs-human".to_string()));
    let record = IterationRecord::parse(pr.body.as_deref());
    assert_eq!(record.iteration_count, 2);
    assert_eq!(record.category.as_deref(), Some("security_fixes"));
    assert_eq!(record.started_at, "2026-05-04T09:15:00Z");

    let comments: Vec<String> = hosting
        .mutations()
        .into_iter()
        .filter_map(|call| match call {
            HostingCall::AddComment { body, .. } => Some(body),
            _ => None,
        })
        .collect();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0], "Iteration 2 completed.");
    assert!(comments[1].contains("maximum number of iterations (2)"));
}

/// A merged gardener commit triggers selection again, which respects the
/// worker cap while the escalated pull request is still open.
#[test]
fn merge_follow_up_respects_worker_cap() {
    let cfg = config();
    let hosting = FakeHosting::new();
    let agent = ScriptedAgent::new(vec![AgentOutcome::succeeded("done")]);
    Orchestrator::new(&cfg, &hosting, &agent)
        .with_clock(clock())
        .run(&Event::ManualTrigger {
            category: CategoryChoice::Auto,
        })
        .expect("manual run");

    let outcome = Orchestrator::new(&cfg, &hosting, &agent)
        .run(&Event::Push {
            commit_message: "[Gardener] Automated improvements (#7)".to_string(),
        })
        .expect("push");
    assert_eq!(
        outcome,
        RunOutcome::MergeFollowUp(Box::new(RunOutcome::AtCapacity { open: 1, max: 1 }))
    );
    assert_eq!(outcome.exit_code(), exit_codes::OK);
    assert_eq!(agent.requests().len(), 1);
}
