//! End-to-end tests for the automation pipeline.
//!
//! These tests drive jobs through all three workers using the in-memory
//! queue: enrich → evaluate → notify, including retries and dead letters.
//!
//! The MockPublisher implements the same JobPublisher trait as the real
//! Producer, so settlement runs the production code paths except the
//! actual broker transport. Jobs that are not due are parked in the store
//! and released once the harness clock reaches them.

use automation_core::{ExecutionKey, ExecutionStatus};
use integration_tests::{fixtures, setup::Pipeline};
use redpanda::{topic, JobEnvelope, JobOptions};
use serde_json::json;
use std::time::Duration;
use worker::JobOutcome;

/// Signup → welcome email, the reference scenario.
#[tokio::test]
async fn test_signup_sends_welcome_email() {
    let pipeline = Pipeline::new();
    pipeline.store.add_event(fixtures::signup_event("evt-1", "user-1"));
    pipeline.store.add_user("user-1", Some("asha@example.com"));
    pipeline.store.add_automation(fixtures::welcome_automation());

    pipeline.track("evt-1").await.unwrap();
    let report = pipeline.drain().await;

    assert_eq!(report.completed(), 3, "one job per stage: {:?}", report.runs);

    let event = pipeline.store.event("evt-1").unwrap();
    assert!(event.enriched);
    assert_eq!(event.metadata["device_type"], "desktop");

    let sent = pipeline.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "asha@example.com");
    assert_eq!(sent[0].subject, "Welcome aboard");

    let key = ExecutionKey::new("welcome", "evt-1", Some("user-1".into()));
    let execution = pipeline.store.execution(&key).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert!(pipeline.publisher.published().is_empty());
}

#[tokio::test]
async fn test_duplicate_tracking_sends_once() {
    let pipeline = Pipeline::new();
    pipeline.store.add_event(fixtures::signup_event("evt-1", "user-1"));
    pipeline.store.add_user("user-1", Some("asha@example.com"));
    pipeline.store.add_automation(fixtures::welcome_automation());

    pipeline.track("evt-1").await.unwrap();
    pipeline.track("evt-1").await.unwrap();
    let report = pipeline.drain().await;

    assert_eq!(report.for_queue(topic::ENRICHMENT).len(), 2);
    assert_eq!(report.for_queue(topic::RULE_ENGINE).len(), 2);
    assert_eq!(report.for_queue(topic::NOTIFICATION).len(), 1);
    assert_eq!(pipeline.store.executions().len(), 1);
    assert_eq!(pipeline.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_non_matching_event_stops_at_rule_engine() {
    let pipeline = Pipeline::new();
    pipeline
        .store
        .add_event(automation_core::TrackedEvent::new("evt-9", "page_view"));
    pipeline.store.add_automation(fixtures::welcome_automation());

    pipeline.track("evt-9").await.unwrap();
    let report = pipeline.drain().await;

    assert_eq!(report.completed(), 2);
    assert!(pipeline.store.executions().is_empty());
    assert!(pipeline.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_transient_failures_retry_with_doubling_backoff() {
    let pipeline = Pipeline::new();
    pipeline.store.add_event(fixtures::signup_event("evt-1", "user-1"));
    pipeline.store.fail_event_reads(100);

    pipeline.track("evt-1").await.unwrap();
    let report = pipeline.drain().await;

    let outcomes = report.for_queue(topic::ENRICHMENT);
    assert_eq!(outcomes.len(), 5, "{outcomes:?}");

    for (outcome, (attempt, secs)) in outcomes.iter().zip([(2, 1), (3, 2), (4, 4), (5, 8)]) {
        match outcome {
            JobOutcome::Retried { attempt: a, delay } => {
                assert_eq!(*a, attempt);
                let expected = Duration::from_secs(secs);
                assert!(
                    *delay <= expected && *delay > expected - Duration::from_millis(250),
                    "attempt {attempt}: delay {delay:?}"
                );
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }
    assert!(matches!(outcomes[4], JobOutcome::DeadLettered { .. }));

    let dead = pipeline.dead_letters(topic::ENRICHMENT);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempt, 5);
    assert!(dead[0].last_error.as_deref().unwrap().contains("DB_002"));
    assert!(!pipeline.store.event("evt-1").unwrap().enriched);
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let pipeline = Pipeline::new();
    pipeline.store.add_event(fixtures::signup_event("evt-1", "user-1"));
    pipeline.store.add_user("user-1", Some("asha@example.com"));
    pipeline.store.add_automation(fixtures::welcome_automation());
    pipeline.store.fail_event_reads(2);

    pipeline.track("evt-1").await.unwrap();
    let report = pipeline.drain().await;

    let enrichment = report.for_queue(topic::ENRICHMENT);
    assert_eq!(enrichment.len(), 3);
    assert_eq!(*enrichment[2], JobOutcome::Completed);
    assert_eq!(pipeline.mailer.sent().len(), 1);
    assert!(pipeline.dead_letters(topic::ENRICHMENT).is_empty());
}

#[tokio::test]
async fn test_undecodable_payload_is_dead_lettered_immediately() {
    let pipeline = Pipeline::new();
    let envelope = JobEnvelope::new(topic::RULE_ENGINE, json!("not a job"), &JobOptions::default());
    pipeline.publisher.inject(topic::RULE_ENGINE, envelope);

    let report = pipeline.drain().await;

    assert_eq!(report.runs.len(), 1);
    assert!(matches!(report.runs[0].1, JobOutcome::DeadLettered { .. }));
    let dead = pipeline.dead_letters(topic::RULE_ENGINE);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempt, 1);
}

#[tokio::test]
async fn test_delayed_action_waits_for_visibility() {
    let pipeline = Pipeline::new();
    pipeline.store.add_event(fixtures::signup_event("evt-1", "user-1"));
    pipeline.store.add_user("user-1", Some("asha@example.com"));
    pipeline.store.add_automation(
        fixtures::automation("drip", "signup", 10)
            .with_action(fixtures::email_action("Day one").with_delay_ms(86_400_000)),
    );

    pipeline.track("evt-1").await.unwrap();
    let report = pipeline.drain().await;

    assert_eq!(report.completed(), 3);
    assert_eq!(report.deferred(topic::NOTIFICATION), 1);
    assert!(pipeline.skipped() >= Duration::from_secs(86_399));
    assert_eq!(pipeline.mailer.sent()[0].subject, "Day one");
    assert!(pipeline.store.parked().is_empty());
}

#[tokio::test]
async fn test_delayed_action_does_not_hold_back_immediate_ones() {
    let pipeline = Pipeline::new();
    pipeline.store.add_event(fixtures::signup_event("evt-1", "user-1"));
    pipeline.store.add_user("user-1", Some("asha@example.com"));
    // Older rule first, so its day-long job sits ahead on the notify queue.
    pipeline.store.add_automation(
        fixtures::automation("drip", "signup", 120)
            .with_action(fixtures::email_action("Day one").with_delay_ms(86_400_000)),
    );
    pipeline.store.add_automation(fixtures::welcome_automation());

    pipeline.track("evt-1").await.unwrap();

    // Run only what is visible now: no clock jumps.
    while let Some((queue, envelope)) = pipeline.publisher.pop_next(topic::ALL) {
        pipeline.run_one(&queue, envelope).await.unwrap();
    }

    let sent = pipeline.mailer.sent();
    assert_eq!(sent.len(), 1, "immediate email must not wait for the drip");
    assert_eq!(sent[0].subject, "Welcome aboard");
    assert_eq!(pipeline.skipped(), Duration::ZERO);

    let welcome = ExecutionKey::new("welcome", "evt-1", Some("user-1".into()));
    assert_eq!(pipeline.store.execution(&welcome).unwrap().status, ExecutionStatus::Success);
    let drip = ExecutionKey::new("drip", "evt-1", Some("user-1".into()));
    assert_eq!(pipeline.store.execution(&drip).unwrap().status, ExecutionStatus::Queued);
    assert_eq!(pipeline.store.parked().len(), 1);

    // A day later the drip goes out too.
    let report = pipeline.drain().await;
    assert_eq!(report.for_queue(topic::NOTIFICATION), vec![&JobOutcome::Completed]);
    assert!(pipeline.skipped() >= Duration::from_secs(86_399));
    let subjects: Vec<String> = pipeline.mailer.sent().into_iter().map(|m| m.subject).collect();
    assert_eq!(subjects, vec!["Welcome aboard", "Day one"]);
    assert_eq!(pipeline.store.execution(&drip).unwrap().status, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_retry_backoff_parks_instead_of_waiting() {
    let pipeline = Pipeline::new();
    pipeline.store.add_event(fixtures::signup_event("evt-1", "user-1"));
    pipeline.store.fail_event_reads(1);

    pipeline.track("evt-1").await.unwrap();
    let report = pipeline.drain().await;

    let enrichment = report.for_queue(topic::ENRICHMENT);
    assert!(matches!(enrichment[0], JobOutcome::Retried { attempt: 2, .. }));
    assert_eq!(*enrichment[1], JobOutcome::Completed);
    assert_eq!(report.deferred(topic::ENRICHMENT), 1);
    assert!(pipeline.store.event("evt-1").unwrap().enriched);
}
