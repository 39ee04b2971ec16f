//! Rule engine worker tests.
//!
//! Trigger and filter matching, execution dedup under re-delivery, action
//! fan-out order, the compensation path when publishing fails, and resumed
//! fan-out for executions left queued without their action jobs.

use automation_core::{
    Automation, AutomationExecution, EvaluateEventJob, ExecutionKey, ExecutionStatus,
    NotificationJob, TrackedEvent, Trigger,
};
use integration_tests::{fixtures, mocks::MemoryStore, mocks::MockPublisher};
use redpanda::topic;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use worker::{EvaluationSummary, RuleEngineWorker};

fn setup() -> (Arc<MemoryStore>, Arc<MockPublisher>, RuleEngineWorker) {
    let store = MemoryStore::new();
    let publisher = Arc::new(MockPublisher::new());
    let worker = RuleEngineWorker::new(store.clone(), store.clone(), store.clone(), publisher.clone());
    (store, publisher, worker)
}

fn notification_jobs(publisher: &MockPublisher) -> Vec<NotificationJob> {
    publisher
        .payloads(topic::NOTIFICATION)
        .into_iter()
        .map(|p| serde_json::from_value(p).unwrap())
        .collect()
}

#[tokio::test]
async fn test_missing_event_terminates_quietly() {
    let (store, publisher, worker) = setup();
    store.add_automation(fixtures::welcome_automation());

    let summary = worker.evaluate(&EvaluateEventJob::new("ghost")).await.unwrap();

    assert_eq!(summary, EvaluationSummary::default());
    assert!(store.executions().is_empty());
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn test_double_delivery_creates_one_execution() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(fixtures::welcome_automation());
    let job = EvaluateEventJob::new("evt-1");

    let first = worker.evaluate(&job).await.unwrap();
    let second = worker.evaluate(&job).await.unwrap();

    assert_eq!(first.executions_created, 1);
    assert_eq!(first.jobs_published, 1);
    assert_eq!(second.executions_created, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(second.jobs_published, 0);
    assert_eq!(second.fan_outs_resumed, 0);

    let executions = store.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Queued);
    assert!(executions[0].actions_published);
    assert_eq!(publisher.on_topic(topic::NOTIFICATION).len(), 1);
}

#[tokio::test]
async fn test_city_filter() {
    let (store, _publisher, worker) = setup();
    store.add_automation(fixtures::automation("pune", "signup", 10).with_filter("metadata.city", "Pune"));

    store.add_event(TrackedEvent::new("in-pune", "signup").with_metadata("city", "Pune"));
    store.add_event(TrackedEvent::new("in-mumbai", "signup").with_metadata("city", "Mumbai"));
    store.add_event(TrackedEvent::new("no-city", "signup"));

    for (event_id, expected) in [("in-pune", 1), ("in-mumbai", 0), ("no-city", 0)] {
        let summary = worker.evaluate(&EvaluateEventJob::new(event_id)).await.unwrap();
        assert_eq!(summary.matched, expected, "event {event_id}");
    }

    let executions = store.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].event_id, "in-pune");
}

#[tokio::test]
async fn test_filter_equality_is_strict() {
    let (store, _publisher, worker) = setup();
    store.add_automation(fixtures::automation("numeric", "purchase", 30).with_filter("metadata.items", 2));
    store.add_automation(fixtures::automation("null-coupon", "purchase", 20).with_filter("metadata.coupon", json!(null)));
    store.add_automation(fixtures::automation("nested", "purchase", 10).with_filter("metadata.cart.0.sku", "A-1"));

    store.add_event(
        TrackedEvent::new("p1", "purchase")
            .with_metadata("items", json!(2.0))
            .with_metadata("coupon", json!(null))
            .with_metadata("cart", json!([{ "sku": "A-1" }])),
    );
    store.add_event(
        TrackedEvent::new("p2", "purchase")
            .with_metadata("items", "2")
            .with_metadata("cart", json!([])),
    );

    let p1 = worker.evaluate(&EvaluateEventJob::new("p1")).await.unwrap();
    assert_eq!(p1.matched, 3);

    let p2 = worker.evaluate(&EvaluateEventJob::new("p2")).await.unwrap();
    assert_eq!(p2.matched, 0, "string \"2\" must not equal 2; missing coupon is not null");
}

#[tokio::test]
async fn test_trigger_must_match_event_name_exactly() {
    let (store, _publisher, worker) = setup();
    store.add_automation(fixtures::automation("lower", "signup", 30).with_action(fixtures::email_action("hi")));
    store.add_automation(fixtures::automation("upper", "Signup", 20).with_action(fixtures::email_action("hi")));
    let mut segment = Automation::new("segment", "segment rule", Trigger::Segment { segment_id: None });
    segment.actions.push(fixtures::email_action("hi"));
    store.add_automation(segment);
    let mut inactive = fixtures::automation("inactive", "signup", 10).with_action(fixtures::email_action("hi"));
    inactive.active = false;
    store.add_automation(inactive);

    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    let summary = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();

    assert_eq!(summary.automations_considered, 3);
    assert_eq!(summary.matched, 1);
    assert_eq!(store.executions()[0].automation_id, "lower");
}

#[tokio::test]
async fn test_actions_fan_out_in_order() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(
        fixtures::automation("onboarding", "signup", 10)
            .with_action(fixtures::email_action("Welcome"))
            .with_action(fixtures::sms_action("Thanks for joining").with_delay_ms(60_000)),
    );

    let summary = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();
    assert_eq!(summary.jobs_published, 2);

    let jobs = notification_jobs(&publisher);
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].action.type_name(), "email");
    assert_eq!(jobs[1].action.type_name(), "sms");
    for job in &jobs {
        assert_eq!(job.automation_id, "onboarding");
        assert_eq!(job.event_id, "evt-1");
        assert_eq!(job.user_id.as_deref(), Some("user-1"));
    }

    let envelopes = publisher.on_topic(topic::NOTIFICATION);
    assert!(envelopes[0].not_before.is_none());
    let delay = envelopes[1].delay_remaining(envelopes[1].enqueued_at).unwrap();
    assert_eq!(delay, Duration::from_secs(60));
    assert_eq!(envelopes[0].key, envelopes[1].key);
}

#[tokio::test]
async fn test_automations_evaluated_oldest_first() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(fixtures::automation("newer", "signup", 10).with_action(fixtures::email_action("b")));
    store.add_automation(fixtures::automation("older", "signup", 100).with_action(fixtures::email_action("a")));

    worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();

    let order: Vec<String> = notification_jobs(&publisher)
        .into_iter()
        .map(|j| j.automation_id)
        .collect();
    assert_eq!(order, vec!["older", "newer"]);
}

#[tokio::test]
async fn test_anonymous_event_dedups_on_missing_user() {
    let (store, _publisher, worker) = setup();
    store.add_event(TrackedEvent::new("anon", "signup"));
    store.add_automation(fixtures::welcome_automation());

    worker.evaluate(&EvaluateEventJob::new("anon")).await.unwrap();
    let again = worker.evaluate(&EvaluateEventJob::new("anon")).await.unwrap();

    assert_eq!(again.duplicates, 1);
    let executions = store.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].user_id, None);
}

#[tokio::test]
async fn test_insert_failure_skips_only_that_automation() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(fixtures::automation("broken", "signup", 20).with_action(fixtures::email_action("x")));
    store.add_automation(fixtures::automation("healthy", "signup", 10).with_action(fixtures::email_action("y")));
    store.fail_inserts_for("broken");

    let summary = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();

    assert_eq!(summary.matched, 2);
    assert_eq!(summary.failed_automations, 1);
    assert_eq!(summary.executions_created, 1);
    let jobs = notification_jobs(&publisher);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].automation_id, "healthy");
}

#[tokio::test]
async fn test_publish_failure_discards_execution_for_redelivery() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(
        fixtures::automation("two-step", "signup", 10)
            .with_action(fixtures::email_action("one"))
            .with_action(fixtures::email_action("two")),
    );
    publisher.fail_after(1);

    let err = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap_err();
    assert!(err.is_retryable());

    let key = ExecutionKey::new("two-step", "evt-1", Some("user-1".into()));
    assert!(store.execution(&key).is_none(), "queued row should be discarded");

    // Redelivery re-creates the row and publishes both actions.
    publisher.clear();
    publisher.fail_after(usize::MAX);
    let summary = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();
    assert_eq!(summary.executions_created, 1);
    assert_eq!(summary.jobs_published, 2);
    assert!(store.execution(&key).is_some());
}

#[tokio::test]
async fn test_redelivery_resumes_fan_out_after_crash() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(fixtures::welcome_automation());

    // An earlier delivery inserted the row and stopped before publishing.
    let key = ExecutionKey::new("welcome", "evt-1", Some("user-1".into()));
    store.add_execution(AutomationExecution::queued(&key));

    let summary = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();

    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.fan_outs_resumed, 1);
    assert_eq!(summary.jobs_published, 1);
    let jobs = notification_jobs(&publisher);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].automation_id, "welcome");
    assert_eq!(store.executions().len(), 1);
    assert!(store.execution(&key).unwrap().actions_published);

    // Once published, later redeliveries are plain duplicates.
    let again = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();
    assert_eq!(again.fan_outs_resumed, 0);
    assert_eq!(again.jobs_published, 0);
    assert_eq!(publisher.on_topic(topic::NOTIFICATION).len(), 1);
}

#[tokio::test]
async fn test_settled_execution_is_not_fanned_out_again() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(fixtures::welcome_automation());

    let key = ExecutionKey::new("welcome", "evt-1", Some("user-1".into()));
    let mut execution = AutomationExecution::queued(&key);
    execution.status = ExecutionStatus::Success;
    store.add_execution(execution);

    let summary = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();

    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.fan_outs_resumed, 0);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn test_failed_discard_still_recovers_on_redelivery() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.add_automation(fixtures::welcome_automation());
    publisher.fail_after(0);
    store.fail_discards();

    let err = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap_err();
    assert!(err.is_retryable());

    let key = ExecutionKey::new("welcome", "evt-1", Some("user-1".into()));
    let stuck = store.execution(&key).unwrap();
    assert_eq!(stuck.status, ExecutionStatus::Queued);
    assert!(!stuck.actions_published);

    publisher.fail_after(usize::MAX);
    let summary = worker.evaluate(&EvaluateEventJob::new("evt-1")).await.unwrap();

    assert_eq!(summary.executions_created, 0);
    assert_eq!(summary.fan_outs_resumed, 1);
    assert_eq!(notification_jobs(&publisher).len(), 1);
    assert!(store.execution(&key).unwrap().actions_published);
}
