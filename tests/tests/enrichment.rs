//! Enrichment worker tests.
//!
//! Exercises the worker against the in-memory store and queue: annotation
//! merge, idempotent re-delivery, and failure propagation for retries.

use automation_core::{EnrichEventJob, TrackedEvent};
use integration_tests::{fixtures, mocks::MemoryStore, mocks::MockPublisher};
use redpanda::topic;
use serde_json::json;
use std::sync::Arc;
use worker::{EnrichOutcome, EnrichmentWorker};

fn setup() -> (Arc<MemoryStore>, Arc<MockPublisher>, EnrichmentWorker) {
    let store = MemoryStore::new();
    let publisher = Arc::new(MockPublisher::new());
    let worker = EnrichmentWorker::new(store.clone(), publisher.clone());
    (store, publisher, worker)
}

#[tokio::test]
async fn test_enrichment_marks_event_and_forwards() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));

    let outcome = worker.process(&EnrichEventJob::new("evt-1")).await.unwrap();
    assert!(matches!(outcome, EnrichOutcome::Forwarded { event_found: true, .. }));

    let event = store.event("evt-1").unwrap();
    assert!(event.enriched);
    assert_eq!(event.metadata["browser"], "Chrome");
    assert_eq!(event.metadata["device_type"], "desktop");

    let forwarded = publisher.on_topic(topic::RULE_ENGINE);
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].payload, json!({ "event_id": "evt-1" }));
    assert_eq!(forwarded[0].key.as_deref(), Some("evt-1"));
    assert_eq!(forwarded[0].max_attempts, 5);
}

#[tokio::test]
async fn test_enrichment_is_idempotent() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    let job = EnrichEventJob::new("evt-1");

    worker.process(&job).await.unwrap();
    let after_first = store.event("evt-1").unwrap();
    worker.process(&job).await.unwrap();
    let after_second = store.event("evt-1").unwrap();

    assert!(after_second.enriched);
    assert_eq!(after_first.metadata, after_second.metadata);
    // At-least-once: both deliveries forward; the rule engine dedups.
    assert_eq!(publisher.on_topic(topic::RULE_ENGINE).len(), 2);
}

#[tokio::test]
async fn test_existing_metadata_is_not_overwritten() {
    let (store, _publisher, worker) = setup();
    store.add_event(
        TrackedEvent::new("evt-2", "page_view")
            .with_metadata("user_agent", fixtures::IPHONE_UA)
            .with_metadata("device_type", "tablet")
            .with_metadata("city", "Pune"),
    );

    worker.process(&EnrichEventJob::new("evt-2")).await.unwrap();

    let event = store.event("evt-2").unwrap();
    assert_eq!(event.metadata["device_type"], "tablet");
    assert_eq!(event.metadata["browser"], "Safari");
    assert_eq!(event.metadata["city"], "Pune");
}

#[tokio::test]
async fn test_missing_or_blank_event_id_is_noop() {
    let (_store, publisher, worker) = setup();

    let outcome = worker.process(&EnrichEventJob::default()).await.unwrap();
    assert_eq!(outcome, EnrichOutcome::Skipped);

    let blank = EnrichEventJob {
        event_id: Some("   ".into()),
    };
    assert_eq!(worker.process(&blank).await.unwrap(), EnrichOutcome::Skipped);

    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn test_unknown_event_is_still_forwarded() {
    let (_store, publisher, worker) = setup();

    let outcome = worker.process(&EnrichEventJob::new("ghost")).await.unwrap();

    assert_eq!(
        outcome,
        EnrichOutcome::Forwarded {
            event_found: false,
            annotations: 0
        }
    );
    assert_eq!(publisher.on_topic(topic::RULE_ENGINE).len(), 1);
}

#[tokio::test]
async fn test_storage_failure_fails_job() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    store.fail_event_reads(1);

    let err = worker.process(&EnrichEventJob::new("evt-1")).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(!store.event("evt-1").unwrap().enriched);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn test_publish_failure_fails_job() {
    let (store, publisher, worker) = setup();
    store.add_event(fixtures::signup_event("evt-1", "user-1"));
    publisher.set_should_fail(true);

    let err = worker.process(&EnrichEventJob::new("evt-1")).await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.error_code(), Some("QUEUE_001"));
}
