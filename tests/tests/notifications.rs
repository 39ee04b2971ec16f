//! Notification worker tests.
//!
//! Recipient resolution, dispatch outcomes and the execution status
//! transitions they produce.

use automation_core::{
    AutomationExecution, ExecutionKey, ExecutionStatus, NotificationJob,
};
use integration_tests::{fixtures, mocks::MemoryStore, mocks::MockMailer};
use std::sync::Arc;
use worker::{DispatchError, NotificationOutcome, NotificationSettings, NotificationWorker};

fn key(user: Option<&str>) -> ExecutionKey {
    ExecutionKey::new("welcome", "evt-1", user.map(str::to_string))
}

fn setup(mailer: MockMailer) -> (Arc<MemoryStore>, Arc<MockMailer>, NotificationWorker) {
    let store = MemoryStore::new();
    let mailer = Arc::new(mailer);
    let worker = NotificationWorker::new(store.clone(), store.clone(), mailer.clone());
    (store, mailer, worker)
}

fn seeded(store: &MemoryStore, key: &ExecutionKey) {
    store.add_execution(AutomationExecution::queued(key));
}

#[tokio::test]
async fn test_successful_dispatch_marks_success() {
    let (store, mailer, worker) = setup(MockMailer::new());
    let key = key(Some("user-1"));
    seeded(&store, &key);
    store.add_user("user-1", Some("asha@example.com"));

    let job = NotificationJob::new(&key, fixtures::email_action("Welcome aboard"));
    let outcome = worker.process(&job).await.unwrap();

    assert_eq!(
        outcome,
        NotificationOutcome::Sent {
            to: "asha@example.com".into()
        }
    );
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Welcome aboard");

    let execution = store.execution(&key).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.error, None);
}

#[tokio::test]
async fn test_explicit_recipient_and_defaults() {
    let (store, mailer, worker) = setup(MockMailer::new());
    let key = key(None);
    seeded(&store, &key);

    let job = NotificationJob::new(&key, fixtures::email_to("ops@example.com"));
    worker.process(&job).await.unwrap();

    let sent = mailer.sent();
    assert_eq!(sent[0].to, "ops@example.com");
    assert_eq!(sent[0].subject, "You have a new notification");
    assert_eq!(sent[0].html, NotificationSettings::default().default_body);
    assert_eq!(store.execution(&key).unwrap().status, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_dispatch_failure_marks_failed() {
    let mailer = MockMailer::new();
    mailer.reject_with(DispatchError::Rejected {
        status: 401,
        body: "invalid api key".into(),
    });
    let (store, _mailer, worker) = setup(mailer);
    let key = key(Some("user-1"));
    seeded(&store, &key);
    store.add_user("user-1", Some("asha@example.com"));

    let outcome = worker
        .process(&NotificationJob::new(&key, fixtures::email_action("Hi")))
        .await
        .unwrap();

    assert!(matches!(outcome, NotificationOutcome::Failed { .. }));
    let execution = store.execution(&key).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error.unwrap().contains("invalid api key"));
}

#[tokio::test]
async fn test_unresolvable_recipient_marks_failed() {
    let (store, mailer, worker) = setup(MockMailer::new());

    // No explicit recipient, no user.
    let anonymous = key(None);
    seeded(&store, &anonymous);
    worker
        .process(&NotificationJob::new(&anonymous, fixtures::email_action("Hi")))
        .await
        .unwrap();

    // User without an address.
    let silent = ExecutionKey::new("welcome", "evt-2", Some("user-2".into()));
    seeded(&store, &silent);
    store.add_user("user-2", None);
    worker
        .process(&NotificationJob::new(&silent, fixtures::email_action("Hi")))
        .await
        .unwrap();

    for key in [anonymous, silent] {
        let execution = store.execution(&key).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution
            .error
            .unwrap()
            .starts_with("recipient resolution failed"));
    }
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_invalid_address_marks_failed() {
    let (store, mailer, worker) = setup(MockMailer::new());
    let key = key(None);
    seeded(&store, &key);

    worker
        .process(&NotificationJob::new(&key, fixtures::email_to("not-an-address")))
        .await
        .unwrap();

    let execution = store.execution(&key).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error.unwrap().contains("invalid email address"));
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_unconfigured_channel_marks_failed_by_default() {
    let (store, _mailer, worker) = setup(MockMailer::unconfigured());
    let key = key(None);
    seeded(&store, &key);

    let outcome = worker
        .process(&NotificationJob::new(&key, fixtures::email_to("a@example.com")))
        .await
        .unwrap();

    assert!(matches!(outcome, NotificationOutcome::Failed { .. }));
    let execution = store.execution(&key).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.error.as_deref(), Some("email channel not configured"));
}

#[tokio::test]
async fn test_unconfigured_channel_can_leave_execution_queued() {
    let (store, _mailer, worker) = setup(MockMailer::unconfigured());
    let worker = worker.with_settings(NotificationSettings {
        fail_unconfigured: false,
        ..NotificationSettings::default()
    });
    let key = key(None);
    seeded(&store, &key);

    let outcome = worker
        .process(&NotificationJob::new(&key, fixtures::email_to("a@example.com")))
        .await
        .unwrap();

    assert_eq!(outcome, NotificationOutcome::Unconfigured);
    assert_eq!(store.execution(&key).unwrap().status, ExecutionStatus::Queued);
}

#[tokio::test]
async fn test_non_email_actions_are_skipped() {
    let (store, mailer, worker) = setup(MockMailer::new());
    let key = key(Some("user-1"));
    seeded(&store, &key);

    let outcome = worker
        .process(&NotificationJob::new(&key, fixtures::sms_action("hello")))
        .await
        .unwrap();

    assert_eq!(outcome, NotificationOutcome::Skipped { action: "sms" });
    assert_eq!(store.execution(&key).unwrap().status, ExecutionStatus::Queued);
    assert_eq!(store.update_calls(), 0);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_missing_execution_row_is_tolerated() {
    let (store, mailer, worker) = setup(MockMailer::new());
    let key = key(None);

    let outcome = worker
        .process(&NotificationJob::new(&key, fixtures::email_to("a@example.com")))
        .await
        .unwrap();

    assert!(matches!(outcome, NotificationOutcome::Sent { .. }));
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(store.update_calls(), 1);
    assert!(store.executions().is_empty());
}
