//! Store interfaces consumed by the workers.

use async_trait::async_trait;
use automation_core::{
    Automation, ExecutionKey, ExecutionStatus, InsertOutcome, Result, TrackedEvent,
    UpdateOutcome,
};
use serde_json::{Map, Value};

/// Tracked events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_event(&self, id: &str) -> Result<Option<TrackedEvent>>;

    /// Sets the enrichment flag and merges `annotations` into metadata.
    ///
    /// Keys already present in metadata win. Re-running on an enriched or
    /// missing row is not an error.
    async fn mark_enriched(&self, id: &str, annotations: &Map<String, Value>) -> Result<()>;
}

/// Automation rules.
#[async_trait]
pub trait AutomationStore: Send + Sync {
    /// Active automations, oldest first.
    async fn list_active_automations(&self) -> Result<Vec<Automation>>;
}

/// Execution records keyed by (automation, event, user).
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a queued execution unless one exists for `key`.
    async fn insert_if_absent(&self, key: &ExecutionKey) -> Result<InsertOutcome>;

    /// Sets status and error; a missing row is reported, not an error.
    async fn update_status(
        &self,
        key: &ExecutionKey,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<UpdateOutcome>;

    /// Deletes the row if it is still queued. Returns whether a row went away.
    async fn discard_queued(&self, key: &ExecutionKey) -> Result<bool>;

    /// Records that every action job for `key` was published.
    async fn mark_actions_published(&self, key: &ExecutionKey) -> Result<()>;

    /// Whether the row for `key` is queued with its action jobs unpublished,
    /// e.g. after a crash between insert and publish.
    async fn awaits_fan_out(&self, key: &ExecutionKey) -> Result<bool>;
}

/// User contact lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_email_address(&self, user_id: &str) -> Result<Option<String>>;
}
