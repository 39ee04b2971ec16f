//! Parking for jobs whose `not_before` lies in the future.
//!
//! A consumer that meets a job that is not due hands it to a [`DelayStore`]
//! and commits past it, so one long delay never holds up the jobs behind it
//! on the same partition. A releaser later re-publishes due jobs.

use crate::job::JobEnvelope;
use async_trait::async_trait;
use automation_core::Result;
use chrono::{DateTime, Utc};

/// A job waiting for its visibility time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParkedJob {
    /// Topic the job goes back to once due
    pub topic: String,
    pub envelope: JobEnvelope,
}

impl ParkedJob {
    /// When the job becomes due. Jobs parked without a `not_before` are due
    /// immediately.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.envelope.not_before
    }
}

/// Durable storage for parked jobs.
#[async_trait]
pub trait DelayStore: Send + Sync {
    /// Holds `envelope` for `topic`. Parking the same job and attempt twice
    /// keeps a single copy.
    async fn park(&self, topic: &str, envelope: &JobEnvelope) -> Result<()>;

    /// Up to `limit` parked jobs due at `now`, earliest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ParkedJob>>;

    /// Forgets a job after it was re-published.
    async fn remove(&self, job: &ParkedJob) -> Result<()>;
}
