//! Release of parked jobs.
//!
//! Queue workers park jobs that are not due yet (see [`JobRunner`]). The
//! releaser polls the [`DelayStore`] and puts due jobs back on their topic
//! with the delay cleared, so they run on the next fetch. A job is removed
//! only after it was re-published: a crash in between releases it twice.
//!
//! [`JobRunner`]: crate::consumer::JobRunner

use automation_core::Result;
use chrono::{DateTime, Utc};
use redpanda::{DelayStore, JobPublisher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tracing::{debug, error, info};

/// Releaser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaserConfig {
    /// Time between polls when nothing more is due
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Jobs released per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

impl Default for ReleaserConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl ReleaserConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// Moves due jobs from the delay store back onto their queues.
pub struct DelayedJobReleaser {
    delays: Arc<dyn DelayStore>,
    publisher: Arc<dyn JobPublisher>,
    config: ReleaserConfig,
}

impl DelayedJobReleaser {
    pub fn new(delays: Arc<dyn DelayStore>, publisher: Arc<dyn JobPublisher>) -> Self {
        Self {
            delays,
            publisher,
            config: ReleaserConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReleaserConfig) -> Self {
        self.config = config;
        self
    }

    /// Re-publishes up to one batch of jobs due at `now`.
    ///
    /// Returns how many were released.
    pub async fn release_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.delays.due(now, self.config.batch_size.max(1)).await?;

        let mut released = 0;
        for job in &due {
            let mut envelope = job.envelope.clone();
            envelope.not_before = None;

            self.publisher.publish_envelope(&job.topic, &envelope).await?;
            self.delays.remove(job).await?;
            released += 1;

            debug!(
                topic = %job.topic,
                job_id = %envelope.id,
                attempt = envelope.attempt,
                "Released parked job"
            );
        }

        metrics().jobs_released.inc_by(released as u64);
        Ok(released)
    }

    /// Poll loop. Runs indefinitely.
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "Delayed job releaser starting"
        );

        loop {
            match self.release_due(Utc::now()).await {
                // A full batch means more may be due right away.
                Ok(released) if released >= self.config.batch_size.max(1) => continue,
                Ok(_) => {}
                Err(e) => error!(error = %e, "Failed to release parked jobs"),
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}
