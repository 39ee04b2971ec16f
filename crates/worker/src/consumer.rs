//! Queue consumer loop.
//!
//! Drives a [`JobHandler`] over one topic partition:
//! 1. Fetch batch of jobs from Redpanda
//! 2. For each job: park it if `not_before` is still ahead, otherwise run the
//!    handler under a timeout
//! 3. Settle: ack, republish for retry, or dead-letter
//! 4. Commit offset (at-least-once delivery)

use async_trait::async_trait;
use automation_core::{Error, Result};
use chrono::{DateTime, Utc};
use redpanda::{dead_letter_topic, Consumer, DelayStore, JobEnvelope, JobPublisher, Settlement};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::{debug, error, info, warn};

/// A pipeline stage that processes jobs from one queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Queue topic the handler consumes.
    fn queue(&self) -> &'static str;

    /// Runs one job. Retryable errors lead to redelivery with backoff.
    async fn handle(&self, envelope: &JobEnvelope) -> Result<()>;
}

/// How a job ended after one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    /// Not due yet; parked for `wait` without running.
    Deferred { wait: Duration },
    /// Republished for attempt `attempt` after `delay`.
    Retried { attempt: u32, delay: Duration },
    DeadLettered { reason: String },
}

/// Runs single deliveries and settles them.
pub struct JobRunner {
    handler: Arc<dyn JobHandler>,
    publisher: Arc<dyn JobPublisher>,
    delays: Arc<dyn DelayStore>,
    job_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        handler: Arc<dyn JobHandler>,
        publisher: Arc<dyn JobPublisher>,
        delays: Arc<dyn DelayStore>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            handler,
            publisher,
            delays,
            job_timeout,
        }
    }

    pub fn handler(&self) -> &dyn JobHandler {
        self.handler.as_ref()
    }

    /// Processes one delivery.
    ///
    /// Returns `Err` only when the job could not be parked or its settlement
    /// could not be published; the caller must then not commit past it.
    pub async fn run(&self, envelope: JobEnvelope) -> Result<JobOutcome> {
        self.run_at(envelope, Utc::now()).await
    }

    /// [`run`](Self::run) with `now` as the current time.
    pub async fn run_at(&self, envelope: JobEnvelope, now: DateTime<Utc>) -> Result<JobOutcome> {
        if let Some(wait) = envelope.delay_remaining(now) {
            self.delays.park(self.handler.queue(), &envelope).await?;
            metrics().jobs_deferred.inc();
            debug!(
                worker = self.handler.name(),
                job_id = %envelope.id,
                attempt = envelope.attempt,
                wait_ms = wait.as_millis() as u64,
                "Job not due yet, parked"
            );
            return Ok(JobOutcome::Deferred { wait });
        }

        metrics().jobs_in_flight.inc();
        let start = Instant::now();
        let result = match tokio::time::timeout(self.job_timeout, self.handler.handle(&envelope)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.job_timeout.as_millis() as u64)),
        };
        metrics().jobs_in_flight.dec();
        metrics()
            .job_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        let failure = result.err();
        if failure.is_some() {
            metrics().jobs_failed.inc();
        }

        // The handler may have taken a while; backoff starts from its end.
        let settled_at = now + chrono::Duration::from_std(start.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        let job_id = envelope.id;
        let attempt = envelope.attempt;
        match envelope.settle(failure.as_ref(), settled_at) {
            Settlement::Ack => {
                metrics().jobs_completed.inc();
                debug!(worker = self.handler.name(), job_id = %job_id, "Job completed");
                Ok(JobOutcome::Completed)
            }
            Settlement::Retry(next) => {
                let delay = next.delay_remaining(settled_at).unwrap_or_default();
                let next_attempt = next.attempt;
                self.publisher
                    .publish_envelope(self.handler.queue(), &next)
                    .await?;
                metrics().jobs_retried.inc();
                warn!(
                    worker = self.handler.name(),
                    job_id = %job_id,
                    attempt = attempt,
                    next_attempt = next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = next.last_error.as_deref().unwrap_or_default(),
                    "Job failed, retry scheduled"
                );
                Ok(JobOutcome::Retried {
                    attempt: next_attempt,
                    delay,
                })
            }
            Settlement::DeadLetter(dead) => {
                let reason = dead.last_error.clone().unwrap_or_default();
                self.publisher
                    .publish_envelope(&dead_letter_topic(self.handler.queue()), &dead)
                    .await?;
                metrics().jobs_dead_lettered.inc();
                error!(
                    worker = self.handler.name(),
                    job_id = %job_id,
                    attempt = attempt,
                    error = %reason,
                    "Job dead-lettered"
                );
                Ok(JobOutcome::DeadLettered { reason })
            }
        }
    }
}

/// Consumer loop configuration.
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Pause after a fetch or settlement failure
    pub error_pause: Duration,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            error_pause: Duration::from_secs(1),
        }
    }
}

/// Worker that consumes one topic partition with a [`JobRunner`].
pub struct QueueWorker {
    consumer: Arc<Consumer>,
    runner: JobRunner,
    config: QueueWorkerConfig,
}

impl QueueWorker {
    pub fn new(consumer: Arc<Consumer>, runner: JobRunner) -> Self {
        Self {
            consumer,
            runner,
            config: QueueWorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: QueueWorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Main run loop: fetch, run, settle, commit.
    ///
    /// This runs indefinitely.
    pub async fn run(&self) {
        info!(
            worker = self.runner.handler().name(),
            topic = self.consumer.topic(),
            partition = self.consumer.partition(),
            "Queue worker starting"
        );

        loop {
            match self.process_batch().await {
                Ok(count) => {
                    if count > 0 {
                        debug!(worker = self.runner.handler().name(), count = count, "Processed batch");
                    }
                }
                Err(e) => {
                    error!(
                        worker = self.runner.handler().name(),
                        error = %e,
                        "Batch processing error"
                    );
                    tokio::time::sleep(self.config.error_pause).await;

                    // Resume from the last committed offset.
                    self.consumer.reset_connection().await;
                }
            }
        }
    }

    /// Processes a single batch. Commits after every settled job.
    async fn process_batch(&self) -> Result<usize> {
        let batch = self.consumer.fetch_batch().await?;

        let mut processed = 0;
        for delivery in batch.deliveries {
            let offset = delivery.offset;
            self.runner.run(delivery.envelope).await?;
            self.consumer.commit(offset + 1).await?;
            processed += 1;
        }

        // Move past trailing undecodable records.
        if let Some(next) = batch.next_offset {
            if next > self.consumer.current_offset() {
                self.consumer.commit(next).await?;
            }
        }

        Ok(processed)
    }
}
