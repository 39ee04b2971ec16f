//! Worker scheduler for the pipeline stages.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::info;

use redpanda::topic;
use telemetry::{health, metrics};

use crate::consumer::QueueWorker;
use crate::delayed::{DelayedJobReleaser, ReleaserConfig};

/// A pipeline stage this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    Enrichment,
    RuleEngine,
    Notification,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 3] = [Self::Enrichment, Self::RuleEngine, Self::Notification];

    /// The queue this role consumes.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Enrichment => topic::ENRICHMENT,
            Self::RuleEngine => topic::RULE_ENGINE,
            Self::Notification => topic::NOTIFICATION,
        }
    }
}

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Upper bound for one handler run
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Pause after a fetch or settlement failure
    #[serde(default = "default_error_pause_ms")]
    pub error_pause_ms: u64,
    /// Metrics snapshot log interval
    #[serde(default = "default_metrics_log_interval_secs")]
    pub metrics_log_interval_secs: u64,
    /// Run the delayed job releaser in this process
    #[serde(default = "default_release_delayed")]
    pub release_delayed: bool,
    #[serde(default)]
    pub releaser: ReleaserConfig,
}

fn default_job_timeout_secs() -> u64 {
    30
}

fn default_error_pause_ms() -> u64 {
    1000
}

fn default_metrics_log_interval_secs() -> u64 {
    60
}

fn default_release_delayed() -> bool {
    true
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: default_job_timeout_secs(),
            error_pause_ms: default_error_pause_ms(),
            metrics_log_interval_secs: default_metrics_log_interval_secs(),
            release_delayed: default_release_delayed(),
            releaser: ReleaserConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs.max(1))
    }

    pub fn error_pause(&self) -> Duration {
        Duration::from_millis(self.error_pause_ms)
    }

    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_log_interval_secs.max(1))
    }
}

/// Runs the queue workers and periodic housekeeping.
pub struct WorkerScheduler {
    config: WorkerConfig,
    workers: Vec<Arc<QueueWorker>>,
    releaser: Option<Arc<DelayedJobReleaser>>,
}

impl WorkerScheduler {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            workers: Vec::new(),
            releaser: None,
        }
    }

    pub fn with_worker(mut self, worker: QueueWorker) -> Self {
        self.workers.push(Arc::new(worker));
        self
    }

    pub fn with_releaser(mut self, releaser: DelayedJobReleaser) -> Self {
        self.releaser = Some(Arc::new(releaser));
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Starts all workers.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        for worker in &self.workers {
            let worker = worker.clone();
            handles.push(tokio::spawn(async move {
                worker.run().await;
            }));
        }

        if let Some(releaser) = &self.releaser {
            let releaser = releaser.clone();
            handles.push(tokio::spawn(async move {
                releaser.run().await;
            }));
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_log().await;
        }));

        info!(
            workers = self.worker_count(),
            releaser = self.releaser.is_some(),
            "Background workers started"
        );
        handles
    }

    async fn run_metrics_log(&self) {
        let mut ticker = interval(self.config.metrics_log_interval());
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let snapshot = metrics().snapshot();
            let report = health().report();
            info!(
                status = ?report.status,
                jobs_received = snapshot.jobs_received,
                jobs_completed = snapshot.jobs_completed,
                jobs_failed = snapshot.jobs_failed,
                jobs_retried = snapshot.jobs_retried,
                jobs_dead_lettered = snapshot.jobs_dead_lettered,
                jobs_deferred = snapshot.jobs_deferred,
                jobs_released = snapshot.jobs_released,
                jobs_published = snapshot.jobs_published,
                events_enriched = snapshot.events_enriched,
                executions_created = snapshot.executions_created,
                notifications_sent = snapshot.notifications_sent,
                notifications_failed = snapshot.notifications_failed,
                job_latency_mean_ms = snapshot.job_latency_mean_ms,
                in_flight = snapshot.jobs_in_flight,
                "Pipeline metrics"
            );
        }
    }
}
