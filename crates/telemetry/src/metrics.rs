//! Internal metrics collection.
//!
//! Counters are process-global atomics; the worker scheduler logs a
//! snapshot on a fixed interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturates at zero.
    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 30s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 30000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the automation pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Queue
    pub jobs_received: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub jobs_retried: Counter,
    pub jobs_dead_lettered: Counter,
    pub jobs_published: Counter,
    pub publish_errors: Counter,
    pub undecodable_records: Counter,
    pub jobs_deferred: Counter,
    pub jobs_released: Counter,

    // Enrichment
    pub events_enriched: Counter,

    // Rule engine
    pub automations_evaluated: Counter,
    pub automations_matched: Counter,
    pub executions_created: Counter,
    pub executions_duplicate: Counter,
    pub execution_insert_errors: Counter,

    // Notifications
    pub notifications_sent: Counter,
    pub notifications_failed: Counter,
    pub notifications_skipped: Counter,

    // Latency histograms
    pub job_latency_ms: Histogram,
    pub publish_latency_ms: Histogram,
    pub dispatch_latency_ms: Histogram,

    // Gauges
    pub jobs_in_flight: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub jobs_received: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_published: u64,
    pub publish_errors: u64,
    pub jobs_deferred: u64,
    pub jobs_released: u64,
    pub events_enriched: u64,
    pub automations_matched: u64,
    pub executions_created: u64,
    pub executions_duplicate: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub job_latency_mean_ms: f64,
    pub publish_latency_mean_ms: f64,
    pub dispatch_latency_mean_ms: f64,
    pub jobs_in_flight: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            jobs_received: self.jobs_received.get(),
            jobs_completed: self.jobs_completed.get(),
            jobs_failed: self.jobs_failed.get(),
            jobs_retried: self.jobs_retried.get(),
            jobs_dead_lettered: self.jobs_dead_lettered.get(),
            jobs_published: self.jobs_published.get(),
            publish_errors: self.publish_errors.get(),
            jobs_deferred: self.jobs_deferred.get(),
            jobs_released: self.jobs_released.get(),
            events_enriched: self.events_enriched.get(),
            automations_matched: self.automations_matched.get(),
            executions_created: self.executions_created.get(),
            executions_duplicate: self.executions_duplicate.get(),
            notifications_sent: self.notifications_sent.get(),
            notifications_failed: self.notifications_failed.get(),
            job_latency_mean_ms: self.job_latency_ms.mean(),
            publish_latency_mean_ms: self.publish_latency_ms.mean(),
            dispatch_latency_mean_ms: self.dispatch_latency_ms.mean(),
            jobs_in_flight: self.jobs_in_flight.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
