//! Job envelopes and the retry/backoff policy.
//!
//! Every job carries its attempt counter and backoff settings, so any
//! consumer can decide how to settle it without shared state:
//! 1. success → ack
//! 2. retryable failure with attempts left → republish with a later `not_before`
//! 3. otherwise → dead-letter topic

use automation_core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Identifier assigned to a job at enqueue time.
pub type JobId = Uuid;

/// Reference retry budget for downstream jobs.
pub const DEFAULT_ATTEMPTS: u32 = 5;
/// Reference base delay for exponential backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Longest delay between two attempts.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// base, 2·base, 4·base, …
    Exponential,
    /// base every time
    Fixed,
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Backoff {
    pub fn exponential(base: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay_ms: base.as_millis() as u64,
            max_delay_ms: DEFAULT_BACKOFF_MAX.as_millis() as u64,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_delay_ms: delay.as_millis() as u64,
            max_delay_ms: DEFAULT_BACKOFF_MAX.as_millis() as u64,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max_delay_ms = max.as_millis() as u64;
        self
    }

    /// Delay before the attempt following `failed_attempt` (1-based).
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let ms = match self.kind {
            BackoffKind::Fixed => self.base_delay_ms,
            BackoffKind::Exponential => {
                let exp = failed_attempt.saturating_sub(1).min(32);
                self.base_delay_ms.saturating_mul(1u64 << exp)
            }
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_BACKOFF_BASE)
    }
}

/// Options applied when enqueueing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub backoff: Backoff,
    /// Initial visibility delay.
    pub delay: Duration,
    /// Partition key; defaults to the job id.
    pub key: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff: Backoff::default(),
            delay: Duration::ZERO,
            key: None,
        }
    }
}

impl JobOptions {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A job as stored in a queue topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: JobId,
    pub queue: String,
    pub payload: Value,
    /// 1-based number of the attempt this delivery represents.
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Do not run before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// What to do with a job after one handler run.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Ack,
    /// Republish to the same queue.
    Retry(JobEnvelope),
    /// Publish to the queue's dead-letter topic.
    DeadLetter(JobEnvelope),
}

impl JobEnvelope {
    /// Wraps a payload for its first attempt.
    pub fn new(queue: impl Into<String>, payload: Value, options: &JobOptions) -> Self {
        let now = Utc::now();
        let not_before = (!options.delay.is_zero())
            .then(|| chrono::Duration::from_std(options.delay).ok())
            .flatten()
            .map(|delay| now + delay);

        Self {
            id: Uuid::new_v4(),
            queue: queue.into(),
            payload,
            attempt: 1,
            max_attempts: options.attempts.max(1),
            backoff: options.backoff,
            not_before,
            enqueued_at: now,
            key: options.key.clone(),
            last_error: None,
        }
    }

    /// Decodes the payload. Failure is permanent: retrying cannot fix it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(Error::from)
    }

    /// The key used for partition routing.
    pub fn partition_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| self.id.to_string())
    }

    /// Time left before the job becomes visible, if any.
    pub fn delay_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.not_before
            .and_then(|at| (at - now).to_std().ok())
            .filter(|d| !d.is_zero())
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Decides the fate of the job after a run that ended with `failure`.
    pub fn settle(self, failure: Option<&Error>, now: DateTime<Utc>) -> Settlement {
        let Some(error) = failure else {
            return Settlement::Ack;
        };

        let mut next = self;
        next.last_error = Some(error.to_string());

        if error.is_retryable() && next.has_attempts_left() {
            let delay = next.backoff.delay_for(next.attempt);
            next.not_before = chrono::Duration::from_std(delay).ok().map(|d| now + d);
            next.attempt += 1;
            Settlement::Retry(next)
        } else {
            next.not_before = None;
            Settlement::DeadLetter(next)
        }
    }
}
