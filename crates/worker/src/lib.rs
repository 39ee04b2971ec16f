//! Background workers for the automation pipeline.
//!
//! - Enrichment (user agent annotation, forward to rule engine)
//! - Rule engine (trigger/filter matching, execution records, action fan-out)
//! - Notifications (email dispatch, execution status)
//! - Consumer loop (fetch, park or run, settle with retry/dead-letter, commit)
//! - Delayed job releaser (re-publishes parked jobs once due)
//! - Scheduler (task startup, metrics logging)

pub mod consumer;
pub mod delayed;
pub mod enrichment;
pub mod mailer;
pub mod notifications;
pub mod rule_engine;
pub mod scheduler;

pub use consumer::*;
pub use delayed::{DelayedJobReleaser, ReleaserConfig};
pub use enrichment::{EnrichOutcome, EnrichmentWorker, EventAnnotator};
pub use mailer::*;
pub use notifications::{NotificationOutcome, NotificationSettings, NotificationWorker};
pub use rule_engine::{EvaluationSummary, RuleEngineWorker};
pub use scheduler::*;
