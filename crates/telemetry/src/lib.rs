//! Telemetry for the automation pipeline.
//!
//! Metrics live in-process and are periodically logged by the worker
//! scheduler; health is aggregated per external dependency.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
