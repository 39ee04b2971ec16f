//! Durable job queues on Redpanda for the automation pipeline.
//!
//! Jobs travel as JSON [`JobEnvelope`]s carrying their own retry state, so
//! backoff, delayed visibility and dead-lettering work on a plain
//! Kafka-compatible log.

pub mod client;
pub mod config;
pub mod consumer;
pub mod delayed;
pub mod health;
pub mod job;
pub mod partitioner;
pub mod producer;
pub mod topics;

pub use config::*;
pub use consumer::*;
pub use delayed::*;
pub use job::*;
pub use producer::*;
pub use topics::*;
