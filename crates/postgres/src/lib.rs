//! Postgres access layer for the automation pipeline.
//!
//! Every write the pipeline needs to be idempotent is a single statement:
//! update-by-id, insert-on-conflict-do-nothing, update-by-unique-key.

pub mod automations;
pub mod client;
pub mod config;
pub mod delayed;
pub mod events;
pub mod executions;
pub mod health;
pub mod offsets;
pub mod schema;
pub mod traits;
pub mod users;

pub use client::*;
pub use config::*;
pub use traits::*;
