//! Core types, rule matching, and errors for the marketing automation pipeline.

pub mod automation;
pub mod error;
pub mod event;
pub mod execution;
pub mod filter;
pub mod jobs;

pub use automation::*;
pub use error::{Error, ErrorClass, Result};
pub use event::*;
pub use execution::*;
pub use filter::{resolve_path, values_equal, Lookup};
pub use jobs::*;
