//! Unified error types for the automation pipeline.
//!
//! Error codes:
//! - DB_001-002: Storage errors
//! - QUEUE_001-003: Broker errors
//! - MAIL_001-002: Mail dispatch errors
//! - ACTION_001: Malformed automation actions

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Query or statement failed
    QueryFailed,
    /// DB_002: Could not obtain a connection
    ConnectionFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QueryFailed => "DB_001",
            Self::ConnectionFailed => "DB_002",
        }
    }
}

/// Broker error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorCode {
    /// QUEUE_001: Publishing a job failed
    PublishFailed,
    /// QUEUE_002: Fetching jobs failed
    FetchFailed,
    /// QUEUE_003: Connecting to the broker failed
    ConnectionFailed,
}

impl QueueErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PublishFailed => "QUEUE_001",
            Self::FetchFailed => "QUEUE_002",
            Self::ConnectionFailed => "QUEUE_003",
        }
    }
}

/// Mail error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailErrorCode {
    /// MAIL_001: Provider rejected or did not answer
    DispatchFailed,
}

impl MailErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DispatchFailed => "MAIL_001",
        }
    }
}

/// How the queue should treat a job that failed with this error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Infrastructure hiccup; retry with backoff.
    Transient,
    /// Will never succeed; dead-letter without retrying.
    Permanent,
    /// Deployment problem; retrying will not help until config changes.
    Configuration,
}

/// Unified error type for the automation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error with code.
    #[error("[{code}] {message}")]
    Database { code: &'static str, message: String },

    /// Broker error with code.
    #[error("[{code}] {message}")]
    Queue { code: &'static str, message: String },

    /// Mail error with code.
    #[error("[{code}] {message}")]
    Mail { code: &'static str, message: String },

    #[error("[ACTION_001] invalid action: {0}")]
    InvalidAction(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("job timed out after {0}ms")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create a broker error.
    pub fn queue(code: QueueErrorCode, msg: impl Into<String>) -> Self {
        Self::Queue {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create a mail error.
    pub fn mail(code: MailErrorCode, msg: impl Into<String>) -> Self {
        Self::Mail {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn invalid_action(msg: impl Into<String>) -> Self {
        Self::InvalidAction(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify the error for retry decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Database { .. } | Self::Queue { .. } | Self::Timeout(_) | Self::Internal(_) => {
                ErrorClass::Transient
            }
            Self::Mail { .. } => ErrorClass::Transient,
            Self::InvalidAction(_) | Self::Serialization(_) => ErrorClass::Permanent,
            Self::Config(_) => ErrorClass::Configuration,
        }
    }

    /// Whether the queue should retry a job that failed with this error.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Database { code, .. } => Some(code),
            Self::Queue { code, .. } => Some(code),
            Self::Mail { code, .. } => Some(code),
            Self::InvalidAction(_) => Some("ACTION_001"),
            _ => None,
        }
    }
}
