//! Automation execution records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle of one automation execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Queued,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(Error::internal(format!("unknown execution status '{other}'"))),
        }
    }
}

/// Natural key of an execution: (automation, event, user).
///
/// A `None` user compares equal to another `None` user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionKey {
    pub automation_id: String,
    pub event_id: String,
    pub user_id: Option<String>,
}

impl ExecutionKey {
    pub fn new(
        automation_id: impl Into<String>,
        event_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            automation_id: automation_id.into(),
            event_id: event_id.into(),
            user_id,
        }
    }

    /// Stable string used for queue partitioning.
    pub fn partition_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.automation_id,
            self.event_id,
            self.user_id.as_deref().unwrap_or("-")
        )
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.partition_key())
    }
}

/// One stored execution row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationExecution {
    pub automation_id: String,
    pub user_id: Option<String>,
    pub event_id: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    /// Set once every action job of the execution has been published.
    pub actions_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationExecution {
    /// A freshly queued execution for `key`.
    pub fn queued(key: &ExecutionKey) -> Self {
        let now = Utc::now();
        Self {
            automation_id: key.automation_id.clone(),
            user_id: key.user_id.clone(),
            event_id: key.event_id.clone(),
            status: ExecutionStatus::Queued,
            error: None,
            actions_published: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ExecutionKey {
        ExecutionKey::new(&self.automation_id, &self.event_id, self.user_id.clone())
    }

    /// Still queued but its action jobs never made it onto the queue.
    pub fn awaits_fan_out(&self) -> bool {
        self.status == ExecutionStatus::Queued && !self.actions_published
    }
}

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    AlreadyExists,
}

/// Outcome of an update by natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}
