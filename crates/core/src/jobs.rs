//! Job payloads carried between the pipeline stages.

use serde::{Deserialize, Serialize};

use crate::automation::Action;
use crate::execution::ExecutionKey;

/// Raw event ready for enrichment. A missing id makes the job a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichEventJob {
    #[serde(default, alias = "eventId")]
    pub event_id: Option<String>,
}

impl EnrichEventJob {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: Some(event_id.into()),
        }
    }

    /// The trimmed, non-empty event id.
    pub fn event_id(&self) -> Option<&str> {
        self.event_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Enriched event ready for rule evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateEventJob {
    #[serde(alias = "eventId")]
    pub event_id: String,
}

impl EvaluateEventJob {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
        }
    }
}

/// One action to dispatch for a matched automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub automation_id: String,
    pub user_id: Option<String>,
    pub event_id: String,
    pub action: Action,
}

impl NotificationJob {
    pub fn new(key: &ExecutionKey, action: Action) -> Self {
        Self {
            automation_id: key.automation_id.clone(),
            user_id: key.user_id.clone(),
            event_id: key.event_id.clone(),
            action,
        }
    }

    /// The execution this job reports into.
    pub fn execution_key(&self) -> ExecutionKey {
        ExecutionKey::new(&self.automation_id, &self.event_id, self.user_id.clone())
    }
}
