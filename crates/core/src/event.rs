//! Tracked event definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single user/visitor action ingested from the outside world.
///
/// Rows are created by the ingestion path; the pipeline only flips
/// `enriched` and merges device annotations into `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Event name, e.g. "signup" or "page_view".
    #[serde(rename = "event")]
    pub event_name: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub enriched: bool,
    pub created_at: DateTime<Utc>,
}

impl TrackedEvent {
    /// Creates a not-yet-enriched event stamped with the current time.
    pub fn new(id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            event_name: event_name.into(),
            metadata: Map::new(),
            enriched: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The user agent recorded by the tracking pixel, if any.
    pub fn user_agent(&self) -> Option<&str> {
        self.metadata
            .get("user_agent")
            .and_then(Value::as_str)
            .filter(|ua| !ua.is_empty())
    }

    /// The event as a generic tree for filter path resolution.
    ///
    /// Top-level keys match the serialized form: `id`, `user_id`, `event`,
    /// `metadata`, `enriched`, `created_at`.
    pub fn to_tree(&self) -> Value {
        let mut root = Map::with_capacity(6);
        root.insert("id".into(), Value::String(self.id.clone()));
        root.insert(
            "user_id".into(),
            self.user_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        root.insert("event".into(), Value::String(self.event_name.clone()));
        root.insert("metadata".into(), Value::Object(self.metadata.clone()));
        root.insert("enriched".into(), Value::Bool(self.enriched));
        root.insert(
            "created_at".into(),
            Value::String(self.created_at.to_rfc3339()),
        );
        Value::Object(root)
    }
}
