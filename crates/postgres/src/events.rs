//! Tracked event reads and the enrichment write.

use crate::client::{db_error, PgStore};
use crate::traits::EventStore;
use async_trait::async_trait;
use automation_core::{Result, TrackedEvent};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use tracing::{debug, warn};

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    user_id: Option<String>,
    event: String,
    metadata: Option<Json<Value>>,
    enriched: bool,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for TrackedEvent {
    fn from(row: EventRow) -> Self {
        let metadata = match row.metadata.map(|Json(v)| v) {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                warn!(event_id = %row.id, kind = ?other, "Ignoring non-object event metadata");
                Map::new()
            }
        };

        TrackedEvent {
            id: row.id,
            user_id: row.user_id,
            event_name: row.event,
            metadata,
            enriched: row.enriched,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn get_event(&self, id: &str) -> Result<Option<TrackedEvent>> {
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT id, user_id, event, metadata, enriched, created_at \
             FROM tracked_events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_error("Failed to load event", e))?;

        Ok(row.map(TrackedEvent::from))
    }

    async fn mark_enriched(&self, id: &str, annotations: &Map<String, Value>) -> Result<()> {
        // jsonb `||` keeps the right-hand value on key collisions.
        let result = sqlx::query(
            "UPDATE tracked_events \
             SET enriched = TRUE, \
                 metadata = $2::jsonb || COALESCE(metadata, '{}'::jsonb) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(Json(annotations))
        .execute(self.pool())
        .await
        .map_err(|e| db_error("Failed to mark event enriched", e))?;

        debug!(event_id = id, rows = result.rows_affected(), "Marked event enriched");
        Ok(())
    }
}
