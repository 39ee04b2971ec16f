//! Automation rule reads.

use crate::client::{db_error, PgStore};
use crate::traits::AutomationStore;
use async_trait::async_trait;
use automation_core::{Action, Automation, Result, Trigger};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(sqlx::FromRow)]
struct AutomationRow {
    id: String,
    name: String,
    trigger: Json<Value>,
    filters: Option<Json<Value>>,
    actions: Json<Value>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<AutomationRow> for Automation {
    type Error = String;

    fn try_from(row: AutomationRow) -> std::result::Result<Self, Self::Error> {
        let trigger: Trigger =
            serde_json::from_value(row.trigger.0).map_err(|e| format!("trigger: {e}"))?;

        let filters = match row.filters.map(|Json(v)| v) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map.into_iter().collect::<BTreeMap<_, _>>()),
            Some(_) => return Err("filters: expected an object".to_string()),
        };

        let actions: Vec<Action> = match row.actions.0 {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other).map_err(|e| format!("actions: {e}"))?,
        };

        Ok(Automation {
            id: row.id,
            name: row.name,
            trigger,
            filters,
            actions,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AutomationStore for PgStore {
    async fn list_active_automations(&self) -> Result<Vec<Automation>> {
        let rows: Vec<AutomationRow> = sqlx::query_as(
            r#"SELECT id, name, "trigger", filters, actions, active, created_at
               FROM automations WHERE active ORDER BY created_at, id"#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("Failed to list automations", e))?;

        let mut automations = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match Automation::try_from(row) {
                Ok(automation) => automations.push(automation),
                Err(reason) => {
                    warn!(automation_id = %id, reason = %reason, "Skipping malformed automation");
                }
            }
        }

        Ok(automations)
    }
}
