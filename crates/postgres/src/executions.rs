//! Execution records.

use crate::client::{db_error, PgStore};
use crate::traits::ExecutionStore;
use async_trait::async_trait;
use automation_core::{
    AutomationExecution, ExecutionKey, ExecutionStatus, InsertOutcome, Result,
    UpdateOutcome,
};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Matches one row through the unique key index.
const KEY_PREDICATE: &str =
    "automation_id = $1 AND event_id = $2 AND COALESCE(user_id, '') = COALESCE($3, '')";

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    automation_id: String,
    user_id: Option<String>,
    event_id: String,
    status: String,
    error: Option<String>,
    actions_published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PgStore {
    /// Loads the execution for `key`, if any.
    pub async fn get_execution(&self, key: &ExecutionKey) -> Result<Option<AutomationExecution>> {
        let sql = format!(
            "SELECT automation_id, user_id, event_id, status, error, actions_published, \
             created_at, updated_at \
             FROM automation_executions WHERE {KEY_PREDICATE}"
        );
        let row: Option<ExecutionRow> = sqlx::query_as(&sql)
            .bind(&key.automation_id)
            .bind(&key.event_id)
            .bind(key.user_id.as_deref())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| db_error("Failed to load execution", e))?;

        row.map(|row| -> Result<AutomationExecution> {
            let status: ExecutionStatus = row.status.parse()?;
            Ok(AutomationExecution {
                automation_id: row.automation_id,
                user_id: row.user_id,
                event_id: row.event_id,
                status,
                error: row.error,
                actions_published: row.actions_published,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn insert_if_absent(&self, key: &ExecutionKey) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO automation_executions (automation_id, user_id, event_id, status) \
             VALUES ($1, $3, $2, 'queued') \
             ON CONFLICT (automation_id, event_id, (COALESCE(user_id, ''))) DO NOTHING",
        )
        .bind(&key.automation_id)
        .bind(&key.event_id)
        .bind(key.user_id.as_deref())
        .execute(self.pool())
        .await
        .map_err(|e| db_error("Failed to insert execution", e))?;

        let outcome = if result.rows_affected() == 1 {
            InsertOutcome::Created
        } else {
            InsertOutcome::AlreadyExists
        };
        debug!(key = %key.partition_key(), outcome = ?outcome, "Execution insert");
        Ok(outcome)
    }

    async fn update_status(
        &self,
        key: &ExecutionKey,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<UpdateOutcome> {
        let sql = format!(
            "UPDATE automation_executions SET status = $4, error = $5, updated_at = now() \
             WHERE {KEY_PREDICATE}"
        );
        let result = sqlx::query(&sql)
            .bind(&key.automation_id)
            .bind(&key.event_id)
            .bind(key.user_id.as_deref())
            .bind(status.as_str())
            .bind(error)
            .execute(self.pool())
            .await
            .map_err(|e| db_error("Failed to update execution", e))?;

        Ok(if result.rows_affected() > 0 {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::NotFound
        })
    }

    async fn discard_queued(&self, key: &ExecutionKey) -> Result<bool> {
        let sql = format!("DELETE FROM automation_executions WHERE {KEY_PREDICATE} AND status = 'queued'");
        let result = sqlx::query(&sql)
            .bind(&key.automation_id)
            .bind(&key.event_id)
            .bind(key.user_id.as_deref())
            .execute(self.pool())
            .await
            .map_err(|e| db_error("Failed to discard execution", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_actions_published(&self, key: &ExecutionKey) -> Result<()> {
        let sql = format!(
            "UPDATE automation_executions SET actions_published = TRUE, updated_at = now() \
             WHERE {KEY_PREDICATE}"
        );
        sqlx::query(&sql)
            .bind(&key.automation_id)
            .bind(&key.event_id)
            .bind(key.user_id.as_deref())
            .execute(self.pool())
            .await
            .map_err(|e| db_error("Failed to mark execution published", e))?;
        Ok(())
    }

    async fn awaits_fan_out(&self, key: &ExecutionKey) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM automation_executions \
             WHERE {KEY_PREDICATE} AND status = 'queued' AND NOT actions_published)"
        );
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(&key.automation_id)
            .bind(&key.event_id)
            .bind(key.user_id.as_deref())
            .fetch_one(self.pool())
            .await
            .map_err(|e| db_error("Failed to check execution fan-out", e))
    }
}
