//! Parked jobs.

use crate::client::{db_error, PgStore};
use async_trait::async_trait;
use automation_core::Result;
use chrono::{DateTime, Utc};
use redpanda::{DelayStore, JobEnvelope, ParkedJob};
use sqlx::types::Json;

#[derive(sqlx::FromRow)]
struct ParkedRow {
    topic: String,
    envelope: Json<JobEnvelope>,
}

#[async_trait]
impl DelayStore for PgStore {
    async fn park(&self, topic: &str, envelope: &JobEnvelope) -> Result<()> {
        let not_before = envelope.not_before.unwrap_or_else(Utc::now);

        sqlx::query(
            "INSERT INTO delayed_jobs (job_id, attempt, topic, envelope, not_before) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (job_id, attempt) DO NOTHING",
        )
        .bind(envelope.id.to_string())
        .bind(envelope.attempt as i32)
        .bind(topic)
        .bind(Json(envelope.clone()))
        .bind(not_before)
        .execute(self.pool())
        .await
        .map_err(|e| db_error("Failed to park job", e))?;
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ParkedJob>> {
        let rows: Vec<ParkedRow> = sqlx::query_as(
            "SELECT topic, envelope FROM delayed_jobs \
             WHERE not_before <= $1 \
             ORDER BY not_before, job_id \
             LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("Failed to load due jobs", e))?;

        Ok(rows
            .into_iter()
            .map(|row| ParkedJob {
                topic: row.topic,
                envelope: row.envelope.0,
            })
            .collect())
    }

    async fn remove(&self, job: &ParkedJob) -> Result<()> {
        sqlx::query("DELETE FROM delayed_jobs WHERE job_id = $1 AND attempt = $2")
            .bind(job.envelope.id.to_string())
            .bind(job.envelope.attempt as i32)
            .execute(self.pool())
            .await
            .map_err(|e| db_error("Failed to remove parked job", e))?;
        Ok(())
    }
}
