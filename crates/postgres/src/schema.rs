//! Table definitions.
//!
//! `tracked_events`, `automations` and `users` are owned by the ingestion
//! and admin services; the pipeline only reads them (and flips
//! `tracked_events.enriched`). They are created here so a fresh database is
//! usable end to end.

use crate::client::{db_error, PgStore};
use automation_core::Result;
use tracing::info;

pub const TRACKED_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS tracked_events (
    id          TEXT PRIMARY KEY,
    user_id     TEXT,
    event       TEXT NOT NULL,
    metadata    JSONB NOT NULL DEFAULT '{}'::jsonb,
    enriched    BOOLEAN NOT NULL DEFAULT FALSE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const AUTOMATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS automations (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    "trigger"   JSONB NOT NULL,
    filters     JSONB,
    actions     JSONB NOT NULL DEFAULT '[]'::jsonb,
    active      BOOLEAN NOT NULL DEFAULT TRUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

pub const AUTOMATIONS_ACTIVE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS automations_active_idx
    ON automations (created_at, id) WHERE active
"#;

pub const AUTOMATION_EXECUTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS automation_executions (
    id             BIGSERIAL PRIMARY KEY,
    automation_id  TEXT NOT NULL,
    user_id        TEXT,
    event_id       TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'queued'
                   CHECK (status IN ('queued', 'success', 'failed')),
    error          TEXT,
    actions_published BOOLEAN NOT NULL DEFAULT FALSE,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Upgrades tables created before fan-out tracking.
pub const AUTOMATION_EXECUTIONS_PUBLISHED: &str = r#"
ALTER TABLE automation_executions
    ADD COLUMN IF NOT EXISTS actions_published BOOLEAN NOT NULL DEFAULT FALSE
"#;

/// A missing user id takes part in uniqueness as the empty string.
pub const AUTOMATION_EXECUTIONS_KEY: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS automation_executions_key
    ON automation_executions (automation_id, event_id, (COALESCE(user_id, '')))
"#;

pub const USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id     TEXT PRIMARY KEY,
    email  TEXT
)
"#;

pub const CONSUMER_OFFSETS: &str = r#"
CREATE TABLE IF NOT EXISTS consumer_offsets (
    topic         TEXT NOT NULL,
    partition_id  INTEGER NOT NULL,
    next_offset   BIGINT NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (topic, partition_id)
)
"#;

/// Jobs waiting for their `not_before`, keyed by job and attempt.
pub const DELAYED_JOBS: &str = r#"
CREATE TABLE IF NOT EXISTS delayed_jobs (
    job_id      TEXT NOT NULL,
    attempt     INTEGER NOT NULL,
    topic       TEXT NOT NULL,
    envelope    JSONB NOT NULL,
    not_before  TIMESTAMPTZ NOT NULL,
    parked_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (job_id, attempt)
)
"#;

pub const DELAYED_JOBS_DUE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS delayed_jobs_due_idx ON delayed_jobs (not_before)
"#;

/// Statements in application order.
pub const ALL: &[(&str, &str)] = &[
    ("tracked_events", TRACKED_EVENTS),
    ("automations", AUTOMATIONS),
    ("automations_active_idx", AUTOMATIONS_ACTIVE_INDEX),
    ("automation_executions", AUTOMATION_EXECUTIONS),
    ("automation_executions.actions_published", AUTOMATION_EXECUTIONS_PUBLISHED),
    ("automation_executions_key", AUTOMATION_EXECUTIONS_KEY),
    ("users", USERS),
    ("consumer_offsets", CONSUMER_OFFSETS),
    ("delayed_jobs", DELAYED_JOBS),
    ("delayed_jobs_due_idx", DELAYED_JOBS_DUE_INDEX),
];

/// Creates every table and index that does not exist yet.
pub async fn init_schema(store: &PgStore) -> Result<()> {
    for (name, ddl) in ALL {
        sqlx::query(ddl)
            .execute(store.pool())
            .await
            .map_err(|e| db_error(&format!("Failed to create {}", name), e))?;
    }

    info!(statements = ALL.len(), "Postgres schema ready");
    Ok(())
}
