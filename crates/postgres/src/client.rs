//! Postgres connection pool wrapper.

use crate::config::PostgresConfig;
use automation_core::{error::DbErrorCode, Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Maps a sqlx error onto the pipeline's coded storage errors.
pub(crate) fn db_error(context: &str, e: sqlx::Error) -> Error {
    let code = match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DbErrorCode::ConnectionFailed
        }
        _ => DbErrorCode::QueryFailed,
    };
    Error::database(code, format!("{}: {}", context, e))
}

/// Shared handle to the relational store.
///
/// Implements every store trait; cheap to clone.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Opens a pool and verifies one connection.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                Error::database(
                    DbErrorCode::ConnectionFailed,
                    format!("Failed to connect to {}: {}", config.redacted_url(), e),
                )
            })?;

        info!(
            url = %config.redacted_url(),
            max_connections = config.max_connections,
            "Created Postgres pool"
        );

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the inner pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
