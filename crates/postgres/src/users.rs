//! User contact lookup.

use crate::client::{db_error, PgStore};
use crate::traits::UserDirectory;
use async_trait::async_trait;
use automation_core::Result;

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_email_address(&self, user_id: &str) -> Result<Option<String>> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await
                .map_err(|e| db_error("Failed to load user", e))?;

        Ok(email
            .flatten()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()))
    }
}
