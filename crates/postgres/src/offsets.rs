//! Durable consumer positions.

use crate::client::{db_error, PgStore};
use async_trait::async_trait;
use automation_core::Result;
use redpanda::OffsetStore;

#[async_trait]
impl OffsetStore for PgStore {
    async fn load_offset(&self, topic: &str, partition: i32) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT next_offset FROM consumer_offsets WHERE topic = $1 AND partition_id = $2",
        )
        .bind(topic)
        .bind(partition)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_error("Failed to load consumer offset", e))
    }

    async fn save_offset(&self, topic: &str, partition: i32, next_offset: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO consumer_offsets (topic, partition_id, next_offset) VALUES ($1, $2, $3) \
             ON CONFLICT (topic, partition_id) \
             DO UPDATE SET next_offset = EXCLUDED.next_offset, updated_at = now()",
        )
        .bind(topic)
        .bind(partition)
        .bind(next_offset)
        .execute(self.pool())
        .await
        .map_err(|e| db_error("Failed to save consumer offset", e))?;
        Ok(())
    }
}
