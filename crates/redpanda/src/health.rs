//! Redpanda health checks and topic provisioning.

use crate::client::connect;
use crate::config::RedpandaConfig;
use crate::topics::TopicConfig;
use automation_core::{error::QueueErrorCode, Error, Result};
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    match connect(config).await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

/// Creates the topics in `wanted` that do not exist yet.
///
/// Returns the names that were created.
pub async fn ensure_topics(config: &RedpandaConfig, wanted: &[TopicConfig]) -> Result<Vec<String>> {
    let client = connect(config).await?;

    let existing: HashSet<String> = client
        .list_topics()
        .await
        .map_err(|e| Error::queue(QueueErrorCode::ConnectionFailed, format!("Failed to list topics: {}", e)))?
        .into_iter()
        .map(|t| t.name)
        .collect();

    let missing: Vec<&TopicConfig> = wanted.iter().filter(|t| !existing.contains(&t.name)).collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let controller = client.controller_client().map_err(|e| {
        Error::queue(QueueErrorCode::ConnectionFailed, format!("Failed to get controller: {}", e))
    })?;

    let mut created = Vec::with_capacity(missing.len());
    for topic in missing {
        controller
            .create_topic(
                topic.name.clone(),
                topic.partitions,
                topic.replication_factor,
                config.request_timeout_ms,
            )
            .await
            .map_err(|e| {
                Error::queue(
                    QueueErrorCode::ConnectionFailed,
                    format!("Failed to create topic {}: {}", topic.name, e),
                )
            })?;

        info!(
            topic = %topic.name,
            partitions = topic.partitions,
            replication = topic.replication_factor,
            "Created topic"
        );
        created.push(topic.name.clone());
    }

    Ok(created)
}
