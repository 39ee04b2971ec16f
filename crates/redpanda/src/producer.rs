//! Job publishing to Redpanda.

use crate::client::connect;
use crate::config::RedpandaConfig;
use crate::job::{JobEnvelope, JobId, JobOptions};
use crate::partitioner::partition_hash;
use async_trait::async_trait;
use automation_core::{error::QueueErrorCode, Error, Result};
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::record::Record;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Publishes job envelopes to a queue topic.
///
/// `Producer` is the broker-backed implementation; tests substitute an
/// in-memory one.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Writes an envelope to `topic` as-is (used for retries and dead letters).
    async fn publish_envelope(&self, topic: &str, envelope: &JobEnvelope) -> Result<()>;

    /// Wraps `payload` in a fresh envelope and publishes it to `queue`.
    async fn publish(&self, queue: &str, payload: Value, options: JobOptions) -> Result<JobId> {
        let envelope = JobEnvelope::new(queue, payload, &options);
        let start = std::time::Instant::now();

        match self.publish_envelope(queue, &envelope).await {
            Ok(()) => {
                metrics().jobs_published.inc();
                metrics()
                    .publish_latency_ms
                    .observe(start.elapsed().as_millis() as u64);
                debug!(queue = queue, job_id = %envelope.id, "Published job");
                Ok(envelope.id)
            }
            Err(e) => {
                metrics().publish_errors.inc();
                Err(e)
            }
        }
    }
}

/// Serializes `job` and publishes it with `options`.
pub async fn enqueue<T: Serialize + Sync + ?Sized>(
    publisher: &dyn JobPublisher,
    queue: &str,
    job: &T,
    options: JobOptions,
) -> Result<JobId> {
    let payload = serde_json::to_value(job)?;
    publisher.publish(queue, payload, options).await
}

/// Broker-backed job publisher.
pub struct Producer {
    config: RedpandaConfig,
    compression: Compression,
    /// Cached partition clients per topic:partition
    clients: RwLock<BTreeMap<String, Arc<PartitionClient>>>,
}

impl Producer {
    /// Creates a new producer. Connections are opened lazily.
    pub fn new(config: RedpandaConfig) -> Self {
        let compression = match config.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            "zstd" => Compression::Zstd,
            _ => Compression::NoCompression,
        };

        Self {
            config,
            compression,
            clients: RwLock::new(BTreeMap::new()),
        }
    }

    /// Gets or creates a partition client for a topic.
    async fn get_client(&self, topic: &str, partition: i32) -> Result<Arc<PartitionClient>> {
        let key = format!("{}:{}", topic, partition);

        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&key) {
                return Ok(client.clone());
            }
        }

        let client = connect(&self.config).await?;
        let partition_client = client
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| {
                Error::queue(
                    QueueErrorCode::ConnectionFailed,
                    format!("Failed to get partition client for {}: {}", key, e),
                )
            })?;

        let partition_client = Arc::new(partition_client);
        self.clients
            .write()
            .await
            .insert(key, partition_client.clone());

        Ok(partition_client)
    }

    /// Drops a cached client so the next publish reconnects.
    async fn evict(&self, topic: &str, partition: i32) {
        self.clients
            .write()
            .await
            .remove(&format!("{}:{}", topic, partition));
    }

    /// Partition count for a topic; dead-letter topics have one.
    fn partitions_for(&self, topic: &str) -> i32 {
        if topic.ends_with(crate::topics::DEAD_LETTER_SUFFIX) {
            1
        } else {
            self.config.partitions
        }
    }
}

/// Builds the broker record for an envelope.
pub fn envelope_record(envelope: &JobEnvelope) -> Result<Record> {
    let payload = serde_json::to_vec(envelope)?;

    let mut headers = BTreeMap::new();
    headers.insert("job-id".to_string(), envelope.id.to_string().into_bytes());
    headers.insert(
        "attempt".to_string(),
        envelope.attempt.to_string().into_bytes(),
    );

    Ok(Record {
        key: Some(envelope.partition_key().into_bytes()),
        value: Some(payload),
        headers,
        timestamp: Utc::now(),
    })
}

#[async_trait]
impl JobPublisher for Producer {
    async fn publish_envelope(&self, topic: &str, envelope: &JobEnvelope) -> Result<()> {
        let partition = partition_hash(&envelope.partition_key(), self.partitions_for(topic));
        let record = envelope_record(envelope)?;
        let client = self.get_client(topic, partition).await?;

        match client.produce(vec![record], self.compression).await {
            Ok(offsets) => {
                debug!(
                    topic = topic,
                    partition = partition,
                    offset = ?offsets.first(),
                    job_id = %envelope.id,
                    attempt = envelope.attempt,
                    "Produced job record"
                );
                Ok(())
            }
            Err(e) => {
                error!(topic = topic, job_id = %envelope.id, error = %e, "Failed to produce job");
                self.evict(topic, partition).await;
                Err(Error::queue(
                    QueueErrorCode::PublishFailed,
                    format!("Failed to produce to {}: {}", topic, e),
                ))
            }
        }
    }
}
