//! Redpanda consumer for one queue partition.
//!
//! Uses rskafka with manual offset management for at-least-once delivery:
//! the next offset is persisted through an [`OffsetStore`] only after a
//! job has been settled, so a crash redelivers it.

use crate::client::connect;
use crate::config::{RedpandaConfig, StartOffset};
use crate::job::JobEnvelope;
use async_trait::async_trait;
use automation_core::{error::QueueErrorCode, Error, Result};
use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Durable storage for consumer positions.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// The next offset to read, if one was ever saved.
    async fn load_offset(&self, topic: &str, partition: i32) -> Result<Option<i64>>;

    /// Persists the next offset to read.
    async fn save_offset(&self, topic: &str, partition: i32, next_offset: i64) -> Result<()>;
}

/// A job read from the log together with its position.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub offset: i64,
    pub envelope: JobEnvelope,
}

/// A fetched batch.
#[derive(Debug, Default)]
pub struct FetchedBatch {
    pub deliveries: Vec<Delivery>,
    /// Offset after the last record read, including undecodable ones.
    pub next_offset: Option<i64>,
}

/// Consumer for a single topic partition.
pub struct Consumer {
    topic: String,
    partition: i32,
    config: RedpandaConfig,
    offsets: Arc<dyn OffsetStore>,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// Next offset to read; -1 until initialized
    next_offset: AtomicI64,
}

impl Consumer {
    /// Creates a new consumer. The connection is opened on first fetch.
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        config: RedpandaConfig,
        offsets: Arc<dyn OffsetStore>,
    ) -> Self {
        let topic = topic.into();
        info!(
            topic = %topic,
            partition = partition,
            "Creating Redpanda consumer"
        );

        Self {
            topic,
            partition,
            config,
            offsets,
            partition_client: RwLock::new(None),
            next_offset: AtomicI64::new(-1),
        }
    }

    /// Initializes the consumer connection and starting offset.
    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = connect(&self.config).await?;
        let partition_client = client
            .partition_client(self.topic.clone(), self.partition, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| {
                Error::queue(
                    QueueErrorCode::ConnectionFailed,
                    format!("Failed to get partition client: {}", e),
                )
            })?;
        let partition_client = Arc::new(partition_client);

        if self.next_offset.load(Ordering::SeqCst) < 0 {
            let offset = match self.offsets.load_offset(&self.topic, self.partition).await? {
                Some(saved) => saved,
                None => {
                    let at = match self.config.consumer.start_offset {
                        StartOffset::Earliest => OffsetAt::Earliest,
                        StartOffset::Latest => OffsetAt::Latest,
                    };
                    partition_client.get_offset(at).await.map_err(|e| {
                        Error::queue(
                            QueueErrorCode::FetchFailed,
                            format!("Failed to get offset: {}", e),
                        )
                    })?
                }
            };

            self.next_offset.store(offset, Ordering::SeqCst);
            info!(
                topic = %self.topic,
                partition = self.partition,
                offset = offset,
                "Consumer initialized at offset"
            );
        }

        *self.partition_client.write().await = Some(partition_client.clone());
        Ok(partition_client)
    }

    /// Fetches the next batch of jobs.
    ///
    /// Long-polls up to `max_wait_ms`. Records that are not valid envelopes
    /// are logged, counted and skipped.
    pub async fn fetch_batch(&self) -> Result<FetchedBatch> {
        let client = self.ensure_connected().await?;
        let current = self.next_offset.load(Ordering::SeqCst);
        let consumer = &self.config.consumer;

        let (records, high_watermark) = client
            .fetch_records(current, 1..consumer.max_bytes, consumer.max_wait_ms)
            .await
            .map_err(|e| {
                error!(topic = %self.topic, "Fetch error: {}", e);
                Error::queue(
                    QueueErrorCode::FetchFailed,
                    format!("Failed to fetch records: {}", e),
                )
            })?;

        if records.is_empty() {
            return Ok(FetchedBatch::default());
        }

        let mut deliveries = Vec::with_capacity(records.len());
        let mut max_offset = current;

        for record in records {
            max_offset = record.offset.max(max_offset);

            let Some(value) = record.record.value else {
                metrics().undecodable_records.inc();
                continue;
            };

            match serde_json::from_slice::<JobEnvelope>(&value) {
                Ok(envelope) => deliveries.push(Delivery {
                    offset: record.offset,
                    envelope,
                }),
                Err(e) => {
                    metrics().undecodable_records.inc();
                    warn!(
                        topic = %self.topic,
                        offset = record.offset,
                        error = %e,
                        "Skipping record that is not a job envelope"
                    );
                }
            }
        }

        metrics().jobs_received.inc_by(deliveries.len() as u64);
        debug!(
            topic = %self.topic,
            partition = self.partition,
            jobs = deliveries.len(),
            offset_start = current,
            offset_end = max_offset,
            lag = high_watermark - max_offset - 1,
            "Fetched batch"
        );

        Ok(FetchedBatch {
            deliveries,
            next_offset: Some(max_offset + 1),
        })
    }

    /// Commits the position after a settled job.
    pub async fn commit(&self, next_offset: i64) -> Result<()> {
        self.offsets
            .save_offset(&self.topic, self.partition, next_offset)
            .await?;
        let prev = self.next_offset.swap(next_offset, Ordering::SeqCst);

        debug!(
            topic = %self.topic,
            partition = self.partition,
            prev_offset = prev,
            new_offset = next_offset,
            "Committed offset"
        );
        Ok(())
    }

    /// Returns the next offset to be read.
    pub fn current_offset(&self) -> i64 {
        self.next_offset.load(Ordering::SeqCst)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Drops the connection and forgets the in-memory position, so the
    /// next fetch resumes from the last committed offset.
    pub async fn reset_connection(&self) {
        *self.partition_client.write().await = None;
        self.next_offset.store(-1, Ordering::SeqCst);
        info!(topic = %self.topic, partition = self.partition, "Consumer connection reset");
    }
}
