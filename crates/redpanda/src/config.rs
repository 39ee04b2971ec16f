//! Redpanda configuration.

use serde::{Deserialize, Serialize};

/// Where a consumer starts when no committed offset exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    /// Process everything still retained in the topic.
    #[default]
    Earliest,
    /// Only process jobs published after startup.
    Latest,
}

/// Consumer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Partitions this instance owns; instances must not overlap.
    #[serde(default = "default_owned_partitions")]
    pub partitions: Vec<i32>,
    /// Broker long-poll wait in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: i32,
    /// Upper bound on bytes per fetch
    #[serde(default = "default_max_bytes")]
    pub max_bytes: i32,
    #[serde(default)]
    pub start_offset: StartOffset,
}

fn default_owned_partitions() -> Vec<i32> {
    vec![0]
}

fn default_max_wait_ms() -> i32 {
    500
}

fn default_max_bytes() -> i32 {
    1024 * 1024
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            partitions: default_owned_partitions(),
            max_wait_ms: default_max_wait_ms(),
            max_bytes: default_max_bytes(),
            start_offset: StartOffset::default(),
        }
    }
}

/// Redpanda connection and queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// SASL username (Redpanda Cloud)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (Redpanda Cloud)
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Partitions per queue topic
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    /// Replication factor used when creating missing topics
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: i32,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

fn default_partitions() -> i32 {
    1
}

fn default_replication_factor() -> i16 {
    1
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_request_timeout_ms() -> i32 {
    30000
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            sasl_username: None,
            sasl_password: None,
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
            compression: default_compression(),
            request_timeout_ms: default_request_timeout_ms(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl RedpandaConfig {
    /// Returns the broker list as a comma-separated string.
    pub fn broker_string(&self) -> String {
        self.brokers.join(",")
    }

    /// Credentials, when both halves are configured.
    pub fn sasl_credentials(&self) -> Option<(&str, &str)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}
