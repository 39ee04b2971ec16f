//! Queue topic definitions.

/// Topic names for each pipeline stage.
pub mod topic {
    /// Raw tracked events waiting for enrichment.
    pub const ENRICHMENT: &str = "events.enrich";
    /// Enriched events waiting for rule evaluation.
    pub const RULE_ENGINE: &str = "automations.evaluate";
    /// Matched actions waiting for dispatch.
    pub const NOTIFICATION: &str = "automations.notify";

    /// All queue topics.
    pub const ALL: &[&str] = &[ENRICHMENT, RULE_ENGINE, NOTIFICATION];
}

/// Suffix of the topic holding jobs that exhausted their attempts.
pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Dead-letter topic for a queue.
pub fn dead_letter_topic(queue: &str) -> String {
    format!("{queue}{DEAD_LETTER_SUFFIX}")
}

/// Topic configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
}

impl TopicConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 1,
            replication_factor: 1,
        }
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_replication(mut self, factor: i16) -> Self {
        self.replication_factor = factor;
        self
    }
}

/// Every queue topic plus its dead-letter companion.
///
/// Dead-letter topics get a single partition; nothing consumes them
/// automatically.
pub fn default_topic_configs(partitions: i32, replication_factor: i16) -> Vec<TopicConfig> {
    topic::ALL
        .iter()
        .flat_map(|name| {
            [
                TopicConfig::new(*name)
                    .with_partitions(partitions)
                    .with_replication(replication_factor),
                TopicConfig::new(dead_letter_topic(name)).with_replication(replication_factor),
            ]
        })
        .collect()
}
