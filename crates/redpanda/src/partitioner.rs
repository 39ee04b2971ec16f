//! Partition routing for jobs.

use std::hash::{Hash, Hasher};

/// Computes a partition for `key` in `0..num_partitions`.
///
/// `DefaultHasher::new()` is unkeyed, so every process running the same
/// build routes a key identically.
pub fn partition_hash(key: &str, num_partitions: i32) -> i32 {
    if num_partitions <= 1 {
        return 0;
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    (hash % num_partitions as u64) as i32
}
