use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// `hash(key) % partition_count`, consistent with the pipeline's `(domain, key)`
/// sharding scheme (§5) but over a single flat key since the hot tier serves both
/// the event log and the view store under one cache.
pub fn partition_of(key: &str, partition_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % partition_count.max(1)
}
