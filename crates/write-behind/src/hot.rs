use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::metrics::WriteBehindMetrics;

/// Bounded per-partition LRU hot tier (§4.10 "Eviction"). A value falling out of the
/// cache here does not lose data: the coalescing batcher's own pending buffer is the
/// authoritative staging area until a flush durably lands the write, so reads fall
/// through to it before ever reaching the durable tier.
pub struct HotTier<V: Clone + Send + Sync + 'static> {
    partitions: Vec<Mutex<LruCache<String, V>>>,
    metrics: Arc<WriteBehindMetrics>,
}

impl<V: Clone + Send + Sync + 'static> HotTier<V> {
    pub fn new(partition_count: usize, capacity_per_partition: usize, metrics: Arc<WriteBehindMetrics>) -> Self {
        let capacity = NonZeroUsize::new(capacity_per_partition).unwrap_or(NonZeroUsize::new(1).unwrap());
        let partitions = (0..partition_count.max(1)).map(|_| Mutex::new(LruCache::new(capacity))).collect();
        Self { partitions, metrics }
    }

    pub fn get(&self, partition: usize, key: &str) -> Option<V> {
        self.partitions[partition].lock().get(key).cloned()
    }

    pub fn put(&self, partition: usize, key: String, value: V) {
        let mut cache = self.partitions[partition].lock();
        // `push` also returns the prior value when `key` already exists; only count a
        // different evicted key as a real capacity eviction.
        if let Some((evicted_key, _)) = cache.push(key.clone(), value) {
            if evicted_key != key {
                self.metrics.record_eviction();
            }
        }
    }

    pub fn len(&self, partition: usize) -> usize {
        self.partitions[partition].lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_past_capacity_increments_metric() {
        let metrics = Arc::new(WriteBehindMetrics::new());
        let tier: HotTier<String> = HotTier::new(1, 2, metrics.clone());

        tier.put(0, "a".to_string(), "1".to_string());
        tier.put(0, "b".to_string(), "2".to_string());
        tier.put(0, "c".to_string(), "3".to_string());

        assert_eq!(tier.len(0), 2);
        assert_eq!(metrics.snapshot().evictions, 1);
        assert!(tier.get(0, "a").is_none());
        assert_eq!(tier.get(0, "c"), Some("3".to_string()));
    }
}
