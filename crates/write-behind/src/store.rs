use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::batcher::CoalescingBatcher;
use crate::config::WriteBehindConfig;
use crate::dead_letter::WriteBehindDeadLetterSink;
use crate::durable::DurableTier;
use crate::error::WriteBehindError;
use crate::hot::HotTier;
use crate::metrics::{WriteBehindMetrics, WriteBehindMetricsSnapshot};
use crate::partition::partition_of;

/// Read-through, write-behind keyed store (Component I): hot tier for (A)/(B)'s fast
/// path, coalescing batcher for durability, read-through hydration on miss.
pub struct WriteBehindStore<V: Clone + Send + Sync + 'static> {
    config: WriteBehindConfig,
    hot: Arc<HotTier<V>>,
    batchers: Vec<Arc<CoalescingBatcher<V>>>,
    durable: Arc<dyn DurableTier<V>>,
    metrics: Arc<WriteBehindMetrics>,
}

impl<V: Clone + Send + Sync + 'static> WriteBehindStore<V> {
    pub fn new(
        config: WriteBehindConfig,
        durable: Arc<dyn DurableTier<V>>,
        dead_letters: Arc<dyn WriteBehindDeadLetterSink<V>>,
    ) -> Self {
        let metrics = Arc::new(WriteBehindMetrics::new());
        let hot = Arc::new(HotTier::new(config.partition_count, config.hot_tier_capacity_per_partition, metrics.clone()));
        let batchers = (0..config.partition_count.max(1))
            .map(|p| {
                Arc::new(CoalescingBatcher::new(p, config.clone(), durable.clone(), dead_letters.clone(), metrics.clone()))
            })
            .collect();
        Self { config, hot, batchers, durable, metrics }
    }

    fn partition_for(&self, key: &str) -> usize {
        partition_of(key, self.config.partition_count)
    }

    /// Hot tier updated synchronously, then the write is enqueued to the owning
    /// partition's batcher (§4.10 "Writes"). A size-triggered flush runs inline so
    /// callers see backpressure rather than unbounded queue growth.
    pub async fn put(&self, key: &str, value: V) {
        let partition = self.partition_for(key);
        self.hot.put(partition, key.to_string(), value.clone());
        let batcher = &self.batchers[partition];
        batcher.enqueue(key.to_string(), value);
        if batcher.should_flush() {
            batcher.flush().await;
        }
    }

    /// Hot tier, then the batcher's in-flight buffer (covers keys evicted from the
    /// hot tier before their flush lands), then the durable tier with read-through
    /// hydration (§4.10 "Reads").
    pub async fn get(&self, key: &str) -> Result<Option<V>, WriteBehindError> {
        let partition = self.partition_for(key);
        if let Some(value) = self.hot.get(partition, key) {
            return Ok(Some(value));
        }
        if let Some(value) = self.batchers[partition].pending_get(key) {
            return Ok(Some(value));
        }
        match self.durable.get(key).await? {
            Some(value) => {
                self.hot.put(partition, key.to_string(), value.clone());
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn metrics(&self) -> WriteBehindMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Flushes every partition's batcher; used on shutdown to drain in-flight writes.
    pub async fn flush_all(&self) {
        for batcher in &self.batchers {
            batcher.flush().await;
        }
    }

    /// Spawns one delay-triggered flush loop per partition, each with its own
    /// cancellation derived from `shutdown`; cancelling flushes once more before exit.
    pub fn spawn_flush_loops(self: &Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        self.batchers
            .iter()
            .cloned()
            .map(|batcher| {
                let shutdown = shutdown.clone();
                let delay = self.config.batch_max_delay;
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(delay);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = shutdown.cancelled() => {
                                batcher.flush().await;
                                break;
                            }
                            _ = interval.tick() => {
                                batcher.flush().await;
                            }
                        }
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::NoOpDeadLetterSink;
    use crate::durable::NoOpDurableTier;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryDurable {
        rows: Mutex<std::collections::HashMap<String, String>>,
    }

    #[async_trait]
    impl DurableTier<String> for InMemoryDurable {
        async fn upsert_batch(&self, _partition: usize, entries: Vec<(String, String)>) -> Result<(), WriteBehindError> {
            let mut rows = self.rows.lock().unwrap();
            for (k, v) in entries {
                rows.insert(k, v);
            }
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>, WriteBehindError> {
            Ok(self.rows.lock().unwrap().get(key).cloned())
        }
    }

    #[tokio::test]
    async fn put_then_get_returns_value_from_hot_tier() {
        let store = WriteBehindStore::new(
            WriteBehindConfig::default(),
            Arc::new(NoOpDurableTier::<String>::new()),
            Arc::new(NoOpDeadLetterSink),
        );

        store.put("order-1", "placed".to_string()).await;
        assert_eq!(store.get("order-1").await.unwrap(), Some("placed".to_string()));
    }

    #[tokio::test]
    async fn get_falls_through_to_durable_tier_and_rehydrates_hot_tier() {
        let durable = Arc::new(InMemoryDurable::default());
        durable.rows.lock().unwrap().insert("order-2".to_string(), "shipped".to_string());
        let store = WriteBehindStore::new(WriteBehindConfig::default(), durable, Arc::new(NoOpDeadLetterSink));

        assert_eq!(store.get("order-2").await.unwrap(), Some("shipped".to_string()));
        assert_eq!(store.metrics().evictions, 0);
    }

    #[tokio::test]
    async fn get_on_absent_key_returns_none() {
        let store = WriteBehindStore::new(
            WriteBehindConfig::default(),
            Arc::new(NoOpDurableTier::<String>::new()),
            Arc::new(NoOpDeadLetterSink),
        );

        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn flush_all_drains_batchers_into_durable_tier() {
        let durable = Arc::new(InMemoryDurable::default());
        let store = WriteBehindStore::new(WriteBehindConfig::default(), durable.clone(), Arc::new(NoOpDeadLetterSink));

        store.put("order-3", "placed".to_string()).await;
        store.flush_all().await;

        assert_eq!(durable.rows.lock().unwrap().get("order-3"), Some(&"placed".to_string()));
    }
}
