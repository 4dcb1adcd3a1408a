use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{error, warn};

use crate::config::WriteBehindConfig;
use crate::dead_letter::WriteBehindDeadLetterSink;
use crate::durable::DurableTier;
use crate::metrics::WriteBehindMetrics;

/// Per-partition coalescing batcher (§4.10 "Writes"). Enqueued `(key, value)` pairs
/// are grouped by key, keeping the latest value; flush is triggered by batch size,
/// elapsed delay, or shutdown.
pub struct CoalescingBatcher<V: Clone + Send + Sync + 'static> {
    partition: usize,
    pending: Mutex<HashMap<String, V>>,
    config: WriteBehindConfig,
    durable: Arc<dyn DurableTier<V>>,
    dead_letters: Arc<dyn WriteBehindDeadLetterSink<V>>,
    metrics: Arc<WriteBehindMetrics>,
}

impl<V: Clone + Send + Sync + 'static> CoalescingBatcher<V> {
    pub fn new(
        partition: usize,
        config: WriteBehindConfig,
        durable: Arc<dyn DurableTier<V>>,
        dead_letters: Arc<dyn WriteBehindDeadLetterSink<V>>,
        metrics: Arc<WriteBehindMetrics>,
    ) -> Self {
        Self { partition, pending: Mutex::new(HashMap::new()), config, durable, dead_letters, metrics }
    }

    /// Last-writer-wins in enqueue order: a later call for the same key overwrites
    /// the earlier one within this batch.
    pub fn enqueue(&self, key: String, value: V) {
        let mut pending = self.pending.lock();
        pending.insert(key, value);
        self.metrics.queue_depth.store(pending.len() as u64, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn pending_get(&self, key: &str) -> Option<V> {
        self.pending.lock().get(key).cloned()
    }

    pub fn should_flush(&self) -> bool {
        self.pending.lock().len() >= self.config.batch_max_size
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt);
        let base = self.config.initial_backoff.saturating_mul(exp).min(self.config.max_backoff);
        let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 5).max(1));
        base + Duration::from_millis(jitter_ms)
    }

    /// Drains the current batch and upserts it durably, retrying with backoff up to
    /// `max_attempts` before routing the whole batch's keys to the dead-letter sink.
    pub async fn flush(&self) {
        let batch: Vec<(String, V)> = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return;
            }
            let drained = pending.drain().collect();
            self.metrics.queue_depth.store(0, std::sync::atomic::Ordering::Relaxed);
            drained
        };

        let started = Instant::now();
        let mut last_error = String::new();
        let mut attempt = 0;
        loop {
            match self.durable.upsert_batch(self.partition, batch.clone()).await {
                Ok(()) => {
                    self.metrics.record_flush(started.elapsed().as_micros() as u64, true);
                    return;
                }
                Err(err) => {
                    last_error = err.to_string();
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        break;
                    }
                    warn!(partition = self.partition, attempt, error = %last_error, "write-behind flush failed, retrying");
                    tokio::time::sleep(self.backoff_for(attempt)).await;
                }
            }
        }

        self.metrics.record_flush(started.elapsed().as_micros() as u64, false);
        error!(partition = self.partition, keys = batch.len(), error = %last_error, "write-behind flush exhausted retries");
        for (key, value) in batch {
            self.metrics.record_dead_letter();
            self.dead_letters.park(key, value, last_error.clone()).await;
        }
    }
}
