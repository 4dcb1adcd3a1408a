use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use event_model::EventEnvelope;
use pipeline_engine::{EventBus, OutboxSink, PipelineError};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::model::{DeadLetterEntry, OutboxEntry};
use crate::store::{DeadLetterQueue, OutboxStore};

/// Scheduled-publisher tuning, shaped after the retry knobs a notification-style
/// delivery config exposes: fixed batch size, exponential backoff with jitter, and a
/// dead-letter cutoff.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub batch_size: usize,
    pub drain_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            drain_interval: Duration::from_millis(500),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl OutboxConfig {
    fn backoff_for(&self, attempts: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(attempts as i32);
        let base = self.initial_backoff.mul_f64(exp).min(self.max_backoff);
        let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 5).max(1));
        base + Duration::from_millis(jitter_ms)
    }
}

/// Drains `PENDING` outbox rows onto an [`EventBus`] on a schedule, and also serves as
/// the [`OutboxSink`] the pipeline enqueues onto when `publish_mode = Outbox`.
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    bus: Arc<dyn EventBus>,
    config: OutboxConfig,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        dead_letters: Arc<dyn DeadLetterQueue>,
        bus: Arc<dyn EventBus>,
        config: OutboxConfig,
    ) -> Self {
        Self { store, dead_letters, bus, config }
    }

    /// Runs one drain cycle (§4.9 steps 1-4). Returns `(published, dead_lettered)`.
    pub async fn drain_once(&self) -> (usize, usize) {
        let now = Utc::now();
        let batch = self.store.select_pending(self.config.batch_size, now).await;
        let mut published = 0;
        let mut dead_lettered = 0;

        for entry in batch {
            match self.bus.publish(&entry.destination, &entry.event).await {
                Ok(()) => {
                    if let Err(err) = self.store.mark_published(entry.id).await {
                        error!(outbox_id = %entry.id, error = %err, "failed to mark outbox row published");
                        continue;
                    }
                    published += 1;
                }
                Err(err) => {
                    let attempts = entry.attempts + 1;
                    if attempts >= self.config.max_attempts {
                        self.move_to_dead_letter(&entry, &err.to_string()).await;
                        dead_lettered += 1;
                    } else {
                        let next_attempt_at = now
                            + chrono::Duration::from_std(self.config.backoff_for(attempts))
                                .unwrap_or(chrono::Duration::seconds(1));
                        if let Err(store_err) =
                            self.store.mark_retry(entry.id, err.to_string(), next_attempt_at).await
                        {
                            error!(outbox_id = %entry.id, error = %store_err, "failed to record outbox retry");
                        }
                        warn!(outbox_id = %entry.id, attempts, error = %err, "outbox publish failed, will retry");
                    }
                }
            }
        }

        (published, dead_lettered)
    }

    async fn move_to_dead_letter(&self, entry: &OutboxEntry, error: &str) {
        if let Ok(taken) = self.store.take(entry.id).await {
            self.dead_letters
                .park(DeadLetterEntry {
                    id: uuid::Uuid::new_v4(),
                    outbox_id: taken.id,
                    destination: taken.destination,
                    event: taken.event,
                    attempts: taken.attempts + 1,
                    last_error: error.to_string(),
                    dead_lettered_at: Utc::now(),
                    replayable: true,
                })
                .await;
            warn!(outbox_id = %entry.id, "outbox row exhausted retries, moved to dead-letter queue");
        }
    }

    /// Re-enqueues a dead-lettered entry as `PENDING` (§4.9 "Dead-letter"); fails if
    /// the entry is absent or was parked with `replayable = false`.
    pub async fn replay(&self, id: uuid::Uuid) -> Result<(), crate::error::OutboxError> {
        let entry = self.dead_letters.take_for_replay(id).await?;
        self.store.enqueue(OutboxEntry::new(entry.destination, entry.event)).await;
        Ok(())
    }

    pub async fn discard(&self, id: uuid::Uuid) -> Result<(), crate::error::OutboxError> {
        self.dead_letters.discard(id).await
    }

    pub async fn list_dead_letters(&self, limit: usize) -> Vec<DeadLetterEntry> {
        self.dead_letters.list(limit).await
    }

    pub async fn get_dead_letter(&self, id: uuid::Uuid) -> Option<DeadLetterEntry> {
        self.dead_letters.get(id).await
    }

    /// Spawns the drain loop as a long-lived, cancellable task.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.drain_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(drain_interval = ?self.config.drain_interval, "outbox publisher started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("outbox publisher draining remaining rows before shutdown");
                        self.drain_once().await;
                        break;
                    }
                    _ = interval.tick() => {
                        let (published, dead_lettered) = self.drain_once().await;
                        if published > 0 || dead_lettered > 0 {
                            debug!(published, dead_lettered, "outbox drain cycle complete");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl OutboxSink for OutboxPublisher {
    async fn enqueue(&self, destination: &str, event: &EventEnvelope) -> Result<(), PipelineError> {
        self.store.enqueue(OutboxEntry::new(destination, event.clone())).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryDeadLetterQueue, InMemoryOutboxStore};
    use pipeline_engine::InMemoryEventBus;

    fn sample_event() -> EventEnvelope {
        EventEnvelope::builder("OrderPlaced", "order-1").payload(serde_json::json!({})).build()
    }

    #[tokio::test]
    async fn drain_publishes_pending_rows_to_the_bus() {
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let dlq: Arc<dyn DeadLetterQueue> = Arc::new(InMemoryDeadLetterQueue::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let publisher = OutboxPublisher::new(store.clone(), dlq, bus.clone(), OutboxConfig::default());

        store.enqueue(OutboxEntry::new("orders_EVENTS", sample_event())).await;
        let (published, dead_lettered) = publisher.drain_once().await;

        assert_eq!(published, 1);
        assert_eq!(dead_lettered, 0);
        assert_eq!(bus.messages("orders_EVENTS").await.len(), 1);
    }

    struct FailingBus;

    #[async_trait]
    impl EventBus for FailingBus {
        async fn publish(&self, _destination: &str, _event: &EventEnvelope) -> Result<(), PipelineError> {
            Err(PipelineError::Storage { reason: "boom".to_string() })
        }
    }

    #[tokio::test]
    async fn exhausted_retries_move_row_to_dead_letter_queue() {
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let dlq: Arc<dyn DeadLetterQueue> = Arc::new(InMemoryDeadLetterQueue::new());
        let bus: Arc<dyn EventBus> = Arc::new(FailingBus);
        let config = OutboxConfig { max_attempts: 1, ..OutboxConfig::default() };
        let publisher = OutboxPublisher::new(store.clone(), dlq.clone(), bus, config);

        store.enqueue(OutboxEntry::new("orders_EVENTS", sample_event())).await;
        let (published, dead_lettered) = publisher.drain_once().await;

        assert_eq!(published, 0);
        assert_eq!(dead_lettered, 1);
        assert_eq!(store.count_pending().await, 0);
        assert_eq!(dlq.list(10).await.len(), 1);
    }

    #[tokio::test]
    async fn replay_reinserts_dead_lettered_entry_as_pending() {
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let dlq: Arc<dyn DeadLetterQueue> = Arc::new(InMemoryDeadLetterQueue::new());
        let bus: Arc<dyn EventBus> = Arc::new(FailingBus);
        let config = OutboxConfig { max_attempts: 1, ..OutboxConfig::default() };
        let publisher = OutboxPublisher::new(store.clone(), dlq.clone(), bus, config);

        store.enqueue(OutboxEntry::new("orders_EVENTS", sample_event())).await;
        publisher.drain_once().await;
        let id = dlq.list(10).await[0].id;

        publisher.replay(id).await.unwrap();
        assert_eq!(store.count_pending().await, 1);
        assert!(dlq.get(id).await.is_none());
    }
}
