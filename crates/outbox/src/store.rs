use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::OutboxError;
use crate::model::{DeadLetterEntry, OutboxEntry, OutboxStatus};

/// Storage for outbox rows (§4.9 steps 1-4). `select_pending` must return rows in
/// `created_at` order so retries do not starve older messages.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(&self, entry: OutboxEntry);
    async fn select_pending(&self, batch_size: usize, now: DateTime<Utc>) -> Vec<OutboxEntry>;
    async fn mark_published(&self, id: Uuid) -> Result<(), OutboxError>;
    async fn mark_retry(&self, id: Uuid, error: String, next_attempt_at: DateTime<Utc>) -> Result<(), OutboxError>;
    async fn take(&self, id: Uuid) -> Result<OutboxEntry, OutboxError>;
    async fn get(&self, id: Uuid) -> Option<OutboxEntry>;
    async fn count_pending(&self) -> usize;
}

struct OutboxState {
    entries: HashMap<Uuid, OutboxEntry>,
    pending_order: BTreeMap<(DateTime<Utc>, Uuid), ()>,
}

pub struct InMemoryOutboxStore {
    state: Mutex<OutboxState>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(OutboxState { entries: HashMap::new(), pending_order: BTreeMap::new() }) }
    }
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, entry: OutboxEntry) {
        let mut state = self.state.lock();
        state.pending_order.insert((entry.created_at, entry.id), ());
        state.entries.insert(entry.id, entry);
    }

    async fn select_pending(&self, batch_size: usize, now: DateTime<Utc>) -> Vec<OutboxEntry> {
        let state = self.state.lock();
        state
            .pending_order
            .keys()
            .filter_map(|(_, id)| state.entries.get(id))
            .filter(|e| e.status == OutboxStatus::Pending && e.next_attempt_at <= now)
            .take(batch_size)
            .cloned()
            .collect()
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), OutboxError> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(&id).ok_or(OutboxError::NotFound { id })?;
        entry.status = OutboxStatus::Published;
        let key = (entry.created_at, id);
        state.pending_order.remove(&key);
        Ok(())
    }

    async fn mark_retry(&self, id: Uuid, error: String, next_attempt_at: DateTime<Utc>) -> Result<(), OutboxError> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(&id).ok_or(OutboxError::NotFound { id })?;
        entry.attempts += 1;
        entry.last_error = Some(error);
        entry.next_attempt_at = next_attempt_at;
        Ok(())
    }

    async fn take(&self, id: Uuid) -> Result<OutboxEntry, OutboxError> {
        let mut state = self.state.lock();
        let entry = state.entries.remove(&id).ok_or(OutboxError::NotFound { id })?;
        state.pending_order.remove(&(entry.created_at, id));
        Ok(entry)
    }

    async fn get(&self, id: Uuid) -> Option<OutboxEntry> {
        self.state.lock().entries.get(&id).cloned()
    }

    async fn count_pending(&self) -> usize {
        self.state.lock().pending_order.len()
    }
}

/// Inspectable parking lot for poisoned outbox rows (§4.9 "Dead-letter"). `replay`
/// re-enqueues the original payload as `PENDING`; `discard` drops it permanently.
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn park(&self, entry: DeadLetterEntry);
    async fn list(&self, limit: usize) -> Vec<DeadLetterEntry>;
    async fn get(&self, id: Uuid) -> Option<DeadLetterEntry>;
    async fn take_for_replay(&self, id: Uuid) -> Result<DeadLetterEntry, OutboxError>;
    async fn discard(&self, id: Uuid) -> Result<(), OutboxError>;
}

pub struct InMemoryDeadLetterQueue {
    entries: Mutex<HashMap<Uuid, DeadLetterEntry>>,
}

impl InMemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl Default for InMemoryDeadLetterQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetterQueue {
    async fn park(&self, entry: DeadLetterEntry) {
        self.entries.lock().insert(entry.id, entry);
    }

    async fn list(&self, limit: usize) -> Vec<DeadLetterEntry> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.dead_lettered_at);
        entries.truncate(limit);
        entries
    }

    async fn get(&self, id: Uuid) -> Option<DeadLetterEntry> {
        self.entries.lock().get(&id).cloned()
    }

    async fn take_for_replay(&self, id: Uuid) -> Result<DeadLetterEntry, OutboxError> {
        let mut entries = self.entries.lock();
        let entry = entries.get(&id).ok_or(OutboxError::DeadLetterNotFound { id })?;
        if !entry.replayable {
            return Err(OutboxError::NotReplayable { id });
        }
        Ok(entries.remove(&id).unwrap())
    }

    async fn discard(&self, id: Uuid) -> Result<(), OutboxError> {
        let mut entries = self.entries.lock();
        entries.remove(&id).ok_or(OutboxError::DeadLetterNotFound { id })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_model::EventEnvelope;

    fn sample_event() -> EventEnvelope {
        EventEnvelope::builder("OrderPlaced", "order-1").payload(serde_json::json!({})).build()
    }

    #[tokio::test]
    async fn select_pending_respects_next_attempt_at() {
        let store = InMemoryOutboxStore::new();
        let mut entry = OutboxEntry::new("orders_EVENTS", sample_event());
        entry.next_attempt_at = Utc::now() + chrono::Duration::seconds(60);
        store.enqueue(entry).await;

        assert!(store.select_pending(10, Utc::now()).await.is_empty());
    }

    #[tokio::test]
    async fn mark_published_removes_from_pending_order() {
        let store = InMemoryOutboxStore::new();
        let entry = OutboxEntry::new("orders_EVENTS", sample_event());
        let id = entry.id;
        store.enqueue(entry).await;

        store.mark_published(id).await.unwrap();
        assert!(store.select_pending(10, Utc::now()).await.is_empty());
        assert_eq!(store.get(id).await.unwrap().status, OutboxStatus::Published);
    }

    #[tokio::test]
    async fn dead_letter_replay_requires_replayable_flag() {
        let dlq = InMemoryDeadLetterQueue::new();
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            outbox_id: Uuid::new_v4(),
            destination: "orders_EVENTS".to_string(),
            event: sample_event(),
            attempts: 5,
            last_error: "boom".to_string(),
            dead_lettered_at: Utc::now(),
            replayable: false,
        };
        let id = entry.id;
        dlq.park(entry).await;

        let err = dlq.take_for_replay(id).await.unwrap_err();
        assert!(matches!(err, OutboxError::NotReplayable { .. }));
        assert!(dlq.get(id).await.is_some());
    }
}
