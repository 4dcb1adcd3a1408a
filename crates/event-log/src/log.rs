use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use event_model::EventEnvelope;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::durable::{DurableEventRow, DurableTier, NoOpDurableTier};
use crate::error::EventLogError;
use crate::record::EventRecord;

type PartitionKey = (String, String);

/// Append-only, partitioned, per-key ordered event log (Component A of the
/// fulfillment runtime). Single-writer discipline per `(domain, key)` is achieved by
/// routing every write for that key through the same `tokio::sync::Mutex`, which also
/// serves as the sequence allocator — no gaps, strictly increasing.
pub struct EventLog {
    partitions: DashMap<PartitionKey, Arc<tokio::sync::Mutex<Vec<EventRecord>>>>,
    domain_keys: DashMap<String, DashSet<String>>,
    domain_event_ids: DashMap<String, DashSet<Uuid>>,
    durable: Arc<dyn DurableTier>,
    /// When true, PERSIST awaits the durable tier synchronously before returning the
    /// sequence number (§4.10 "a separate, synchronous append path"). When false,
    /// durability is delegated to write-behind and this field is unused here.
    synchronous_append: bool,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            domain_keys: DashMap::new(),
            domain_event_ids: DashMap::new(),
            durable: Arc::new(NoOpDurableTier),
            synchronous_append: false,
        }
    }

    pub fn with_durable_tier(durable: Arc<dyn DurableTier>, synchronous_append: bool) -> Self {
        Self {
            partitions: DashMap::new(),
            domain_keys: DashMap::new(),
            domain_event_ids: DashMap::new(),
            durable,
            synchronous_append,
        }
    }

    fn partition(&self, domain: &str, key: &str) -> Arc<tokio::sync::Mutex<Vec<EventRecord>>> {
        self.partitions
            .entry((domain.to_string(), key.to_string()))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Vec::new())))
            .clone()
    }

    /// Append `event` under `(domain, key)`, returning the assigned sequence number.
    /// Fails with [`EventLogError::DuplicateEvent`] if `event.event_id` was already
    /// stored in `domain`; callers treat that as an idempotent no-op (§7).
    pub async fn append(&self, domain: &str, key: &str, event: EventEnvelope) -> Result<u64, EventLogError> {
        let ids = self.domain_event_ids.entry(domain.to_string()).or_default();
        if !ids.insert(event.event_id) {
            return Err(EventLogError::DuplicateEvent {
                domain: domain.to_string(),
                event_id: event.event_id,
            });
        }
        drop(ids);

        self.domain_keys
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string());

        let partition = self.partition(domain, key);
        let mut guard = partition.lock().await;
        let sequence = guard.len() as u64 + 1;
        let record = EventRecord {
            sequence,
            event,
            stored_at: chrono::Utc::now(),
        };

        if self.synchronous_append {
            let row = DurableEventRow::from_record(domain, key, &record);
            if let Err(err) = self.durable.append(row).await {
                warn!(domain, key, sequence, "durable append failed, rolling back sequence allocation");
                self.domain_event_ids
                    .get(domain)
                    .map(|ids| ids.remove(&record.event.event_id));
                return Err(err);
            }
        }

        debug!(domain, key, sequence, event_id = %record.event.event_id, "event appended");
        guard.push(record);
        Ok(sequence)
    }

    pub async fn get_by_key(&self, domain: &str, key: &str) -> Vec<EventEnvelope> {
        let partition = self.partition(domain, key);
        let guard = partition.lock().await;
        guard.iter().map(|r| r.event.clone()).collect()
    }

    /// Visit every event in `domain`, in ascending sequence number within each key,
    /// exactly once. Restartable and idempotent for the visitor: it only ever sees
    /// `(key, sequence)` pairs it can deduplicate against.
    pub async fn replay_all<F>(&self, domain: &str, mut visitor: F)
    where
        F: FnMut(&str, &EventRecord),
    {
        let mut keys: Vec<String> = self
            .domain_keys
            .get(domain)
            .map(|set| set.iter().map(|k| k.clone()).collect())
            .unwrap_or_default();
        keys.sort();

        for key in keys {
            let partition = self.partition(domain, &key);
            let guard = partition.lock().await;
            for record in guard.iter() {
                visitor(&key, record);
            }
        }
    }

    pub async fn count(&self, domain: &str) -> u64 {
        let keys: Vec<String> = self
            .domain_keys
            .get(domain)
            .map(|set| set.iter().map(|k| k.clone()).collect())
            .unwrap_or_default();

        let mut total = 0u64;
        for key in keys {
            let partition = self.partition(domain, &key);
            total += partition.lock().await.len() as u64;
        }
        total
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(key: &str) -> EventEnvelope {
        EventEnvelope::builder("OrderCreated", key)
            .payload(serde_json::json!({"customerId": "c1"}))
            .build()
    }

    #[tokio::test]
    async fn sequence_numbers_are_gap_free_and_monotone() {
        let log = EventLog::new();
        for _ in 0..5 {
            log.append("Order", "o1", event("o1")).await.unwrap();
        }
        let events = log.get_by_key("Order", "o1").await;
        assert_eq!(events.len(), 5);
        assert_eq!(log.count("Order").await, 5);
    }

    #[tokio::test]
    async fn duplicate_event_id_is_rejected() {
        let log = EventLog::new();
        let e = event("o1");
        let id = e.event_id;
        log.append("Order", "o1", e).await.unwrap();

        let mut dup = event("o1");
        dup.event_id = id;
        let err = log.append("Order", "o1", dup).await.unwrap_err();
        assert!(matches!(err, EventLogError::DuplicateEvent { .. }));
    }

    #[tokio::test]
    async fn replay_all_visits_ascending_sequence_per_key() {
        let log = EventLog::new();
        log.append("Order", "o1", event("o1")).await.unwrap();
        log.append("Order", "o1", event("o1")).await.unwrap();
        log.append("Order", "o2", event("o2")).await.unwrap();

        let mut seen: Vec<(String, u64)> = Vec::new();
        log.replay_all("Order", |key, record| {
            seen.push((key.to_string(), record.sequence));
        })
        .await;

        assert_eq!(seen.len(), 3);
        let o1_sequences: Vec<u64> = seen.iter().filter(|(k, _)| k == "o1").map(|(_, s)| *s).collect();
        assert_eq!(o1_sequences, vec![1, 2]);
    }

    #[tokio::test]
    async fn disjoint_keys_do_not_interfere_with_sequence_allocation() {
        let log = EventLog::new();
        log.append("Order", "o1", event("o1")).await.unwrap();
        let seq = log.append("Order", "o2", event("o2")).await.unwrap();
        assert_eq!(seq, 1, "o2 starts its own sequence at 1");
    }
}
