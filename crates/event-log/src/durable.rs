//! Durable tier for the event log's synchronous-append path (§4.10: "a separate,
//! synchronous append path if 'durable append' is configured").

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EventLogError;
use crate::record::EventRecord;

/// Durable row shape for one `(domain, key, sequence)` event, matching the
/// `event_store` table of §6.
#[derive(Debug, Clone)]
pub struct DurableEventRow {
    pub domain: String,
    pub key: String,
    pub sequence: u64,
    pub event_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl DurableEventRow {
    pub fn from_record(domain: &str, key: &str, record: &EventRecord) -> Self {
        Self {
            domain: domain.to_string(),
            key: key.to_string(),
            sequence: record.sequence,
            event_id: record.event.event_id,
            payload: serde_json::to_value(&record.event).unwrap_or_default(),
            created_at: record.stored_at,
        }
    }
}

/// Backing store for the event log, abstracted behind a trait so the hot-path append
/// can run against an in-memory fake in tests and a real relational store in
/// production, per the "no-op implementation of optional capabilities" redesign flag.
#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn append(&self, row: DurableEventRow) -> Result<(), EventLogError>;
    async fn load(&self, domain: &str, key: &str) -> Result<Vec<DurableEventRow>, EventLogError>;
}

/// No-op durable tier: used when the runtime's capability struct has no durable
/// append path configured (events only persist through the write-behind hot tier).
#[derive(Debug, Default, Clone)]
pub struct NoOpDurableTier;

#[async_trait]
impl DurableTier for NoOpDurableTier {
    async fn append(&self, _row: DurableEventRow) -> Result<(), EventLogError> {
        Ok(())
    }

    async fn load(&self, _domain: &str, _key: &str) -> Result<Vec<DurableEventRow>, EventLogError> {
        Ok(Vec::new())
    }
}
