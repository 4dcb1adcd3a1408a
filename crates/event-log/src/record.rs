use chrono::{DateTime, Utc};
use event_model::EventEnvelope;

/// One stored entry: `(domain, key, sequence_number) -> event`. Never mutated once
/// appended; removed only by a retention policy, which is out of core scope.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub sequence: u64,
    pub event: EventEnvelope,
    pub stored_at: DateTime<Utc>,
}
