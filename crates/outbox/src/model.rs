//! Outbox row and dead-letter entry shapes (§4.9/§3.5/§3.6).

use chrono::{DateTime, Utc};
use event_model::EventEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Published,
    DeadLettered,
}

/// A message considered delivered iff its row has reached `PUBLISHED`. Insertion of
/// this row and the originating state change are performed atomically from the
/// caller's perspective; this crate only owns the row's lifecycle from here on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub destination: String,
    pub event: EventEnvelope,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    pub fn new(destination: impl Into<String>, event: EventEnvelope) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            destination: destination.into(),
            event,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: now,
            next_attempt_at: now,
            last_error: None,
        }
    }
}

/// A poisoned outbox row parked for inspection after `max_attempts` publish failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub outbox_id: Uuid,
    pub destination: String,
    pub event: EventEnvelope,
    pub attempts: u32,
    pub last_error: String,
    pub dead_lettered_at: DateTime<Utc>,
    pub replayable: bool,
}
