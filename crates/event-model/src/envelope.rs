//! The event envelope: the unit of persistence and transport for domain events.
//!
//! Separates infrastructure metadata (identity, ordering, saga coordination) from the
//! opaque, schema-tagged payload a producer submits. See [`crate::schema`] for how the
//! payload shape is validated at ingress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Saga coordination metadata carried by an event, kept as a distinct optional struct
/// rather than mandatory base-class fields so non-saga events pay no tax for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaMeta {
    pub saga_id: Uuid,
    pub saga_type: String,
    pub step_number: u32,
    pub is_compensating: bool,
}

/// A domain event as accepted by the event log: immutable once persisted, unique by
/// `event_id` within a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub event_version: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub key: String,
    pub correlation_id: Option<Uuid>,
    pub saga_meta: Option<SagaMeta>,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Start building an envelope for `event_type` keyed by `key`. `event_id` and
    /// `event_version` are filled in by [`EventEnvelopeBuilder::build`] if left unset,
    /// matching the ENRICH pipeline stage's defaulting contract.
    pub fn builder(event_type: impl Into<String>, key: impl Into<String>) -> EventEnvelopeBuilder {
        EventEnvelopeBuilder {
            event_id: None,
            event_type: event_type.into(),
            event_version: None,
            timestamp: None,
            source: None,
            key: key.into(),
            correlation_id: None,
            saga_meta: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn is_saga_event(&self) -> bool {
        self.saga_meta.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventEnvelopeBuilder {
    event_id: Option<Uuid>,
    event_type: String,
    event_version: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    source: Option<String>,
    key: String,
    correlation_id: Option<Uuid>,
    saga_meta: Option<SagaMeta>,
    payload: serde_json::Value,
}

impl EventEnvelopeBuilder {
    pub fn event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn event_version(mut self, version: impl Into<String>) -> Self {
        self.event_version = Some(version.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn saga_meta(mut self, saga_meta: SagaMeta) -> Self {
        self.saga_meta = Some(saga_meta);
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id.unwrap_or_else(Uuid::new_v4),
            event_type: self.event_type,
            event_version: self.event_version.unwrap_or_else(|| "1.0".to_string()),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            source: self.source.unwrap_or_else(|| "unknown".to_string()),
            key: self.key,
            correlation_id: self.correlation_id,
            saga_meta: self.saga_meta,
            payload: self.payload,
        }
    }
}
