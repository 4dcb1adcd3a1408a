//! Shared event envelope, schema registry and failure-classification vocabulary used
//! across the fulfillment event-sourcing runtime crates.

pub mod envelope;
pub mod error;
pub mod schema;

pub use envelope::{EventEnvelope, EventEnvelopeBuilder, SagaMeta};
pub use error::{Classify, FailureClass};
pub use schema::{FieldType, Schema, SchemaError, SchemaRegistry};
