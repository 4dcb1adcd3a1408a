//! Composition root for the fulfillment event-sourcing runtime: wires the event
//! log, view store, pipeline, saga store/orchestrator, timeout scheduler, resilient
//! invoker and outbox together behind one [`Runtime`] handle, and carries the
//! process-wide configuration and capability resolution that decide which concrete
//! implementation backs each trait object.

mod builder;
mod capabilities;
mod config;
mod error;
mod runtime;

pub use builder::RuntimeBuilder;
pub use capabilities::{Capabilities, SagaMode};
pub use config::{CapabilitiesSettings, OutboxSettings, PipelineSettings, RuntimeConfig, WriteBehindSettings};
pub use error::RuntimeError;
pub use runtime::Runtime;
