//! Hot in-memory tier with coalescing batched writes to a durable tier, serving (A)
//! and (B)'s keyed storage needs (Component I).

mod batcher;
mod config;
mod dead_letter;
mod durable;
mod error;
mod hot;
mod metrics;
mod partition;
mod store;

pub use batcher::CoalescingBatcher;
pub use config::WriteBehindConfig;
pub use dead_letter::{NoOpDeadLetterSink, WriteBehindDeadLetterSink};
pub use durable::{DurableTier, NoOpDurableTier};
pub use error::WriteBehindError;
pub use hot::HotTier;
pub use metrics::{WriteBehindMetrics, WriteBehindMetricsSnapshot};
pub use partition::partition_of;
pub use store::WriteBehindStore;
