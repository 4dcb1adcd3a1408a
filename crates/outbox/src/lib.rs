//! Transactional outbox and dead-letter queue for must-deliver publication (Component H).

mod error;
mod model;
mod publisher;
mod store;

pub use error::OutboxError;
pub use model::{DeadLetterEntry, OutboxEntry, OutboxStatus};
pub use publisher::{OutboxConfig, OutboxPublisher};
pub use store::{DeadLetterQueue, InMemoryDeadLetterQueue, InMemoryOutboxStore, OutboxStore};
