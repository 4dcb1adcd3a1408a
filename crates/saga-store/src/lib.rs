//! Durable tracking of saga instances: status lattice, step history, and the
//! indexed queries the orchestrator and timeout scheduler need (Component D).

mod durable;
mod error;
mod model;
mod store;

pub use durable::{DurableSagaRow, DurableTier, NoOpDurableTier};
pub use error::SagaStoreError;
pub use model::{SagaInstance, SagaStatus, StepRecord, StepStatus};
pub use store::{InMemorySagaStore, SagaStore};
