mod durable;
mod error;
mod log;
mod record;

pub use durable::{DurableEventRow, DurableTier, NoOpDurableTier};
pub use error::EventLogError;
pub use log::EventLog;
pub use record::EventRecord;
