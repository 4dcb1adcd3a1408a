mod error;
mod store;
mod write_behind;

pub use error::ViewStoreError;
pub use store::{InMemoryViewStore, UpdateOutcome, ViewStore};
pub use write_behind::WriteBehindViewStore;
