mod bus;
mod completion;
mod error;
mod gate;
mod metrics;
mod partition;
mod pipeline;
mod updater;

pub use bus::{EventBus, InMemoryEventBus};
pub use completion::{CompletionHandle, CompletionOutcome};
pub use error::PipelineError;
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use partition::partition_of;
pub use pipeline::{OutboxSink, Pipeline, PipelineConfig, PublishMode};
pub use updater::{UpdaterRegistry, ViewUpdater};
