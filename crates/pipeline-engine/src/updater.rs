use std::sync::Arc;

use event_model::EventEnvelope;
use view_store::UpdateOutcome;

/// A materialized view updater (§4.4): a key extractor plus a pure reducer. Declared
/// view dependencies are read-only and must tolerate missing/cold-start state.
pub trait ViewUpdater: Send + Sync {
    /// The view this updater maintains.
    fn view(&self) -> &str;

    /// The event types this updater reacts to; any other `event_type` leaves the view
    /// unchanged (§4.4 "handles unknown event_type by returning unchanged_sentinel").
    fn handles(&self, event_type: &str) -> bool;

    /// Derive the view key for `event`.
    fn key_for(&self, event: &EventEnvelope) -> String;

    /// Other views this updater reads while reducing, declared up front so `rebuild_views`
    /// can order dependent rebuilds topologically.
    fn depends_on(&self) -> &[&str] {
        &[]
    }

    /// Pure function of `(event, current)` producing the view's next state. Must be
    /// idempotent with respect to the event sequence.
    fn reduce(&self, event: &EventEnvelope, current: Option<&serde_json::Value>) -> UpdateOutcome;
}

/// The set of updaters registered for a domain's pipeline.
#[derive(Default)]
pub struct UpdaterRegistry {
    updaters: Vec<Arc<dyn ViewUpdater>>,
}

impl UpdaterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, updater: Arc<dyn ViewUpdater>) -> &mut Self {
        self.updaters.push(updater);
        self
    }

    pub fn for_event_type(&self, event_type: &str) -> impl Iterator<Item = Arc<dyn ViewUpdater>> + '_ {
        self.updaters.iter().filter(move |u| u.handles(event_type)).cloned()
    }

    pub fn all(&self) -> impl Iterator<Item = Arc<dyn ViewUpdater>> + '_ {
        self.updaters.iter().cloned()
    }
}
