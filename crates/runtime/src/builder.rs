use std::collections::HashMap;
use std::sync::Arc;

use event_log::EventLog;
use outbox::{DeadLetterQueue, InMemoryDeadLetterQueue, InMemoryOutboxStore, OutboxPublisher, OutboxStore};
use pipeline_engine::{EventBus, InMemoryEventBus, Pipeline, UpdaterRegistry};
use resilience::CircuitBreakerRegistry;
use saga_orchestrator::{ChoreographedCompensationTrigger, ChoreographyTable, OrchestratedCompensationTrigger, SagaDefinition, SagaOrchestrator};
use saga_store::{InMemorySagaStore, SagaStore};
use timeout_scheduler::{CompensationTrigger, TimeoutScheduler};
use view_store::{InMemoryViewStore, ViewStore, WriteBehindViewStore};
use write_behind::{NoOpDeadLetterSink, NoOpDurableTier, WriteBehindStore};

use crate::capabilities::{Capabilities, SagaMode};
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::runtime::Runtime;

/// Assembles a [`Runtime`] one component at a time (§9 explicit-builder redesign
/// flag: consuming `self`, `Result<Self, RuntimeError>` per step, matching the
/// teacher's `ComponentBuilder`). Components that depend on an earlier one check for
/// it with [`RuntimeError::MissingDependency`] rather than panicking.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    capabilities: Capabilities,
    event_log: Option<Arc<EventLog>>,
    view_store: Option<Arc<dyn ViewStore>>,
    event_bus: Option<Arc<dyn EventBus>>,
    outbox_store: Option<Arc<dyn OutboxStore>>,
    dead_letters: Option<Arc<dyn DeadLetterQueue>>,
    outbox: Option<Arc<OutboxPublisher>>,
    saga_store: Option<Arc<dyn SagaStore>>,
    saga_definitions: HashMap<String, Arc<SagaDefinition>>,
    choreography: Option<ChoreographyTable>,
    resilient_invoker_registry: Option<Arc<CircuitBreakerRegistry>>,
    pipelines: HashMap<String, Arc<Pipeline>>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        let capabilities = Capabilities::from(&config.capabilities);
        Self {
            config,
            capabilities,
            event_log: None,
            view_store: None,
            event_bus: None,
            outbox_store: None,
            dead_letters: None,
            outbox: None,
            saga_store: None,
            saga_definitions: HashMap::new(),
            choreography: None,
            resilient_invoker_registry: None,
            pipelines: HashMap::new(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Event log backed by `write_behind` when `capabilities.durable_persistence` is
    /// set, otherwise the in-memory-only default (recovery then relies entirely on
    /// replay, which is still correct, just slower to warm).
    pub fn with_event_log(mut self) -> Self {
        let log = if self.capabilities.durable_persistence {
            EventLog::with_durable_tier(Arc::new(event_log::NoOpDurableTier), true)
        } else {
            EventLog::new()
        };
        self.event_log = Some(Arc::new(log));
        self
    }

    /// View store, either the plain `DashMap`-backed in-memory store or one fronted
    /// by a [`WriteBehindStore`] for durability, per `capabilities.durable_persistence`.
    pub fn with_view_store(mut self) -> Self {
        let store: Arc<dyn ViewStore> = if self.capabilities.durable_persistence {
            let wb = WriteBehindStore::new(
                self.config.write_behind_config(),
                Arc::new(NoOpDurableTier::new()),
                Arc::new(NoOpDeadLetterSink),
            );
            Arc::new(WriteBehindViewStore::new(Arc::new(wb)))
        } else {
            Arc::new(InMemoryViewStore::new())
        };
        self.view_store = Some(store);
        self
    }

    /// In-process event bus. A deployment that needs a real broker swaps this for an
    /// adapter implementing `pipeline_engine::EventBus`; nothing downstream of it cares.
    pub fn with_event_bus(mut self) -> Self {
        self.event_bus = Some(Arc::new(InMemoryEventBus::new()));
        self
    }

    pub fn with_outbox(mut self) -> Result<Self, RuntimeError> {
        let bus = self.event_bus.clone().ok_or(RuntimeError::MissingDependency("event bus", "outbox"))?;
        let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
        let dead_letters: Arc<dyn DeadLetterQueue> = Arc::new(InMemoryDeadLetterQueue::new());
        let publisher = Arc::new(OutboxPublisher::new(store.clone(), dead_letters.clone(), bus, self.config.outbox_config()));
        self.outbox_store = Some(store);
        self.dead_letters = Some(dead_letters);
        self.outbox = Some(publisher);
        Ok(self)
    }

    pub fn with_saga_store(mut self) -> Self {
        self.saga_store = Some(Arc::new(InMemorySagaStore::new()));
        self
    }

    pub fn with_resilience(mut self) -> Self {
        self.resilient_invoker_registry = Some(Arc::new(CircuitBreakerRegistry::new()));
        self
    }

    /// Registers one saga's forward/compensation shape, consulted at build time to
    /// pick between a central orchestrator and a choreography table per
    /// `capabilities.saga_mode` (§4.6).
    pub fn with_saga_definition(
        mut self,
        saga_type: impl Into<String>,
        definition: Arc<SagaDefinition>,
        forward_type: impl Into<String>,
        compensating_type: impl Into<String>,
    ) -> Self {
        let saga_type = saga_type.into();
        let choreography = self.choreography.take().unwrap_or_else(ChoreographyTable::new);
        self.choreography = Some(choreography.register(saga_type.clone(), forward_type, compensating_type));
        self.saga_definitions.insert(saga_type, definition);
        self
    }

    /// Builds the saga orchestrator (if any definitions were registered) and wraps
    /// it, or the choreography table, behind the `CompensationTrigger` the timeout
    /// scheduler drives (§4.7).
    fn compensation_trigger(&self) -> Result<Arc<dyn CompensationTrigger>, RuntimeError> {
        let saga_store = self.saga_store.clone().ok_or(RuntimeError::MissingDependency("saga store", "timeout scheduler"))?;
        match self.capabilities.saga_mode {
            SagaMode::Orchestrated => {
                let orchestrator = Arc::new(SagaOrchestrator::new(saga_store));
                Ok(Arc::new(OrchestratedCompensationTrigger::new(orchestrator, self.saga_definitions.clone())))
            }
            SagaMode::Choreographed => {
                let bus = self.event_bus.clone().ok_or(RuntimeError::MissingDependency("event bus", "choreographed compensation"))?;
                let table = self.choreography.clone().unwrap_or_else(ChoreographyTable::new);
                Ok(Arc::new(ChoreographedCompensationTrigger::new(table, bus)))
            }
        }
    }

    /// Registers a domain's pipeline (Component C, one per domain per §4.3). Call
    /// once per domain after `with_event_log`/`with_view_store`/`with_event_bus`.
    pub fn with_domain(mut self, domain: impl Into<String>, registry: UpdaterRegistry) -> Result<Self, RuntimeError> {
        let domain = domain.into();
        let event_log = self.event_log.clone().ok_or(RuntimeError::MissingDependency("event log", "pipeline"))?;
        let view_store = self.view_store.clone().ok_or(RuntimeError::MissingDependency("view store", "pipeline"))?;
        let event_bus = self.event_bus.clone().ok_or(RuntimeError::MissingDependency("event bus", "pipeline"))?;
        let outbox_sink = self.outbox.clone().map(|o| o as Arc<dyn pipeline_engine::OutboxSink>);

        let pipeline = Pipeline::new(self.config.pipeline_config(), event_log, view_store, Arc::new(registry), event_bus, outbox_sink);
        self.pipelines.insert(domain, Arc::new(pipeline));
        Ok(self)
    }

    pub fn build(self) -> Result<Runtime, RuntimeError> {
        // Resolved before any field is moved out of `self`, since it borrows `event_bus`
        // and `saga_store` by reference.
        let trigger = self.compensation_trigger()?;

        let event_log = self.event_log.ok_or(RuntimeError::MissingComponent("event log"))?;
        let view_store = self.view_store.ok_or(RuntimeError::MissingComponent("view store"))?;
        let event_bus = self.event_bus.ok_or(RuntimeError::MissingComponent("event bus"))?;
        let outbox = self.outbox.ok_or(RuntimeError::MissingComponent("outbox"))?;
        let outbox_store = self.outbox_store.ok_or(RuntimeError::MissingComponent("outbox store"))?;
        let dead_letters = self.dead_letters.ok_or(RuntimeError::MissingComponent("dead-letter queue"))?;
        let saga_store = self.saga_store.ok_or(RuntimeError::MissingComponent("saga store"))?;
        let resilient_invoker_registry =
            self.resilient_invoker_registry.ok_or(RuntimeError::MissingComponent("resilience registry"))?;

        if self.pipelines.is_empty() {
            return Err(RuntimeError::MissingComponent("at least one domain pipeline"));
        }

        let timeout_scheduler = Arc::new(TimeoutScheduler::new(saga_store.clone(), trigger));

        Ok(Runtime {
            config: self.config,
            capabilities: self.capabilities,
            event_log,
            view_store,
            event_bus,
            outbox,
            outbox_store,
            dead_letters,
            saga_store,
            resilient_invoker_registry,
            timeout_scheduler,
            pipelines: self.pipelines,
            shutdown_token: tokio_util::sync::CancellationToken::new(),
            background_tasks: std::sync::Mutex::new(Vec::new()),
        })
    }
}
