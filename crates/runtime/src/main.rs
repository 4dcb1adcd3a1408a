//! Headless process entry point for the fulfillment event-sourcing runtime.
//!
//! Deliberately has no HTTP transport or routing: the runtime's surface is the
//! library crate, consumed by whatever front door a deployment chooses. This binary
//! exists to run the pipeline, saga machinery, timeout scheduler and outbox as a
//! standalone process for deployments that drive it purely from the event bus.

use std::sync::Arc;

use runtime::{RuntimeBuilder, RuntimeConfig};
use pipeline_engine::UpdaterRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = RuntimeConfig::from_env()?;
    config.validate()?;

    let runtime = RuntimeBuilder::new(config)
        .with_event_log()
        .with_view_store()
        .with_event_bus()
        .with_outbox()?
        .with_saga_store()
        .with_resilience()
        // A concrete deployment registers its own domains and updaters here,
        // replacing this placeholder with real `ViewUpdater` implementations.
        .with_domain("Order", UpdaterRegistry::new())?
        .build()?;
    let runtime = Arc::new(runtime);

    runtime.spawn_background_tasks();
    tracing::info!("fulfillment-runtime started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    match Arc::try_unwrap(runtime) {
        Ok(runtime) => runtime.shutdown().await,
        Err(_) => tracing::warn!("runtime still has outstanding references, skipping graceful drain"),
    }

    Ok(())
}
