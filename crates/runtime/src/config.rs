use std::env;
use std::time::Duration;

use anyhow::Result;
use pipeline_engine::{PipelineConfig, PublishMode};
use serde::{Deserialize, Serialize};

/// Runtime-wide configuration, one `*Config` struct per component (§9 "explicit
/// configuration structs... no runtime reflection"). Every field has an
/// environment-variable source with a hardcoded fallback, matching
/// `notification_service::config::Config::from_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub pipeline: PipelineSettings,
    pub outbox: OutboxSettings,
    pub write_behind: WriteBehindSettings,
    pub timeout_scheduler_tick_ms: u64,
    pub capabilities: CapabilitiesSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub partition_count: usize,
    pub ingress_capacity: usize,
    pub backpressure_wait_ms: u64,
    pub publish_via_outbox: bool,
    pub persist_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxSettings {
    pub batch_size: usize,
    pub drain_interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBehindSettings {
    pub partition_count: usize,
    pub hot_tier_capacity_per_partition: usize,
    pub batch_max_size: usize,
    pub batch_max_delay_ms: u64,
}

/// The capability struct (§9 "annotation-based conditional beans... replace with a
/// capability struct populated at startup from the environment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesSettings {
    pub durable_persistence: bool,
    pub choreographed_sagas: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            pipeline: PipelineSettings {
                partition_count: parse_env("PIPELINE_PARTITION_COUNT", 8),
                ingress_capacity: parse_env("PIPELINE_INGRESS_CAPACITY", 1024),
                backpressure_wait_ms: parse_env("PIPELINE_BACKPRESSURE_WAIT_MS", 50),
                publish_via_outbox: parse_env("PIPELINE_PUBLISH_VIA_OUTBOX", false),
                persist_max_attempts: parse_env("PIPELINE_PERSIST_MAX_ATTEMPTS", 3),
            },
            outbox: OutboxSettings {
                batch_size: parse_env("OUTBOX_BATCH_SIZE", 100),
                drain_interval_ms: parse_env("OUTBOX_DRAIN_INTERVAL_MS", 500),
                max_attempts: parse_env("OUTBOX_MAX_ATTEMPTS", 5),
            },
            write_behind: WriteBehindSettings {
                partition_count: parse_env("WRITE_BEHIND_PARTITION_COUNT", 8),
                hot_tier_capacity_per_partition: parse_env("WRITE_BEHIND_HOT_TIER_CAPACITY", 10_000),
                batch_max_size: parse_env("WRITE_BEHIND_BATCH_MAX_SIZE", 200),
                batch_max_delay_ms: parse_env("WRITE_BEHIND_BATCH_MAX_DELAY_MS", 200),
            },
            timeout_scheduler_tick_ms: parse_env("TIMEOUT_SCHEDULER_TICK_MS", 5_000),
            capabilities: CapabilitiesSettings {
                durable_persistence: parse_env("DURABLE_PERSISTENCE_ENABLED", false),
                choreographed_sagas: parse_env("CHOREOGRAPHED_SAGAS_ENABLED", false),
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.partition_count == 0 {
            return Err(anyhow::anyhow!("pipeline.partition_count must be greater than zero"));
        }
        if self.write_behind.partition_count == 0 {
            return Err(anyhow::anyhow!("write_behind.partition_count must be greater than zero"));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            partition_count: self.pipeline.partition_count,
            ingress_capacity: self.pipeline.ingress_capacity,
            backpressure_wait_ms: self.pipeline.backpressure_wait_ms,
            publish_mode: if self.pipeline.publish_via_outbox { PublishMode::Outbox } else { PublishMode::Direct },
            persist_max_attempts: self.pipeline.persist_max_attempts,
        }
    }

    pub fn outbox_config(&self) -> outbox::OutboxConfig {
        outbox::OutboxConfig {
            batch_size: self.outbox.batch_size,
            drain_interval: Duration::from_millis(self.outbox.drain_interval_ms),
            max_attempts: self.outbox.max_attempts,
            ..Default::default()
        }
    }

    pub fn write_behind_config(&self) -> write_behind::WriteBehindConfig {
        write_behind::WriteBehindConfig {
            partition_count: self.write_behind.partition_count,
            hot_tier_capacity_per_partition: self.write_behind.hot_tier_capacity_per_partition,
            batch_max_size: self.write_behind.batch_max_size,
            batch_max_delay: Duration::from_millis(self.write_behind.batch_max_delay_ms),
            ..Default::default()
        }
    }

    pub fn timeout_scheduler_tick(&self) -> Duration {
        Duration::from_millis(self.timeout_scheduler_tick_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = RuntimeConfig::from_env().unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.partition_count, 8);
    }
}
