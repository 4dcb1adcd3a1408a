use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WriteBehindConfig {
    pub partition_count: usize,
    pub hot_tier_capacity_per_partition: usize,
    pub batch_max_size: usize,
    pub batch_max_delay: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            partition_count: 8,
            hot_tier_capacity_per_partition: 10_000,
            batch_max_size: 200,
            batch_max_delay: Duration::from_millis(200),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}
