//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the job worker, fixed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of executor slots; at most this many jobs run concurrently.
    pub executors: usize,
    /// Hard capacity of the job registry. Enqueues fail with `QueueFull`
    /// once this many records exist; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_jobs: Option<usize>,
    /// Default retry ceiling for jobs that don't specify one.
    pub default_max_attempts: u32,
    /// Default wall-clock timeout for a single attempt (seconds).
    pub default_timeout_secs: u64,
    /// Base delay for exponential retry backoff (milliseconds).
    pub retry_base_delay_ms: u64,
    /// How long terminal records stay visible before eviction (seconds).
    pub retention_secs: u64,
    /// How often the dispatcher sweeps for evictable records (seconds).
    pub sweep_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            executors: 4,
            max_jobs: None,
            default_max_attempts: 3,
            default_timeout_secs: 300,
            retry_base_delay_ms: 1000,
            retention_secs: 900,
            sweep_interval_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
