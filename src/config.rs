//! Coordinator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Save coordinator configuration
///
/// All timings are milliseconds so tests can shrink them without touching the
/// engine. Defaults mirror interactive-editor behavior: a 2.5 s quiet period,
/// three attempts with 1 s/2 s backoff, a 100 ms gap between writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Quiet period after the last edit before a debounced save fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum attempts per request, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Pause between consecutive requests in a drain pass
    #[serde(default = "default_inter_save_delay_ms")]
    pub inter_save_delay_ms: u64,

    /// Snapshot count that triggers eviction on the next sweep
    #[serde(default = "default_snapshot_high_water")]
    pub snapshot_high_water: usize,

    /// Snapshots retained after an eviction (most recently touched)
    #[serde(default = "default_snapshot_retain")]
    pub snapshot_retain: usize,

    /// Interval of the background memory sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_debounce_ms() -> u64 {
    2500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_inter_save_delay_ms() -> u64 {
    100
}

fn default_snapshot_high_water() -> usize {
    10
}

fn default_snapshot_retain() -> usize {
    5
}

fn default_sweep_interval_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    64
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            inter_save_delay_ms: default_inter_save_delay_ms(),
            snapshot_high_water: default_snapshot_high_water(),
            snapshot_retain: default_snapshot_retain(),
            sweep_interval_ms: default_sweep_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SaveConfig {
    /// Debounce quiet period as a Duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Backoff before retry attempt `attempt` (1-based; attempt 1 has none)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 2);
        Duration::from_millis(self.retry_base_delay_ms * 2u64.pow(attempt.saturating_sub(2)))
    }

    /// Gap between requests within a drain pass
    pub fn inter_save_delay(&self) -> Duration {
        Duration::from_millis(self.inter_save_delay_ms)
    }

    /// Sweep interval as a Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}
