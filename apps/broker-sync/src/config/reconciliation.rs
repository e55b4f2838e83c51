//! Reconciliation sweep settings.

use serde::{Deserialize, Serialize};

/// Configuration for the periodic reconciliation sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Whether the poller runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Base delay between per-order broker calls, in milliseconds. Jitter of
    /// up to half this value is added on top.
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,

    /// Timeout applied to each individual broker call, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            pace_ms: default_pace_ms(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_interval_secs() -> u64 {
    30
}

const fn default_pace_ms() -> u64 {
    200
}

const fn default_call_timeout_secs() -> u64 {
    5
}
