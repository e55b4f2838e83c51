//! Terminal-record retention settings.

use serde::{Deserialize, Serialize};

/// Bound on how many terminal order records are kept in memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Terminal records beyond this count are purged oldest-first on each
    /// reconciliation tick. Non-terminal records are never purged.
    #[serde(default = "default_max_terminal_records")]
    pub max_terminal_records: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_terminal_records: default_max_terminal_records(),
        }
    }
}

const fn default_max_terminal_records() -> usize {
    1000
}
