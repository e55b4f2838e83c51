//! Fill dedup ledger.
//!
//! The broker delivers fills over both the push channel and poll sweeps, so
//! the same trade id can arrive more than once. A fill is recorded here only
//! once it has actually been applied to an order, which lets dropped fills
//! (unknown order, quantity overshoot) be replayed by a later sweep.

use std::collections::HashSet;
use std::sync::RwLock;

/// Set of trade ids that have been applied to order state.
#[derive(Debug, Default)]
pub struct FillLedger {
    seen: RwLock<HashSet<String>>,
}

impl FillLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade id. Returns `false` if it was already present.
    pub fn record(&self, trade_id: &str) -> bool {
        self.seen
            .write()
            .map(|mut seen| seen.insert(trade_id.to_string()))
            .unwrap_or(false)
    }

    /// Whether a trade id has already been applied.
    #[must_use]
    pub fn contains(&self, trade_id: &str) -> bool {
        self.seen
            .read()
            .map(|seen| seen.contains(trade_id))
            .unwrap_or(false)
    }

    /// Number of recorded trade ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.read().map(|seen| seen.len()).unwrap_or(0)
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
