//! Order registry.
//!
//! Owns the authoritative mapping from local order id to [`OrderRecord`],
//! plus a remote-id index covering every broker id an order has acquired.
//! The locks guard only structural insert/lookup; transition logic runs
//! solely on the action queue's single consumer.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::OrderRecord;

/// Registry of all known orders, indexed by local and remote ids.
#[derive(Debug, Default)]
pub struct OrderRegistry {
    /// Records indexed by local order id.
    records: RwLock<HashMap<String, OrderRecord>>,
    /// Mapping from broker order id to local order id.
    remote_index: RwLock<HashMap<String, String>>,
}

impl OrderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record, indexing any remote ids it already carries.
    pub fn insert(&self, record: OrderRecord) {
        let local_id = record.local_id.clone();
        let remote_ids = record.remote_ids.clone();

        if let Ok(mut records) = self.records.write() {
            records.insert(local_id.clone(), record);
        }

        if !remote_ids.is_empty() {
            if let Ok(mut index) = self.remote_index.write() {
                for remote_id in remote_ids {
                    index.insert(remote_id, local_id.clone());
                }
            }
        }
    }

    /// Get a record by local id.
    #[must_use]
    pub fn get(&self, local_id: &str) -> Option<OrderRecord> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(local_id).cloned())
    }

    /// Get a record by any of its broker ids.
    #[must_use]
    pub fn get_by_remote_id(&self, remote_id: &str) -> Option<OrderRecord> {
        let local_id = self
            .remote_index
            .read()
            .ok()
            .and_then(|index| index.get(remote_id).cloned())?;

        self.get(&local_id)
    }

    /// Store an updated record, re-indexing any newly acquired remote ids.
    pub fn update(&self, record: OrderRecord) {
        let local_id = record.local_id.clone();
        let remote_ids = record.remote_ids.clone();

        if let Ok(mut records) = self.records.write() {
            records.insert(local_id.clone(), record);
        }

        if let Ok(mut index) = self.remote_index.write() {
            for remote_id in remote_ids {
                index.entry(remote_id).or_insert_with(|| local_id.clone());
            }
        }
    }

    /// All non-terminal records.
    #[must_use]
    pub fn active_orders(&self) -> Vec<OrderRecord> {
        let records = match self.records.read() {
            Ok(guard) => guard,
            Err(_) => return vec![],
        };

        records
            .values()
            .filter(|r| r.status.is_active())
            .cloned()
            .collect()
    }

    /// Total number of records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Purge oldest terminal records past the retention bound.
    ///
    /// Non-terminal records are never evicted. Returns the number of records
    /// removed.
    pub fn evict_terminal(&self, max_retained: usize) -> usize {
        let Ok(mut records) = self.records.write() else {
            return 0;
        };

        let mut terminal: Vec<(String, chrono::DateTime<chrono::Utc>)> = records
            .values()
            .filter(|r| r.status.is_terminal())
            .map(|r| (r.local_id.clone(), r.last_updated_at))
            .collect();

        if terminal.len() <= max_retained {
            return 0;
        }

        terminal.sort_by_key(|(_, updated)| *updated);
        let excess = terminal.len() - max_retained;

        let mut evicted_remote_ids = Vec::new();
        for (local_id, _) in terminal.into_iter().take(excess) {
            if let Some(record) = records.remove(&local_id) {
                evicted_remote_ids.extend(record.remote_ids);
            }
        }
        drop(records);

        if let Ok(mut index) = self.remote_index.write() {
            for remote_id in &evicted_remote_ids {
                index.remove(remote_id);
            }
        }

        tracing::debug!(evicted = excess, "Purged terminal order records");
        excess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderKind, OrderSide, OrderSpec, OrderStatus};
    use rust_decimal_macros::dec;

    fn make_record(local_id: &str, status: OrderStatus) -> OrderRecord {
        let mut record = OrderRecord::new(
            local_id.to_string(),
            OrderSpec {
                instrument: "BTC-PERPETUAL".to_string(),
                side: OrderSide::Buy,
                kind: OrderKind::Limit,
                quantity: dec!(10),
                limit_price: Some(dec!(50000)),
                stop_price: None,
            },
        );
        record.status = status;
        record
    }

    #[test]
    fn insert_and_get() {
        let registry = OrderRegistry::new();
        registry.insert(make_record("L-1", OrderStatus::New));

        let record = registry.get("L-1").unwrap();
        assert_eq!(record.local_id, "L-1");
        assert!(registry.get("L-2").is_none());
    }

    #[test]
    fn remote_index_follows_updates() {
        let registry = OrderRegistry::new();
        registry.insert(make_record("L-1", OrderStatus::New));
        assert!(registry.get_by_remote_id("R-1").is_none());

        let mut record = registry.get("L-1").unwrap();
        record.track_remote_id("R-1");
        registry.update(record);

        assert_eq!(registry.get_by_remote_id("R-1").unwrap().local_id, "L-1");

        // Second remote id (conditional execution order) resolves too.
        let mut record = registry.get("L-1").unwrap();
        record.track_remote_id("R-1-exec");
        registry.update(record);

        assert_eq!(
            registry.get_by_remote_id("R-1-exec").unwrap().local_id,
            "L-1"
        );
    }

    #[test]
    fn active_orders_excludes_terminal() {
        let registry = OrderRegistry::new();
        registry.insert(make_record("L-1", OrderStatus::Submitted));
        registry.insert(make_record("L-2", OrderStatus::Filled));
        registry.insert(make_record("L-3", OrderStatus::PartiallyFilled));
        registry.insert(make_record("L-4", OrderStatus::Canceled));

        let active = registry.active_orders();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|r| r.status.is_active()));
    }

    #[test]
    fn evict_terminal_keeps_non_terminal() {
        let registry = OrderRegistry::new();
        for i in 0..5 {
            let mut record = make_record(&format!("L-{i}"), OrderStatus::Filled);
            record.track_remote_id(&format!("R-{i}"));
            record.last_updated_at = chrono::Utc::now() + chrono::Duration::seconds(i);
            registry.insert(record);
        }
        registry.insert(make_record("L-open", OrderStatus::Submitted));

        let evicted = registry.evict_terminal(2);
        assert_eq!(evicted, 3);
        assert_eq!(registry.count(), 3); // 2 terminal + 1 open

        // Oldest terminal records went first and their index entries with them.
        assert!(registry.get("L-0").is_none());
        assert!(registry.get_by_remote_id("R-0").is_none());
        assert!(registry.get("L-4").is_some());
        assert!(registry.get("L-open").is_some());
    }

    #[test]
    fn evict_terminal_noop_under_bound() {
        let registry = OrderRegistry::new();
        registry.insert(make_record("L-1", OrderStatus::Filled));
        assert_eq!(registry.evict_terminal(10), 0);
        assert_eq!(registry.count(), 1);
    }
}
