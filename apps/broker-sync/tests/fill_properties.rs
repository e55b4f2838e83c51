//! Property tests for fill accounting invariants.

use proptest::prelude::*;
use rust_decimal::Decimal;

use broker_sync::engine::FillLedger;
use broker_sync::engine::state_machine::status_after_fill;
use broker_sync::models::OrderStatus;

/// A fill as it would arrive off the wire: a trade id from a small pool
/// (so duplicates are common) and a quantity.
fn arb_fills() -> impl Strategy<Value = Vec<(u8, u32)>> {
    prop::collection::vec((0u8..8, 1u32..5), 0..40)
}

proptest! {
    // Replaying any fill sequence with duplicates applies each trade id at
    // most once, and cumulative quantity never exceeds the order total.
    #[test]
    fn dedup_and_bound_hold_for_any_sequence(fills in arb_fills(), total in 1u32..20) {
        let ledger = FillLedger::new();
        let total = Decimal::from(total);
        let mut cumulative = Decimal::ZERO;
        let mut applied = 0usize;

        for (id, quantity) in fills {
            let trade_id = format!("T-{id}");
            if ledger.contains(&trade_id) {
                continue;
            }
            let quantity = Decimal::from(quantity);
            if cumulative + quantity > total {
                continue;
            }
            ledger.record(&trade_id);
            cumulative += quantity;
            applied += 1;
        }

        prop_assert!(cumulative <= total);
        prop_assert!(applied <= 8, "at most one application per unique id");
        prop_assert_eq!(ledger.len(), applied);
    }

    // The derived status is Filled exactly when the order is complete.
    #[test]
    fn fill_status_tracks_completion(cumulative in 0u32..30, total in 1u32..30) {
        let status = status_after_fill(Decimal::from(cumulative), Decimal::from(total));
        if cumulative >= total {
            prop_assert_eq!(status, OrderStatus::Filled);
        } else {
            prop_assert_eq!(status, OrderStatus::PartiallyFilled);
        }
    }

    // Recording is first-wins no matter how ids repeat.
    #[test]
    fn ledger_record_is_idempotent(ids in prop::collection::vec(0u8..16, 1..60)) {
        let ledger = FillLedger::new();
        let mut first_seen = std::collections::HashSet::new();

        for id in ids {
            let trade_id = format!("T-{id}");
            let fresh = ledger.record(&trade_id);
            prop_assert_eq!(fresh, first_seen.insert(id));
        }
    }
}
