//! Pure order state transition logic.
//!
//! Maps (current status, incoming broker state) to a new status, with no I/O
//! and no registry access. The dispatcher applies the result; everything here
//! is decidable from the arguments alone.

use rust_decimal::Decimal;

use crate::models::{OrderStatus, RemoteOrderState};

/// Outcome of the staleness gate for an incoming snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDecision {
    /// Apply the snapshot and cache this timestamp.
    Accept {
        /// Timestamp to cache; either the snapshot's own, or a synthesized
        /// `cached + 1` for a stale-but-authoritative correction.
        cache_ts_ms: i64,
    },
    /// Drop the snapshot as stale.
    Skip,
}

/// Check if a state transition is valid.
///
/// Encodes the lifecycle graph: `New -> Submitted -> {Triggered,
/// PartiallyFilled, Filled, Canceled, Invalid}`, `Triggered` reachable only
/// for conditional kinds, repeated `PartiallyFilled` for additional fills,
/// and no exits from terminal states.
#[must_use]
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus, conditional: bool) -> bool {
    if to == OrderStatus::Triggered && !conditional {
        return false;
    }
    matches!(
        (from, to),
        // From New: placement acknowledged, rejected outright, or found
        // canceled by a sweep before the ack ever arrived.
        (
            OrderStatus::New,
            OrderStatus::Submitted | OrderStatus::Invalid | OrderStatus::Canceled
        )
        // From Submitted
        | (
            OrderStatus::Submitted,
            OrderStatus::Triggered
                | OrderStatus::PartiallyFilled
                | OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Invalid
        )
        // From Triggered
        | (
            OrderStatus::Triggered,
            OrderStatus::PartiallyFilled | OrderStatus::Filled | OrderStatus::Canceled
        )
        // From PartiallyFilled (repeated for additional fills)
        | (
            OrderStatus::PartiallyFilled,
            OrderStatus::PartiallyFilled | OrderStatus::Filled | OrderStatus::Canceled
        )
    )
}

/// Status implied by cumulative fill accounting.
#[must_use]
pub fn status_after_fill(cumulative: Decimal, total: Decimal) -> OrderStatus {
    if cumulative >= total {
        OrderStatus::Filled
    } else {
        OrderStatus::PartiallyFilled
    }
}

/// Map an incoming broker state onto the local lifecycle graph.
///
/// Returns `None` when the snapshot implies no transition: duplicates,
/// terminal lock, states that only fills may advance (`Filled` is reached
/// through fill accounting, never by a bare status report), and a
/// cancellation racing a completing fill (the fill wins).
#[must_use]
pub fn status_from_remote(
    current: OrderStatus,
    remote: RemoteOrderState,
    cumulative: Decimal,
    total: Decimal,
    conditional: bool,
) -> Option<OrderStatus> {
    if current.is_terminal() {
        return None;
    }

    let candidate = match remote {
        RemoteOrderState::Accepted | RemoteOrderState::Open | RemoteOrderState::Untriggered => {
            OrderStatus::Submitted
        }
        RemoteOrderState::Triggered => OrderStatus::Triggered,
        RemoteOrderState::Cancelled => {
            // A fill racing a cancel always wins; a cancellation arriving
            // after the completing fill is stale.
            if cumulative >= total {
                return None;
            }
            OrderStatus::Canceled
        }
        RemoteOrderState::Rejected => OrderStatus::Invalid,
        // Filled is driven by fill accounting, which also guards the
        // cumulative-quantity invariant.
        RemoteOrderState::Filled => return None,
    };

    if candidate == current || !is_valid_transition(current, candidate, conditional) {
        return None;
    }

    Some(candidate)
}

/// Staleness gate for incoming snapshots.
///
/// A snapshot is accepted outright when its broker-reported timestamp is
/// strictly newer than the cached one. When it is not but the snapshot would
/// still change the order's status (a correction the broker under-timestamped,
/// typically surfaced by a reconciliation query), the timestamp `cached + 1`
/// is synthesized to force monotonic progress. This tie-break is a heuristic,
/// not a proven total order under arbitrary clock skew.
#[must_use]
pub fn evaluate_snapshot(
    cached_ts_ms: Option<i64>,
    snapshot_ts_ms: i64,
    would_change_status: bool,
) -> SnapshotDecision {
    match cached_ts_ms {
        None => SnapshotDecision::Accept {
            cache_ts_ms: snapshot_ts_ms,
        },
        Some(cached) if snapshot_ts_ms > cached => SnapshotDecision::Accept {
            cache_ts_ms: snapshot_ts_ms,
        },
        Some(cached) if would_change_status => SnapshotDecision::Accept {
            cache_ts_ms: cached + 1,
        },
        Some(_) => SnapshotDecision::Skip,
    }
}
