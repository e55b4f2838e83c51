//! Order records, trade fills, and broker-reported snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderKind, OrderSide, OrderSpec, OrderStatus};

/// A single broker-reported execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    /// Globally unique trade identifier, the sole dedup key.
    pub trade_id: String,
    /// Broker order id the fill belongs to.
    pub remote_order_id: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity (unsigned magnitude).
    pub quantity: Decimal,
    /// Fee charged for the execution.
    pub fee: Decimal,
    /// Broker-reported execution timestamp (epoch milliseconds).
    pub timestamp_ms: i64,
}

/// Raw broker-reported order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteOrderState {
    /// Placement acknowledged, order resting.
    Accepted,
    /// Open and working (synonym for accepted on some venues).
    Open,
    /// Conditional order still waiting for its trigger condition.
    Untriggered,
    /// Conditional order's trigger condition fired.
    Triggered,
    /// Completely executed.
    Filled,
    /// Canceled at the broker.
    Cancelled,
    /// Rejected by the broker.
    Rejected,
}

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotSource {
    /// Asynchronous push feed or a placement/cancel response.
    Push,
    /// Reconciliation sweep query.
    Poll,
}

/// Most recent broker-reported state for an order.
///
/// The update timestamp is the broker's, kept as epoch milliseconds so the
/// staleness tie-break can synthesize `cached + 1`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RemoteMark {
    /// Raw broker state at the time of the snapshot.
    pub state: RemoteOrderState,
    /// Broker-reported update timestamp (epoch milliseconds).
    pub updated_at_ms: i64,
}

/// Broker-authoritative view of one order.
///
/// Delivered by the push feed, by placement/cancel responses, and by the
/// reconciliation sweep. The optional spec fields (`side`, `kind`,
/// `quantity`, `limit_price`) are populated by open-orders queries and allow
/// re-importing orders the process does not know about after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrderSnapshot {
    /// Broker-assigned order id.
    pub remote_order_id: String,
    /// Engine-assigned local id echoed back by the broker, when the order
    /// was tagged at placement. Marks the order as local-origin.
    pub client_order_id: Option<String>,
    /// Instrument identifier.
    pub instrument: String,
    /// Raw broker state.
    pub state: RemoteOrderState,
    /// Whether a conditional order's trigger condition has fired.
    pub triggered: bool,
    /// Execution-order id a conditional order acquires after triggering,
    /// distinct from its trigger-order id.
    pub exec_order_id: Option<String>,
    /// Broker-reported cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Broker-reported update timestamp (epoch milliseconds).
    pub updated_at_ms: i64,
    /// Delivery path.
    pub source: SnapshotSource,
    /// Order side (open-orders queries only).
    pub side: Option<OrderSide>,
    /// Order kind (open-orders queries only).
    pub kind: Option<OrderKind>,
    /// Requested quantity (open-orders queries only).
    pub quantity: Option<Decimal>,
    /// Limit price (open-orders queries only).
    pub limit_price: Option<Decimal>,
}

impl RemoteOrderSnapshot {
    /// Reconstruct an order spec from the optional fields, if the snapshot
    /// carries enough of them (open-orders import).
    #[must_use]
    pub fn to_spec(&self) -> Option<OrderSpec> {
        let side = self.side?;
        let kind = self.kind?;
        let quantity = self.quantity?;
        Some(OrderSpec {
            instrument: self.instrument.clone(),
            side,
            kind,
            quantity,
            limit_price: self.limit_price,
            stop_price: None,
        })
    }
}

/// Authoritative local record of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Engine-assigned identifier, immutable for the order's lifetime.
    pub local_id: String,
    /// Broker-assigned identifiers; first entry is primary (used for cancel).
    /// A conditional order may append its execution-order id once observed.
    pub remote_ids: Vec<String>,
    /// Immutable order specification.
    pub spec: OrderSpec,
    /// Trigger flag for conditional kinds.
    pub triggered: bool,
    /// Canonical status, mutated only by the state machine.
    pub status: OrderStatus,
    /// Most recent broker-reported state, used for staleness comparison.
    pub last_remote: Option<RemoteMark>,
    /// Applied fills, in application order.
    pub trades: Vec<TradeFill>,
    /// A cancel was requested before any remote id was known; honored as
    /// soon as one arrives.
    pub cancel_requested: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub last_updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Create a fresh record for a local submission.
    #[must_use]
    pub fn new(local_id: String, spec: OrderSpec) -> Self {
        let now = Utc::now();
        Self {
            local_id,
            remote_ids: Vec::new(),
            spec,
            triggered: false,
            status: OrderStatus::New,
            last_remote: None,
            trades: Vec::new(),
            cancel_requested: false,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Primary remote id, once known.
    #[must_use]
    pub fn primary_remote_id(&self) -> Option<&str> {
        self.remote_ids.first().map(String::as_str)
    }

    /// Append a broker id if not already tracked.
    ///
    /// Returns true if the id was new.
    pub fn track_remote_id(&mut self, remote_id: &str) -> bool {
        if remote_id.is_empty() || self.remote_ids.iter().any(|id| id == remote_id) {
            return false;
        }
        self.remote_ids.push(remote_id.to_string());
        true
    }

    /// Cumulative filled quantity across applied fills.
    #[must_use]
    pub fn filled_quantity(&self) -> Decimal {
        self.trades.iter().map(|t| t.quantity).sum()
    }

    /// Quantity still unfilled.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.spec.quantity - self.filled_quantity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_record() -> OrderRecord {
        OrderRecord::new(
            "L-1".to_string(),
            OrderSpec {
                instrument: "ETH-PERPETUAL".to_string(),
                side: OrderSide::Sell,
                kind: OrderKind::Limit,
                quantity: dec!(5),
                limit_price: Some(dec!(3000)),
                stop_price: None,
            },
        )
    }

    fn make_fill(trade_id: &str, qty: Decimal) -> TradeFill {
        TradeFill {
            trade_id: trade_id.to_string(),
            remote_order_id: "R-1".to_string(),
            price: dec!(3000),
            quantity: qty,
            fee: dec!(0.1),
            timestamp_ms: 1_000,
        }
    }

    #[test]
    fn new_record_starts_clean() {
        let record = make_record();
        assert_eq!(record.status, OrderStatus::New);
        assert!(record.remote_ids.is_empty());
        assert!(record.trades.is_empty());
        assert_eq!(record.filled_quantity(), Decimal::ZERO);
        assert_eq!(record.remaining_quantity(), dec!(5));
    }

    #[test]
    fn track_remote_id_rejects_duplicates() {
        let mut record = make_record();
        assert!(record.track_remote_id("R-1"));
        assert!(!record.track_remote_id("R-1"));
        assert!(record.track_remote_id("R-2"));
        assert_eq!(record.remote_ids, vec!["R-1", "R-2"]);
        assert_eq!(record.primary_remote_id(), Some("R-1"));
    }

    #[test]
    fn track_remote_id_rejects_empty() {
        let mut record = make_record();
        assert!(!record.track_remote_id(""));
        assert!(record.remote_ids.is_empty());
    }

    #[test]
    fn filled_quantity_sums_trades() {
        let mut record = make_record();
        record.trades.push(make_fill("T-1", dec!(2)));
        record.trades.push(make_fill("T-2", dec!(1.5)));
        assert_eq!(record.filled_quantity(), dec!(3.5));
        assert_eq!(record.remaining_quantity(), dec!(1.5));
    }

    #[test]
    fn snapshot_to_spec_requires_essentials() {
        let snapshot = RemoteOrderSnapshot {
            remote_order_id: "R-9".to_string(),
            client_order_id: Some("L-9".to_string()),
            instrument: "BTC-PERPETUAL".to_string(),
            state: RemoteOrderState::Open,
            triggered: false,
            exec_order_id: None,
            filled_quantity: Decimal::ZERO,
            updated_at_ms: 1_000,
            source: SnapshotSource::Poll,
            side: Some(OrderSide::Buy),
            kind: Some(OrderKind::Limit),
            quantity: Some(dec!(10)),
            limit_price: Some(dec!(40000)),
        };
        let spec = snapshot.to_spec().unwrap();
        assert_eq!(spec.quantity, dec!(10));

        let mut partial = snapshot;
        partial.kind = None;
        assert!(partial.to_spec().is_none());
    }
}
