//! Action queue event types and outbound notifications.

use rust_decimal::Decimal;

use crate::models::{OrderRecord, OrderStatus, RemoteOrderSnapshot, TradeFill};

/// An event on the engine's single-consumer action queue.
///
/// Everything that can mutate order state arrives here, in posting order:
/// push deliveries, poll sweep results, user commands, and poll ticks.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A broker-side order snapshot (push or poll).
    OrderUpdate(RemoteOrderSnapshot),
    /// A trade fill (push or poll).
    Fill(TradeFill),
    /// Submit a previously registered order to the broker.
    PlaceCommand {
        /// Local id of the record to submit.
        local_id: String,
    },
    /// Request cancellation of an order that has a remote id.
    CancelCommand {
        /// Local id of the record to cancel.
        local_id: String,
    },
    /// Timer signal that a reconciliation sweep is due.
    PollTick,
}

/// Fill details attached to an order notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillDetail {
    /// Execution price.
    pub price: Decimal,
    /// Signed quantity: positive for buys, negative for sells.
    pub quantity: Decimal,
    /// Fee charged for this execution.
    pub fee: Decimal,
}

/// A notification delivered to the owning algorithm.
#[derive(Debug, Clone)]
pub enum EngineNotification {
    /// An order changed status. Fill detail is present when the change was
    /// driven by an execution.
    Order {
        /// Local id of the affected order.
        local_id: String,
        /// Status after the transition.
        status: OrderStatus,
        /// Execution detail, when the transition came from a fill.
        fill: Option<FillDetail>,
    },
    /// A fill was applied; carries the full updated record.
    Trade(Box<OrderRecord>),
}
