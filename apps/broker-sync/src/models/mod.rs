//! Shared data types for the broker-sync engine.
//!
//! These are plain serde-friendly types shared by the engine, the transport
//! seam, and the configuration layer. All quantities, prices, and fees use
//! `rust_decimal::Decimal` for financial precision.

mod order;
mod record;

pub use order::{OrderKind, OrderSide, OrderSpec, OrderSpecError, OrderStatus};
pub use record::{
    OrderRecord, RemoteMark, RemoteOrderSnapshot, RemoteOrderState, SnapshotSource, TradeFill,
};
