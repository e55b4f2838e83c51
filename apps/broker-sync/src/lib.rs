// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access
    )
)]

//! Broker Sync - order/trade synchronization engine.
//!
//! Keeps a local order registry consistent with broker-authoritative state
//! when deliveries can be late, duplicated, dropped, or out of order.
//!
//! # Architecture
//!
//! - **models**: plain data types (order specs, records, fills, snapshots)
//! - **engine**: the core
//!   - `state_machine`: pure status-transition and staleness logic
//!   - `registry` / `ledger`: order records and the fill dedup set
//!   - single-consumer dispatcher serializing every mutation
//!   - reconciliation poller sweeping broker state on an interval
//! - **transport**: the broker seam (`BrokerTransport`) and an in-memory
//!   mock for tests and paper trading
//! - **config / telemetry / observability**: YAML settings, tracing,
//!   Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Application configuration (YAML).
pub mod config;

/// The synchronization engine.
pub mod engine;

/// Shared data types.
pub mod models;

/// Prometheus metrics.
pub mod observability;

/// Tracing setup.
pub mod telemetry;

/// Broker transport seam and mock.
pub mod transport;

pub use engine::{
    BrokerSyncEngine, CancelAck, CancelError, EngineError, EngineNotification, FillDetail,
    PlaceError,
};
pub use models::{
    OrderKind, OrderRecord, OrderSide, OrderSpec, OrderSpecError, OrderStatus,
    RemoteOrderSnapshot, RemoteOrderState, SnapshotSource, TradeFill,
};
pub use transport::{BrokerTransport, PlaceOrderAck, PushEvent, TransportError};
