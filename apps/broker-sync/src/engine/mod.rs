//! Order/trade synchronization engine.
//!
//! Local order state is a cache of broker-authoritative truth, kept
//! consistent under late, duplicated, and out-of-order delivery. One
//! dispatcher task serializes all mutation; a reconciliation sweep repairs
//! whatever the push channel missed.

mod core;
mod dispatcher;
pub mod events;
pub mod ledger;
mod poller;
pub mod registry;
pub mod state_machine;

pub use self::core::{BrokerSyncEngine, CancelAck, CancelError, EngineError, PlaceError};
pub use events::{EngineEvent, EngineNotification, FillDetail};
pub use ledger::FillLedger;
pub use registry::OrderRegistry;
