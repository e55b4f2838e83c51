//! Broker transport seam.
//!
//! The engine talks to the outside world only through [`BrokerTransport`].
//! Production implementations wrap a broker's REST and streaming APIs; tests
//! and the paper-mode binary use the in-memory [`mock::MockTransport`].

pub mod mock;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{OrderSpec, RemoteOrderSnapshot, TradeFill};

/// Errors surfaced by a broker transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport-level failure (connection reset, 5xx, malformed body).
    #[error("transport failure: {0}")]
    Http(String),

    /// The broker refused the order.
    #[error("order rejected by broker: {reason}")]
    Rejected {
        /// Broker-supplied rejection reason.
        reason: String,
    },

    /// The broker is throttling requests.
    #[error("rate limited by broker")]
    RateLimited,

    /// The call did not complete in time.
    #[error("broker call timed out")]
    Timeout,

    /// The transport has no live connection.
    #[error("transport not connected")]
    NotConnected,

    /// The broker does not know the referenced order.
    #[error("order not found: {0}")]
    OrderNotFound(String),
}

/// Successful placement acknowledgment.
#[derive(Debug, Clone)]
pub struct PlaceOrderAck {
    /// Broker-assigned order id.
    pub remote_order_id: String,
    /// Fills reported in the placement response itself (marketable orders).
    pub immediate_fills: Vec<TradeFill>,
}

/// An event delivered over the broker's push channel.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// Order state changed broker-side.
    OrderUpdate(RemoteOrderSnapshot),
    /// An execution occurred.
    Fill(TradeFill),
}

/// Interface to a broker's order APIs.
///
/// Implementations must be safe to call from multiple tasks; the engine
/// issues placement, cancellation, and sweep queries concurrently.
#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Submit an order, tagging it with the engine's local id so it can be
    /// recognized in open-orders queries after a restart.
    async fn place_order(
        &self,
        local_id: &str,
        spec: &OrderSpec,
    ) -> Result<PlaceOrderAck, TransportError>;

    /// Request cancellation of a broker order.
    async fn cancel_order(&self, remote_id: &str) -> Result<(), TransportError>;

    /// Fetch the current snapshot of a broker order.
    async fn query_order(&self, remote_id: &str) -> Result<RemoteOrderSnapshot, TransportError>;

    /// Fetch all fills recorded against a broker order.
    async fn query_fills_for_order(
        &self,
        remote_id: &str,
    ) -> Result<Vec<TradeFill>, TransportError>;

    /// Fetch all currently open orders on the account.
    async fn open_orders(&self) -> Result<Vec<RemoteOrderSnapshot>, TransportError>;

    /// Obtain the push-event stream. Called once at engine start.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<PushEvent>;

    /// Whether the transport currently has a live connection.
    fn is_connected(&self) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
