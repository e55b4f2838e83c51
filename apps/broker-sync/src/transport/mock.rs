//! In-memory broker transport for tests and paper trading.
//!
//! Every response is scriptable: tests seed snapshots and fills, arm
//! one-shot placement failures, and inject push events through the handle
//! returned by [`MockTransport::push`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::models::{
    OrderSpec, RemoteOrderSnapshot, RemoteOrderState, SnapshotSource, TradeFill,
};

use super::{BrokerTransport, PlaceOrderAck, PushEvent, TransportError};

#[derive(Debug, Default)]
struct Inner {
    snapshots: HashMap<String, RemoteOrderSnapshot>,
    fills: HashMap<String, Vec<TradeFill>>,
    open: Vec<RemoteOrderSnapshot>,
    reject_next_place: Option<String>,
    fail_next_place: Option<TransportError>,
    immediate_fills: Vec<TradeFill>,
    placed: Vec<(String, OrderSpec)>,
    cancelled: Vec<String>,
    push_tx: Option<mpsc::UnboundedSender<PushEvent>>,
}

/// Scriptable in-memory [`BrokerTransport`].
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    disconnected: AtomicBool,
}

impl MockTransport {
    /// Create a connected mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }

    /// Seed the snapshot returned by `query_order` for a remote id.
    pub fn set_snapshot(&self, snapshot: RemoteOrderSnapshot) {
        self.with_inner(|inner| {
            inner
                .snapshots
                .insert(snapshot.remote_order_id.clone(), snapshot);
        });
    }

    /// Seed the fills returned by `query_fills_for_order` for a remote id.
    pub fn set_fills(&self, remote_id: &str, fills: Vec<TradeFill>) {
        self.with_inner(|inner| {
            inner.fills.insert(remote_id.to_string(), fills);
        });
    }

    /// Seed the `open_orders` response.
    pub fn set_open_orders(&self, open: Vec<RemoteOrderSnapshot>) {
        self.with_inner(|inner| inner.open = open);
    }

    /// Make the next placement come back as a broker rejection.
    pub fn reject_next_place(&self, reason: &str) {
        self.with_inner(|inner| inner.reject_next_place = Some(reason.to_string()));
    }

    /// Make the next placement fail with a transport error.
    pub fn fail_next_place(&self, error: TransportError) {
        self.with_inner(|inner| inner.fail_next_place = Some(error));
    }

    /// Attach a fill to the next placement acknowledgment.
    pub fn queue_immediate_fill(&self, fill: TradeFill) {
        self.with_inner(|inner| inner.immediate_fills.push(fill));
    }

    /// Toggle the reported connection state.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Inject a push event as if it arrived from the broker's stream.
    pub fn push(&self, event: PushEvent) {
        self.with_inner(|inner| {
            if let Some(tx) = &inner.push_tx {
                let _ = tx.send(event);
            }
        });
    }

    /// Orders submitted through `place_order`, in call order.
    #[must_use]
    pub fn placed_orders(&self) -> Vec<(String, OrderSpec)> {
        self.with_inner(|inner| inner.placed.clone())
    }

    /// Remote ids passed to `cancel_order`, in call order.
    #[must_use]
    pub fn cancelled_orders(&self) -> Vec<String> {
        self.with_inner(|inner| inner.cancelled.clone())
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn place_order(
        &self,
        local_id: &str,
        spec: &OrderSpec,
    ) -> Result<PlaceOrderAck, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        if let Some(error) = self.with_inner(|inner| inner.fail_next_place.take()) {
            return Err(error);
        }
        if let Some(reason) = self.with_inner(|inner| inner.reject_next_place.take()) {
            return Err(TransportError::Rejected { reason });
        }

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let remote_id = format!("MOCK-{seq}");

        self.with_inner(|inner| {
            inner.placed.push((local_id.to_string(), spec.clone()));
            inner.snapshots.insert(
                remote_id.clone(),
                RemoteOrderSnapshot {
                    remote_order_id: remote_id.clone(),
                    client_order_id: Some(local_id.to_string()),
                    instrument: spec.instrument.clone(),
                    state: if spec.kind.is_conditional() {
                        RemoteOrderState::Untriggered
                    } else {
                        RemoteOrderState::Open
                    },
                    triggered: false,
                    exec_order_id: None,
                    filled_quantity: Decimal::ZERO,
                    updated_at_ms: chrono::Utc::now().timestamp_millis(),
                    source: SnapshotSource::Poll,
                    side: Some(spec.side),
                    kind: Some(spec.kind),
                    quantity: Some(spec.quantity),
                    limit_price: spec.limit_price,
                },
            );
            Ok(PlaceOrderAck {
                remote_order_id: remote_id.clone(),
                immediate_fills: std::mem::take(&mut inner.immediate_fills),
            })
        })
    }

    async fn cancel_order(&self, remote_id: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.with_inner(|inner| {
            inner.cancelled.push(remote_id.to_string());
            match inner.snapshots.get_mut(remote_id) {
                Some(snapshot) => {
                    snapshot.state = RemoteOrderState::Cancelled;
                    snapshot.updated_at_ms = chrono::Utc::now().timestamp_millis();
                    Ok(())
                }
                None => Err(TransportError::OrderNotFound(remote_id.to_string())),
            }
        })
    }

    async fn query_order(&self, remote_id: &str) -> Result<RemoteOrderSnapshot, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.with_inner(|inner| {
            inner
                .snapshots
                .get(remote_id)
                .cloned()
                .ok_or_else(|| TransportError::OrderNotFound(remote_id.to_string()))
        })
    }

    async fn query_fills_for_order(
        &self,
        remote_id: &str,
    ) -> Result<Vec<TradeFill>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        Ok(self.with_inner(|inner| inner.fills.get(remote_id).cloned().unwrap_or_default()))
    }

    async fn open_orders(&self) -> Result<Vec<RemoteOrderSnapshot>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        Ok(self.with_inner(|inner| inner.open.clone()))
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PushEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_inner(|inner| inner.push_tx = Some(tx));
        rx
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
