//! Engine assembly and public command surface.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ReconciliationConfig, RetentionConfig};
use crate::models::{OrderRecord, OrderSpec, OrderSpecError};
use crate::transport::{BrokerTransport, PushEvent};

use super::dispatcher::Dispatcher;
use super::events::{EngineEvent, EngineNotification};
use super::ledger::FillLedger;
use super::poller::ReconciliationPoller;
use super::registry::OrderRegistry;

/// Synchronous placement failures. None of these mutate the registry.
#[derive(Debug, Error)]
pub enum PlaceError {
    /// The order spec failed model validation.
    #[error(transparent)]
    Validation(#[from] OrderSpecError),

    /// The transport has no live broker connection.
    #[error("broker transport disconnected")]
    Disconnected,

    /// The engine's event queue is gone.
    #[error("engine stopped")]
    Stopped,
}

/// Synchronous cancellation failures.
#[derive(Debug, Error)]
pub enum CancelError {
    /// No order is registered under the given local id.
    #[error("no order registered under local id {0}")]
    UnknownOrder(String),

    /// The engine's event queue is gone.
    #[error("engine stopped")]
    Stopped,
}

/// Engine lifecycle failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// `start` was called more than once.
    #[error("engine already started")]
    AlreadyStarted,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAck {
    /// The cancel was submitted to the broker.
    Requested,
    /// The order has no broker id yet; the cancel fires when one arrives.
    Deferred,
    /// The order was already terminal. Success as a no-op.
    AlreadyClosed,
}

/// Order/trade synchronization engine over a broker transport.
///
/// Owns the order registry, the fill ledger, and the action queue. All
/// state mutation runs on the dispatcher task started by [`Self::start`].
pub struct BrokerSyncEngine<T: BrokerTransport> {
    registry: Arc<OrderRegistry>,
    ledger: Arc<FillLedger>,
    transport: Arc<T>,
    reconciliation: ReconciliationConfig,
    retention: RetentionConfig,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineEvent>>>,
    notify_tx: mpsc::UnboundedSender<EngineNotification>,
    notify_rx: Mutex<Option<mpsc::UnboundedReceiver<EngineNotification>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: BrokerTransport> BrokerSyncEngine<T> {
    /// Build an engine around a transport. No tasks run until [`Self::start`].
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        reconciliation: ReconciliationConfig,
        retention: RetentionConfig,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        Self {
            registry: Arc::new(OrderRegistry::new()),
            ledger: Arc::new(FillLedger::new()),
            transport,
            reconciliation,
            retention,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the dispatcher, the push-event forwarder, and (when enabled)
    /// the reconciliation poller.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyStarted`] on a second call.
    pub fn start(&self) -> Result<(), EngineError> {
        let event_rx = self
            .event_rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(EngineError::AlreadyStarted)?;

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.ledger),
            Arc::clone(&self.transport),
            self.event_tx.clone(),
            self.notify_tx.clone(),
            self.reconciliation.clone(),
            self.retention,
        );

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(dispatcher.run(event_rx)));

        let mut push_rx = self.transport.subscribe();
        let event_tx = self.event_tx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = push_rx.recv().await {
                let queued = match event {
                    PushEvent::OrderUpdate(mut snapshot) => {
                        snapshot.source = crate::models::SnapshotSource::Push;
                        event_tx.send(EngineEvent::OrderUpdate(snapshot))
                    }
                    PushEvent::Fill(fill) => event_tx.send(EngineEvent::Fill(fill)),
                };
                if queued.is_err() {
                    return;
                }
            }
        }));

        if self.reconciliation.enabled {
            let poller =
                ReconciliationPoller::new(self.reconciliation.interval_secs, self.event_tx.clone());
            tasks.push(tokio::spawn(poller.run()));
        }

        if let Ok(mut slot) = self.tasks.lock() {
            *slot = tasks;
        }

        tracing::info!(
            transport = self.transport.name(),
            reconciliation = self.reconciliation.enabled,
            "Engine started"
        );
        Ok(())
    }

    /// Stop all engine tasks. Registered state stays queryable.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        tracing::info!("Engine stopped");
    }

    /// Take the notification stream. Only the first call yields it.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<EngineNotification>> {
        self.notify_rx.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Validate and register an order, then submit it asynchronously.
    ///
    /// The record exists (status `New`) before this returns, so any push
    /// event about the order finds it. Progress arrives as notifications.
    ///
    /// # Errors
    ///
    /// Fails on spec validation, a disconnected transport, or a stopped
    /// engine; no record is created in those cases.
    pub fn place(&self, spec: OrderSpec) -> Result<String, PlaceError> {
        spec.validate()?;
        if !self.transport.is_connected() {
            return Err(PlaceError::Disconnected);
        }

        let local_id = uuid::Uuid::new_v4().to_string();
        let record = OrderRecord::new(local_id.clone(), spec);

        tracing::info!(
            local_id = %local_id,
            instrument = %record.spec.instrument,
            side = ?record.spec.side,
            kind = ?record.spec.kind,
            quantity = %record.spec.quantity,
            "Placing order"
        );

        self.registry.insert(record);
        self.event_tx
            .send(EngineEvent::PlaceCommand {
                local_id: local_id.clone(),
            })
            .map_err(|_| PlaceError::Stopped)?;

        Ok(local_id)
    }

    /// Request cancellation of an order.
    ///
    /// Terminal orders acknowledge as [`CancelAck::AlreadyClosed`]. Orders
    /// without a broker id yet defer; the intent is honored when the id
    /// arrives.
    ///
    /// # Errors
    ///
    /// Fails if the local id is unknown or the engine has stopped.
    pub fn cancel(&self, local_id: &str) -> Result<CancelAck, CancelError> {
        let Some(record) = self.registry.get(local_id) else {
            return Err(CancelError::UnknownOrder(local_id.to_string()));
        };

        if record.status.is_terminal() {
            tracing::debug!(local_id = %local_id, status = %record.status, "Cancel of closed order");
            return Ok(CancelAck::AlreadyClosed);
        }

        // Only the dispatcher mutates records; the command carries the
        // intent and the flag is set (or the cancel submitted) there.
        let ack = if record.primary_remote_id().is_none() {
            CancelAck::Deferred
        } else {
            CancelAck::Requested
        };

        self.event_tx
            .send(EngineEvent::CancelCommand {
                local_id: local_id.to_string(),
            })
            .map_err(|_| CancelError::Stopped)?;

        tracing::info!(local_id = %local_id, deferred = matches!(ack, CancelAck::Deferred), "Cancel requested");
        Ok(ack)
    }

    /// Look up an order by local id.
    #[must_use]
    pub fn order(&self, local_id: &str) -> Option<OrderRecord> {
        self.registry.get(local_id)
    }

    /// All non-terminal orders.
    #[must_use]
    pub fn open_orders(&self) -> Vec<OrderRecord> {
        self.registry.active_orders()
    }

    /// Total number of registered orders, terminal included.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.registry.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderKind, OrderSide, OrderStatus};
    use crate::transport::mock::MockTransport;
    use rust_decimal_macros::dec;

    fn engine() -> BrokerSyncEngine<MockTransport> {
        BrokerSyncEngine::new(
            Arc::new(MockTransport::new()),
            ReconciliationConfig {
                enabled: false,
                ..ReconciliationConfig::default()
            },
            RetentionConfig::default(),
        )
    }

    fn limit_spec() -> OrderSpec {
        OrderSpec {
            instrument: "BTC-PERPETUAL".to_string(),
            side: OrderSide::Buy,
            kind: OrderKind::Limit,
            quantity: dec!(10),
            limit_price: Some(dec!(50000)),
            stop_price: None,
        }
    }

    #[tokio::test]
    async fn place_registers_record_before_returning() {
        let engine = engine();
        let local_id = engine.place(limit_spec()).unwrap();

        let record = engine.order(&local_id).unwrap();
        assert_eq!(record.status, OrderStatus::New);
        assert_eq!(engine.order_count(), 1);
    }

    #[tokio::test]
    async fn invalid_spec_leaves_registry_untouched() {
        let engine = engine();
        let spec = OrderSpec {
            limit_price: None,
            ..limit_spec()
        };

        assert!(matches!(
            engine.place(spec),
            Err(PlaceError::Validation(_))
        ));
        assert_eq!(engine.order_count(), 0);
    }

    #[tokio::test]
    async fn place_requires_connected_transport() {
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let engine = BrokerSyncEngine::new(
            transport,
            ReconciliationConfig::default(),
            RetentionConfig::default(),
        );

        assert!(matches!(
            engine.place(limit_spec()),
            Err(PlaceError::Disconnected)
        ));
        assert_eq!(engine.order_count(), 0);
    }

    #[tokio::test]
    async fn cancel_before_broker_id_defers() {
        let engine = engine();
        let local_id = engine.place(limit_spec()).unwrap();

        // Dispatcher not started, so no ack has arrived yet.
        assert_eq!(engine.cancel(&local_id).unwrap(), CancelAck::Deferred);

        // The intent travels through the queue; the record is untouched
        // until the dispatcher picks the command up.
        assert!(!engine.order(&local_id).unwrap().cancel_requested);
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_an_error() {
        let engine = engine();
        assert!(matches!(
            engine.cancel("missing"),
            Err(CancelError::UnknownOrder(_))
        ));
    }

    #[tokio::test]
    async fn notification_stream_hands_out_once() {
        let engine = engine();
        assert!(engine.events().is_some());
        assert!(engine.events().is_none());
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let engine = engine();
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));
        engine.shutdown();
    }
}
