//! Single-consumer event dispatcher.
//!
//! All order-state mutation happens here, on one task, in posting order.
//! Handlers never await the network: placement, cancellation, and sweep I/O
//! are spawned onto separate tasks whose results re-enter the queue as
//! events.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::config::{ReconciliationConfig, RetentionConfig};
use crate::models::{
    OrderRecord, OrderStatus, RemoteOrderSnapshot, RemoteOrderState, SnapshotSource, TradeFill,
};
use crate::observability;
use crate::transport::{BrokerTransport, TransportError};

use super::events::{EngineEvent, EngineNotification, FillDetail};
use super::ledger::FillLedger;
use super::poller::{self, SweepOrder};
use super::registry::OrderRegistry;
use super::state_machine::{self, SnapshotDecision};

/// The event consumer and its shared collaborators.
pub(crate) struct Dispatcher<T: BrokerTransport> {
    registry: Arc<OrderRegistry>,
    ledger: Arc<FillLedger>,
    transport: Arc<T>,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    notify_tx: mpsc::UnboundedSender<EngineNotification>,
    reconciliation: ReconciliationConfig,
    retention: RetentionConfig,
}

impl<T: BrokerTransport> Dispatcher<T> {
    pub(crate) fn new(
        registry: Arc<OrderRegistry>,
        ledger: Arc<FillLedger>,
        transport: Arc<T>,
        event_tx: mpsc::UnboundedSender<EngineEvent>,
        notify_tx: mpsc::UnboundedSender<EngineNotification>,
        reconciliation: ReconciliationConfig,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            transport,
            event_tx,
            notify_tx,
            reconciliation,
            retention,
        }
    }

    /// Consume events until the queue closes. A handler failure is logged
    /// and the loop continues; nothing escapes.
    pub(crate) async fn run(self, mut event_rx: mpsc::UnboundedReceiver<EngineEvent>) {
        tracing::info!(transport = self.transport.name(), "Dispatcher started");

        while let Some(event) = event_rx.recv().await {
            let kind = event_kind(&event);
            observability::record_event_dispatched(kind);

            if let Err(error) = self.handle(event) {
                tracing::error!(kind, %error, "Event handler failed");
            }
        }

        tracing::info!("Dispatcher stopped: event queue closed");
    }

    fn handle(&self, event: EngineEvent) -> Result<(), DispatchError> {
        match event {
            EngineEvent::OrderUpdate(snapshot) => self.handle_order_update(snapshot),
            EngineEvent::Fill(fill) => self.handle_fill(fill),
            EngineEvent::PlaceCommand { local_id } => self.handle_place(&local_id),
            EngineEvent::CancelCommand { local_id } => self.handle_cancel(&local_id),
            EngineEvent::PollTick => self.handle_poll_tick(),
        }
    }

    // ------------------------------------------------------------------
    // Order updates
    // ------------------------------------------------------------------

    fn handle_order_update(&self, snapshot: RemoteOrderSnapshot) -> Result<(), DispatchError> {
        let Some(mut record) = self.resolve_record(&snapshot) else {
            return Ok(());
        };

        // Structural bookkeeping happens regardless of staleness: every id
        // the broker has shown us must resolve back to this record.
        if !snapshot.remote_order_id.is_empty() {
            record.track_remote_id(&snapshot.remote_order_id);
        }
        if let Some(exec_id) = &snapshot.exec_order_id {
            record.track_remote_id(exec_id);
        }
        if snapshot.triggered || snapshot.state == RemoteOrderState::Triggered {
            record.triggered = true;
        }

        let next_status = state_machine::status_from_remote(
            record.status,
            snapshot.state,
            record.filled_quantity(),
            record.spec.quantity,
            record.spec.kind.is_conditional(),
        );

        let decision = state_machine::evaluate_snapshot(
            record.last_remote.as_ref().map(|mark| mark.updated_at_ms),
            snapshot.updated_at_ms,
            next_status.is_some(),
        );

        match decision {
            SnapshotDecision::Skip => {
                tracing::debug!(
                    local_id = %record.local_id,
                    remote_id = %snapshot.remote_order_id,
                    state = ?snapshot.state,
                    ts = snapshot.updated_at_ms,
                    "Stale snapshot skipped"
                );
                self.registry.update(record);
                return Ok(());
            }
            SnapshotDecision::Accept { cache_ts_ms } => {
                record.last_remote = Some(crate::models::RemoteMark {
                    state: snapshot.state,
                    updated_at_ms: cache_ts_ms,
                });
            }
        }

        if let Some(status) = next_status {
            self.transition(&mut record, status, None);
        } else {
            record.last_updated_at = chrono::Utc::now();
        }

        let issue_deferred_cancel = record.cancel_requested
            && record.status.is_active()
            && record.primary_remote_id().is_some();
        if issue_deferred_cancel {
            record.cancel_requested = false;
        }
        let remote_id = record.primary_remote_id().map(str::to_string);

        self.registry.update(record);

        if issue_deferred_cancel {
            if let Some(remote_id) = remote_id {
                tracing::info!(remote_id = %remote_id, "Issuing deferred cancel");
                self.spawn_cancel(remote_id);
            }
        }

        Ok(())
    }

    /// Find the record a snapshot refers to, importing engine-tagged orders
    /// that are not yet known locally.
    fn resolve_record(&self, snapshot: &RemoteOrderSnapshot) -> Option<OrderRecord> {
        if !snapshot.remote_order_id.is_empty() {
            if let Some(record) = self.registry.get_by_remote_id(&snapshot.remote_order_id) {
                return Some(record);
            }
        }

        // Placement acks and restart imports resolve through the local id
        // the order was tagged with at submission.
        if let Some(client_id) = &snapshot.client_order_id {
            if let Some(record) = self.registry.get(client_id) {
                return Some(record);
            }

            if let Some(spec) = snapshot.to_spec() {
                tracing::info!(
                    local_id = %client_id,
                    remote_id = %snapshot.remote_order_id,
                    instrument = %snapshot.instrument,
                    "Importing unknown engine-tagged order"
                );
                let record = OrderRecord::new(client_id.clone(), spec);
                self.registry.insert(record.clone());
                return Some(record);
            }
        }

        tracing::warn!(
            remote_id = %snapshot.remote_order_id,
            state = ?snapshot.state,
            "Order update references no known order"
        );
        observability::record_unknown_order_reference();
        None
    }

    // ------------------------------------------------------------------
    // Fills
    // ------------------------------------------------------------------

    fn handle_fill(&self, fill: TradeFill) -> Result<(), DispatchError> {
        if self.ledger.contains(&fill.trade_id) {
            tracing::debug!(trade_id = %fill.trade_id, "Duplicate fill ignored");
            observability::record_fill("duplicate");
            return Ok(());
        }

        let Some(mut record) = self.registry.get_by_remote_id(&fill.remote_order_id) else {
            // Not ledgered: a later sweep replays it once the order is known.
            tracing::warn!(
                trade_id = %fill.trade_id,
                remote_id = %fill.remote_order_id,
                "Fill references no known order, dropped"
            );
            observability::record_fill("unknown_order");
            return Ok(());
        };

        match record.status {
            OrderStatus::New => {
                tracing::warn!(
                    local_id = %record.local_id,
                    trade_id = %fill.trade_id,
                    "Fill arrived before placement ack, dropped"
                );
                observability::record_fill("unknown_order");
                return Ok(());
            }
            status if status.is_terminal() => {
                tracing::debug!(
                    local_id = %record.local_id,
                    trade_id = %fill.trade_id,
                    %status,
                    "Fill for closed order ignored"
                );
                observability::record_fill("duplicate");
                return Ok(());
            }
            _ => {}
        }

        let cumulative = record.filled_quantity() + fill.quantity;
        if cumulative > record.spec.quantity {
            // Not ledgered either; if the broker later reports a corrected
            // quantity, the sweep can still apply it.
            tracing::warn!(
                local_id = %record.local_id,
                trade_id = %fill.trade_id,
                %cumulative,
                total = %record.spec.quantity,
                "Fill exceeds order quantity, dropped"
            );
            observability::record_fill("overshoot");
            return Ok(());
        }

        self.ledger.record(&fill.trade_id);

        let detail = FillDetail {
            price: fill.price,
            quantity: fill.quantity * record.spec.side.sign(),
            fee: fill.fee,
        };
        record.trades.push(fill);

        let status = state_machine::status_after_fill(cumulative, record.spec.quantity);
        self.transition(&mut record, status, Some(detail));

        observability::record_fill("applied");
        self.registry.update(record.clone());
        self.notify(EngineNotification::Trade(Box::new(record)));

        Ok(())
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn handle_place(&self, local_id: &str) -> Result<(), DispatchError> {
        let Some(record) = self.registry.get(local_id) else {
            return Err(DispatchError::UnknownLocalOrder(local_id.to_string()));
        };

        let transport = Arc::clone(&self.transport);
        let event_tx = self.event_tx.clone();
        let local_id = record.local_id.clone();
        let spec = record.spec;

        tokio::spawn(async move {
            match transport.place_order(&local_id, &spec).await {
                Ok(ack) => {
                    tracing::info!(
                        local_id = %local_id,
                        remote_id = %ack.remote_order_id,
                        instrument = %spec.instrument,
                        "Order accepted by broker"
                    );
                    let snapshot = ack_snapshot(
                        &local_id,
                        &spec.instrument,
                        ack.remote_order_id,
                        RemoteOrderState::Accepted,
                    );
                    let _ = event_tx.send(EngineEvent::OrderUpdate(snapshot));
                    for fill in ack.immediate_fills {
                        let _ = event_tx.send(EngineEvent::Fill(fill));
                    }
                }
                Err(TransportError::Rejected { reason }) => {
                    tracing::warn!(local_id = %local_id, %reason, "Order rejected by broker");
                    let snapshot = ack_snapshot(
                        &local_id,
                        &spec.instrument,
                        String::new(),
                        RemoteOrderState::Rejected,
                    );
                    let _ = event_tx.send(EngineEvent::OrderUpdate(snapshot));
                }
                Err(error) => {
                    // The record stays non-terminal; if the order reached the
                    // broker anyway, the open-orders import picks it up.
                    tracing::warn!(
                        local_id = %local_id,
                        %error,
                        "Order submission failed, awaiting reconciliation"
                    );
                }
            }
        });

        Ok(())
    }

    fn handle_cancel(&self, local_id: &str) -> Result<(), DispatchError> {
        let Some(record) = self.registry.get(local_id) else {
            return Err(DispatchError::UnknownLocalOrder(local_id.to_string()));
        };

        if record.status.is_terminal() {
            tracing::debug!(local_id = %local_id, status = %record.status, "Cancel of closed order is a no-op");
            return Ok(());
        }

        match record.primary_remote_id() {
            Some(remote_id) => self.spawn_cancel(remote_id.to_string()),
            None => {
                // Recorded here rather than on the calling thread so the
                // write cannot clobber an update applied in between.
                tracing::info!(local_id = %local_id, "Cancel deferred until broker id arrives");
                let mut record = record;
                record.cancel_requested = true;
                self.registry.update(record);
            }
        }

        Ok(())
    }

    fn spawn_cancel(&self, remote_id: String) {
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            match transport.cancel_order(&remote_id).await {
                // Confirmation arrives as a push update or via the sweep.
                Ok(()) => tracing::info!(remote_id = %remote_id, "Cancel submitted"),
                Err(error) => {
                    tracing::warn!(remote_id = %remote_id, %error, "Cancel submission failed");
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Reconciliation tick
    // ------------------------------------------------------------------

    fn handle_poll_tick(&self) -> Result<(), DispatchError> {
        self.registry
            .evict_terminal(self.retention.max_terminal_records);

        let active = self.registry.active_orders();
        observability::update_active_orders(active.len());

        self.invalidate_unacknowledged(&active);

        let plan: Vec<SweepOrder> = active
            .iter()
            .filter_map(|record| {
                let remote_id = record.primary_remote_id()?.to_string();
                Some(SweepOrder {
                    local_id: record.local_id.clone(),
                    remote_id,
                    exec_id: record.remote_ids.get(1).cloned(),
                    conditional: record.spec.kind.is_conditional(),
                    triggered: record.triggered,
                })
            })
            .collect();

        tracing::debug!(orders = plan.len(), "Reconciliation sweep starting");

        let transport = Arc::clone(&self.transport);
        let event_tx = self.event_tx.clone();
        let config = self.reconciliation.clone();
        tokio::spawn(async move {
            poller::run_sweep(transport, plan, event_tx, config).await;
        });

        Ok(())
    }

    /// Close out submissions the broker never acknowledged.
    ///
    /// A placement that failed in transport leaves a record in New with no
    /// broker id. If the order did reach the broker, the open-orders import
    /// reattaches it by client tag within one sweep cycle; a record still
    /// anonymous after two full intervals provably never made it and is
    /// invalidated so it does not linger as active forever.
    fn invalidate_unacknowledged(&self, active: &[OrderRecord]) {
        let grace_secs = i64::try_from(self.reconciliation.interval_secs.saturating_mul(2))
            .unwrap_or(i64::MAX);
        let grace = chrono::Duration::seconds(grace_secs);
        let now = chrono::Utc::now();

        for record in active {
            if record.status == OrderStatus::New
                && record.primary_remote_id().is_none()
                && now.signed_duration_since(record.created_at) > grace
            {
                tracing::warn!(
                    local_id = %record.local_id,
                    age_secs = now.signed_duration_since(record.created_at).num_seconds(),
                    "Submission never acknowledged by broker, invalidating"
                );
                let mut record = record.clone();
                self.transition(&mut record, OrderStatus::Invalid, None);
                self.registry.update(record);
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared transition plumbing
    // ------------------------------------------------------------------

    fn transition(&self, record: &mut OrderRecord, to: OrderStatus, fill: Option<FillDetail>) {
        if record.status == to && fill.is_none() {
            return;
        }

        tracing::info!(
            local_id = %record.local_id,
            from = %record.status,
            %to,
            filled = %record.filled_quantity(),
            "Order status changed"
        );

        record.status = to;
        record.last_updated_at = chrono::Utc::now();
        observability::record_transition(&to.to_string());

        self.notify(EngineNotification::Order {
            local_id: record.local_id.clone(),
            status: to,
            fill,
        });
    }

    fn notify(&self, notification: EngineNotification) {
        // A closed notification channel means nobody is listening; state is
        // still kept consistent, so this is not an error.
        if self.notify_tx.send(notification).is_err() {
            tracing::debug!("Notification dropped: receiver gone");
        }
    }
}

/// Failures inside an event handler. The run loop logs these and continues.
#[derive(Debug, thiserror::Error)]
pub(crate) enum DispatchError {
    /// A command referenced a local id not present in the registry.
    #[error("no order registered under local id {0}")]
    UnknownLocalOrder(String),
}

fn event_kind(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::OrderUpdate(_) => "order_update",
        EngineEvent::Fill(_) => "fill",
        EngineEvent::PlaceCommand { .. } => "place",
        EngineEvent::CancelCommand { .. } => "cancel",
        EngineEvent::PollTick => "poll_tick",
    }
}

/// Snapshot synthesized from a synchronous placement response.
fn ack_snapshot(
    local_id: &str,
    instrument: &str,
    remote_order_id: String,
    state: RemoteOrderState,
) -> RemoteOrderSnapshot {
    RemoteOrderSnapshot {
        remote_order_id,
        client_order_id: Some(local_id.to_string()),
        instrument: instrument.to_string(),
        state,
        triggered: false,
        exec_order_id: None,
        filled_quantity: Decimal::ZERO,
        updated_at_ms: chrono::Utc::now().timestamp_millis(),
        source: SnapshotSource::Push,
        side: None,
        kind: None,
        quantity: None,
        limit_price: None,
    }
}
