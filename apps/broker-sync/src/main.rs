//! Broker Sync Binary
//!
//! Runs the synchronization engine in paper mode against the in-memory
//! mock transport.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin broker-sync -- [config.yaml]
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (default: the configured `observability.log_level`)

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use broker_sync::config::AppConfig;
use broker_sync::engine::BrokerSyncEngine;
use broker_sync::observability::{self, MetricsConfig};
use broker_sync::telemetry;
use broker_sync::transport::mock::MockTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path).with_context(|| format!("loading config {path}"))?,
        None => AppConfig::default(),
    };

    telemetry::init_tracing(&config.observability.log_level);

    if config.observability.metrics_enabled {
        let addr = config
            .observability
            .metrics_listen_addr
            .parse()
            .context("parsing metrics listen address")?;
        observability::init_metrics(&MetricsConfig::with_addr(addr))
            .context("starting metrics exporter")?;
    }

    tracing::info!(
        reconciliation = config.reconciliation.enabled,
        interval_secs = config.reconciliation.interval_secs,
        "Starting broker-sync (paper mode)"
    );

    let transport = Arc::new(MockTransport::new());
    let engine = BrokerSyncEngine::new(
        Arc::clone(&transport),
        config.reconciliation,
        config.retention,
    );

    let mut notifications = engine
        .events()
        .context("notification stream already taken")?;
    let notification_logger = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            tracing::info!(?notification, "Engine notification");
        }
    });

    engine.start()?;

    signal::ctrl_c().await.context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    engine.shutdown();
    notification_logger.abort();

    Ok(())
}
