//! Arbitrage Monitor - Live Sync Client
//!
//! Connects to the monitor's WebSocket feed, keeps the projected state current,
//! and exposes health and metrics over HTTP.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use arb_monitor_sync::{health, AppState, Config, Metrics, SyncClient, SyncHandle};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting arbitrage monitor sync client");

    let config = Arc::new(Config::load()?);
    info!(
        endpoint = %config.ws_endpoint,
        exchanges = ?config.price_exchanges,
        pairs = ?config.price_pairs,
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new()?);
    let (handle, client_task) = SyncClient::spawn(&config, metrics.clone());

    let state = Arc::new(AppState {
        handle: handle.clone(),
        metrics,
        config: config.clone(),
    });

    tokio::spawn(async move {
        if let Err(e) = health::serve(state).await {
            warn!(error = %e, "Health server error");
        }
    });

    tokio::spawn(log_status(
        handle.clone(),
        Duration::from_secs(config.status_log_interval_secs.max(1)),
    ));

    handle.connect().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    handle.disconnect("client shutdown").await?;
    handle.shutdown().await?;
    client_task.await?;

    Ok(())
}

/// Periodic status line
async fn log_status(handle: SyncHandle, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let status = handle.status();
        let store = handle.state();
        info!(
            state = %status.state,
            reconnect_attempts = status.reconnect_attempts,
            error = ?status.error,
            opportunities = store.opportunities().len(),
            alerts = store.alerts().len(),
            symbols = store.prices().len(),
            monitor_running = store.monitor_status().is_running(),
            "Sync status"
        );
    }
}
