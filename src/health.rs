//! HTTP server for health checks and metrics

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::state::StateStore;
use crate::websocket::ConnectionStatus;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve health and metrics until the listener fails
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Health document for the current connection and store
pub fn health_report(status: &ConnectionStatus, store: &StateStore) -> serde_json::Value {
    serde_json::json!({
        "status": if status.is_connected() { "healthy" } else { "degraded" },
        "component": "arb-monitor-sync",
        "connection": status,
        "opportunities": store.opportunities().len(),
        "alerts": store.alerts().len(),
        "monitor_running": store.monitor_status().is_running(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.handle.status();
    let store = state.handle.state();
    Json(health_report(&status, &store))
}

async fn metrics(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<String, (StatusCode, String)> {
    state
        .metrics
        .encode()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
