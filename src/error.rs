//! Error types for the sync client

use thiserror::Error;

use crate::websocket::ConnectionState;

/// Sync client errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Invalid connection transition: cannot {action} while {from}")]
    InvalidTransition {
        from: ConnectionState,
        action: &'static str,
    },

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Sync client event loop is no longer running")]
    ClientStopped,

    #[error("Max reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::ParseError(err.to_string())
    }
}

impl From<prometheus::Error> for SyncError {
    fn from(err: prometheus::Error) -> Self {
        SyncError::MetricsError(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
