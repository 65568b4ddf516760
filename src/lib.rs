//! Arbitrage Monitor - Live Sync Client Library
//!
//! This crate keeps a single WebSocket connection to the arbitrage monitor alive
//! and projects its event stream into bounded state for view layers to read.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod protocol;
pub mod state;
pub mod subscription;
pub mod websocket;

pub use config::Config;
pub use error::{Result, SyncError};
pub use metrics::Metrics;
pub use protocol::{Envelope, OutboundMessage};
pub use state::{
    Alert, AlertCategory, AlertLevel, MonitorStatus, Mutation, Opportunity, OpportunityId,
    OpportunityStatus, PriceSnapshot, StateStore, Statistics,
};
pub use websocket::{ConnectionState, ConnectionStatus, SyncClient, SyncHandle};

/// Application state shared with the health server
pub struct AppState {
    pub handle: SyncHandle,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}
