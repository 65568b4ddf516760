//! WebSocket module for the monitor connection

mod client;
mod connection;
mod handle;
mod keepalive;
mod manager;

pub use client::{Transport, TransportEvent, TransportEventKind, WebSocketClient};
pub use connection::{CloseOutcome, Connection, ConnectionState, ConnectionStatus};
pub use handle::SyncHandle;
pub use keepalive::Keepalive;
pub use manager::SyncClient;
