//! Handle through which consumers talk to the sync client
//!
//! The handle is cheap to clone and is passed explicitly to whoever needs it.
//! Reads come from watch channels; every write goes through the event loop.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use super::ConnectionStatus;
use crate::error::{Result, SyncError};
use crate::protocol::OutboundMessage;
use crate::state::StateStore;
use crate::subscription;

/// Requests processed by the manager event loop
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect {
        reason: String,
    },
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<bool>,
    },
    ClearAlerts,
    RemoveAlert {
        id: String,
    },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<Arc<StateStore>>,
    status: watch::Receiver<ConnectionStatus>,
}

impl SyncHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        state: watch::Receiver<Arc<StateStore>>,
        status: watch::Receiver<ConnectionStatus>,
    ) -> Self {
        Self {
            commands,
            state,
            status,
        }
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::ClientStopped)
    }

    /// Open the connection (also the way out of `Failed`)
    pub async fn connect(&self) -> Result<()> {
        self.command(Command::Connect).await
    }

    /// Close intentionally; no reconnect follows
    pub async fn disconnect(&self, reason: impl Into<String>) -> Result<()> {
        self.command(Command::Disconnect {
            reason: reason.into(),
        })
        .await
    }

    /// Stop the event loop after an intentional disconnect
    pub async fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown).await
    }

    /// Send a message; true only if the connection was open and the frame queued
    pub async fn send(&self, message: OutboundMessage) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(Command::Send { message, reply })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub async fn subscribe_prices(&self, exchanges: Vec<String>, pairs: Vec<String>) -> bool {
        self.send(subscription::subscribe_prices(exchanges, pairs))
            .await
    }

    pub async fn request_opportunities(&self) -> bool {
        self.send(subscription::request_opportunities()).await
    }

    pub async fn request_statistics(&self) -> bool {
        self.send(subscription::request_statistics()).await
    }

    pub async fn clear_alerts(&self) -> Result<()> {
        self.command(Command::ClearAlerts).await
    }

    pub async fn remove_alert(&self, id: impl Into<String>) -> Result<()> {
        self.command(Command::RemoveAlert { id: id.into() }).await
    }

    /// Latest projected state
    pub fn state(&self) -> Arc<StateStore> {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    pub fn connection_error(&self) -> Option<String> {
        self.status.borrow().error.clone()
    }

    /// Receiver notified after every applied mutation batch
    pub fn watch_state(&self) -> watch::Receiver<Arc<StateStore>> {
        self.state.clone()
    }

    /// Receiver notified on every connection status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}
