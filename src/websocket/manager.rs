//! Sync client event loop
//!
//! Owns the connection state machine, the store and both timers. Commands,
//! transport events, keepalive ticks and the reconnect deadline are handled one at
//! a time, in arrival order.

use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, trace, warn};

use super::client::{Transport, TransportEvent, TransportEventKind, WebSocketClient};
use super::connection::{CloseOutcome, Connection, ConnectionState, ConnectionStatus};
use super::handle::{Command, SyncHandle};
use super::keepalive::Keepalive;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::protocol::{Envelope, OutboundMessage, NORMAL_CLOSURE};
use crate::state::{resolve, Mutation, StateStore};
use crate::subscription::SubscriptionPlan;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 1024;

/// Keeps one streaming connection alive and projects its messages into state
pub struct SyncClient {
    client: WebSocketClient,
    connection: Connection,
    store: StateStore,
    keepalive: Keepalive,
    reconnect_at: Option<Pin<Box<Sleep>>>,
    transport: Option<Transport>,
    generation: u64,
    subscriptions: SubscriptionPlan,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<Arc<StateStore>>,
    status_tx: watch::Sender<ConnectionStatus>,
    metrics: Arc<Metrics>,
}

impl SyncClient {
    /// Create the event loop and the handle consumers use to drive it
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> (Self, SyncHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let store = StateStore::new();
        let connection = Connection::from_config(config);
        let (state_tx, state_rx) = watch::channel(Arc::new(store.clone()));
        let (status_tx, status_rx) = watch::channel(connection.status());

        let client = Self {
            client: WebSocketClient::new(&config.ws_endpoint, metrics.clone()),
            connection,
            store,
            keepalive: Keepalive::new(config.keepalive_interval()),
            reconnect_at: None,
            transport: None,
            generation: 0,
            subscriptions: SubscriptionPlan::from_config(config),
            events_tx,
            events_rx,
            commands: commands_rx,
            state_tx,
            status_tx,
            metrics,
        };

        (client, SyncHandle::new(commands_tx, state_rx, status_rx))
    }

    /// Create and spawn the event loop on the current runtime
    pub fn spawn(config: &Config, metrics: Arc<Metrics>) -> (SyncHandle, JoinHandle<()>) {
        let (client, handle) = Self::new(config, metrics);
        (handle, tokio::spawn(client.run()))
    }

    /// Run until shutdown is requested or every handle is dropped
    pub async fn run(mut self) {
        info!(endpoint = %self.client.endpoint(), "Starting sync client event loop");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_transport_event(event),
                _ = self.keepalive.tick() => self.send_probe(),
                _ = reconnect_due(&mut self.reconnect_at) => {
                    self.reconnect_at = None;
                    info!(
                        attempt = self.connection.reconnect_attempts(),
                        max_attempts = self.connection.max_reconnect_attempts(),
                        "Reconnecting"
                    );
                    self.begin_connect();
                }
            }
        }

        self.disconnect("client shutdown");
        info!("Sync client event loop stopped");
    }

    /// Returns false when the loop should stop
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect { reason } => self.disconnect(&reason),
            Command::Send { message, reply } => {
                let _ = reply.send(self.send(&message));
            }
            Command::ClearAlerts => self.apply_mutations(vec![Mutation::ClearAlerts]),
            Command::RemoveAlert { id } => self.apply_mutations(vec![Mutation::RemoveAlert(id)]),
            Command::Shutdown => return false,
        }
        true
    }

    fn connect(&mut self) {
        let state = self.connection.state();
        if matches!(state, ConnectionState::Connecting | ConnectionState::Open) {
            debug!(state = %state, "Connect requested while already active");
            return;
        }
        self.reconnect_at = None;
        self.begin_connect();
    }

    fn begin_connect(&mut self) {
        if let Err(e) = self.connection.begin_connect() {
            warn!(error = %e, "Cannot start connection");
            return;
        }

        self.generation += 1;
        self.transport = Some(self.client.open(self.generation, self.events_tx.clone()));
        self.publish_status();
    }

    fn disconnect(&mut self, reason: &str) {
        self.reconnect_at = None;
        self.keepalive.stop();
        if let Some(transport) = self.transport.take() {
            transport.close(NORMAL_CLOSURE, reason);
        }

        if self.connection.state() != ConnectionState::Idle {
            info!(reason, "Disconnecting");
        }
        self.connection.disconnected();
        self.publish_status();
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        let current = self.transport.as_ref().map(Transport::generation);
        if current != Some(event.generation) {
            trace!(generation = event.generation, "Ignoring event from retired transport");
            return;
        }

        match event.kind {
            TransportEventKind::Opened => self.on_opened(),
            TransportEventKind::Message(envelope) => self.on_message(envelope),
            TransportEventKind::Closed(code) => self.on_closed(code),
            TransportEventKind::Error(message) => {
                warn!(error = %message, "Transport error");
                self.connection.record_error(message);
                self.publish_status();
            }
        }
    }

    fn on_opened(&mut self) {
        if let Err(e) = self.connection.opened() {
            warn!(error = %e, "Unexpected open event");
            return;
        }
        info!("Connection open, sending initial requests");
        self.publish_status();

        self.send_probe();
        self.keepalive.start();

        for request in self.subscriptions.initial_requests() {
            if !self.send(&request) {
                warn!(kind = request.kind(), "Initial request not delivered");
            }
        }
    }

    fn on_message(&mut self, envelope: Envelope) {
        self.metrics.record_frame(&envelope.kind);

        match resolve(&envelope) {
            Ok(mutations) if mutations.is_empty() => {
                trace!(kind = %envelope.kind, "No state change");
            }
            Ok(mutations) => self.apply_mutations(mutations),
            Err(e) => {
                self.metrics.frames_discarded.inc();
                warn!(kind = %envelope.kind, error = %e, "Discarding malformed message");
            }
        }
    }

    fn on_closed(&mut self, code: u16) {
        self.keepalive.stop();
        self.transport = None;

        match self.connection.closed(code) {
            CloseOutcome::Idle => info!(code, "Connection closed intentionally"),
            CloseOutcome::Reconnect { attempt, delay } => {
                warn!(
                    code,
                    attempt,
                    max_attempts = self.connection.max_reconnect_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Connection lost, scheduling reconnect"
                );
                self.metrics.reconnects_scheduled.inc();
                self.reconnect_at = Some(Box::pin(sleep(delay)));
            }
            CloseOutcome::Failed => error!(
                code,
                attempts = self.connection.reconnect_attempts(),
                "Reconnect attempts exhausted, giving up"
            ),
            CloseOutcome::Ignored => debug!(code, "Close event ignored"),
        }

        self.publish_status();
    }

    /// Send through the open transport; false in any other state
    fn send(&self, message: &OutboundMessage) -> bool {
        if self.connection.state() != ConnectionState::Open {
            debug!(kind = message.kind(), state = %self.connection.state(), "Not open, message dropped");
            return false;
        }
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "Failed to encode message");
                return false;
            }
        };

        if transport.try_send_text(text) {
            self.metrics
                .frames_sent
                .with_label_values(&[message.kind()])
                .inc();
            true
        } else {
            warn!(kind = message.kind(), "Outbound queue unavailable, message dropped");
            false
        }
    }

    fn send_probe(&self) {
        if !self.send(&OutboundMessage::Ping) {
            debug!("Keepalive probe not sent");
        }
    }

    fn apply_mutations(&mut self, mutations: Vec<Mutation>) {
        for mutation in mutations {
            self.store.apply(mutation);
        }

        self.metrics
            .opportunities_tracked
            .set(self.store.opportunities().len() as i64);
        self.metrics.alerts_tracked.set(self.store.alerts().len() as i64);
        self.state_tx.send_replace(Arc::new(self.store.clone()));
    }

    fn publish_status(&self) {
        let status = self.connection.status();
        self.metrics.connection_state.set(status.state.code());
        self.status_tx.send_replace(status);
    }
}

/// Resolves when the pending reconnect deadline passes; never resolves without one
async fn reconnect_due(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending::<()>().await,
    }
}
