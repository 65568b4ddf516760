//! WebSocket transport driver
//!
//! Each connection attempt runs in its own task. The task owns the socket and
//! reports typed lifecycle events to the manager over a single channel; the
//! manager writes through a bounded outbound queue.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame, Message},
};
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::metrics::Metrics;
use crate::protocol::{Envelope, ABNORMAL_CLOSURE, NO_STATUS_RECEIVED};

const OUTBOUND_BUFFER: usize = 64;

/// Lifecycle event published by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Opened,
    Message(Envelope),
    Closed(u16),
    Error(String),
}

/// Event tagged with the generation of the transport that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

/// Manager-side handle to a running transport
///
/// Dropping the handle makes the driver close the socket and exit.
#[derive(Debug)]
pub struct Transport {
    generation: u64,
    outbound: mpsc::Sender<Message>,
}

impl Transport {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a text frame; false if the queue is full or the driver is gone
    pub fn try_send_text(&self, text: String) -> bool {
        self.outbound.try_send(Message::Text(text)).is_ok()
    }

    /// Queue a close frame and release the transport
    pub fn close(self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        if self.outbound.try_send(Message::Close(Some(frame))).is_err() {
            debug!(
                generation = self.generation,
                "Transport already gone, close frame not queued"
            );
        }
    }
}

/// Opens transports against a fixed endpoint
pub struct WebSocketClient {
    endpoint: String,
    metrics: Arc<Metrics>,
}

impl WebSocketClient {
    pub fn new(endpoint: &str, metrics: Arc<Metrics>) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            metrics,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Spawn a driver task for a new connection attempt
    pub fn open(&self, generation: u64, events: mpsc::Sender<TransportEvent>) -> Transport {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let sink = EventSink {
            generation,
            events,
            metrics: self.metrics.clone(),
        };
        tokio::spawn(drive(self.endpoint.clone(), sink, outbound_rx));

        Transport {
            generation,
            outbound: outbound_tx,
        }
    }
}

struct EventSink {
    generation: u64,
    events: mpsc::Sender<TransportEvent>,
    metrics: Arc<Metrics>,
}

impl EventSink {
    /// Returns false once the manager has gone away
    async fn emit(&self, kind: TransportEventKind) -> bool {
        self.events
            .send(TransportEvent {
                generation: self.generation,
                kind,
            })
            .await
            .is_ok()
    }

    /// Report an error followed by an abnormal close
    async fn fail(&self, err: SyncError) {
        if self.emit(TransportEventKind::Error(err.to_string())).await {
            self.emit(TransportEventKind::Closed(ABNORMAL_CLOSURE)).await;
        }
    }

    async fn forward(&self, raw: &str) -> bool {
        match Envelope::parse(raw) {
            Ok(envelope) => self.emit(TransportEventKind::Message(envelope)).await,
            Err(e) => {
                self.metrics.frames_discarded.inc();
                warn!(error = %e, len = raw.len(), "Discarding malformed frame");
                true
            }
        }
    }
}

async fn drive(endpoint: String, sink: EventSink, mut outbound: mpsc::Receiver<Message>) {
    info!(url = %endpoint, generation = sink.generation, "Connecting to monitor WebSocket");

    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, response)) => {
            info!(status = ?response.status(), "WebSocket connected");
            stream
        }
        Err(e) => {
            warn!(error = %e, "WebSocket connection failed");
            sink.fail(SyncError::from(e)).await;
            return;
        }
    };

    if !sink.emit(TransportEventKind::Opened).await {
        return;
    }

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    let closing = matches!(message, Message::Close(_));
                    if let Err(e) = write.send(message).await {
                        error!(error = %e, "Failed to write frame");
                        sink.fail(SyncError::WebSocketMessage(e.to_string())).await;
                        return;
                    }
                    if closing {
                        debug!(generation = sink.generation, "Close frame sent, releasing socket");
                        return;
                    }
                }
                None => {
                    debug!(generation = sink.generation, "Transport handle dropped, closing socket");
                    let _ = write.close().await;
                    return;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !sink.forward(&text).await {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data).to_string();
                    if !sink.forward(&text).await {
                        return;
                    }
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                    // control frames are answered by tungstenite
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .as_ref()
                        .map(|f| u16::from(f.code))
                        .unwrap_or(NO_STATUS_RECEIVED);
                    warn!(code, frame = ?frame, "Received close frame");
                    sink.emit(TransportEventKind::Closed(code)).await;
                    return;
                }
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    sink.fail(SyncError::WebSocketMessage(e.to_string())).await;
                    return;
                }
                None => {
                    warn!("WebSocket stream ended");
                    sink.emit(TransportEventKind::Closed(ABNORMAL_CLOSURE)).await;
                    return;
                }
            }
        }
    }
}
