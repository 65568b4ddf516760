//! Prometheus metrics for the sync client

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{Result, SyncError};
use crate::protocol::KNOWN_MESSAGE_TYPES;

/// Metrics registered in a crate-owned registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub frames_received: IntCounterVec,
    pub frames_discarded: IntCounter,
    pub frames_sent: IntCounterVec,
    pub reconnects_scheduled: IntCounter,
    pub connection_state: IntGauge,
    pub opportunities_tracked: IntGauge,
    pub alerts_tracked: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("arb_sync".to_string()), None)?;

        let frames_received = IntCounterVec::new(
            Opts::new("frames_received_total", "Inbound messages by type"),
            &["kind"],
        )?;
        let frames_discarded = IntCounter::new(
            "frames_discarded_total",
            "Inbound messages dropped because their payload was malformed",
        )?;
        let frames_sent = IntCounterVec::new(
            Opts::new("frames_sent_total", "Outbound messages by type"),
            &["kind"],
        )?;
        let reconnects_scheduled =
            IntCounter::new("reconnects_scheduled_total", "Reconnect attempts scheduled")?;
        let connection_state = IntGauge::new(
            "connection_state",
            "0 idle, 1 connecting, 2 open, 3 reconnecting, 4 failed",
        )?;
        let opportunities_tracked =
            IntGauge::new("opportunities_tracked", "Opportunities held in the store")?;
        let alerts_tracked = IntGauge::new("alerts_tracked", "Alerts held in the store")?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(frames_discarded.clone()))?;
        registry.register(Box::new(frames_sent.clone()))?;
        registry.register(Box::new(reconnects_scheduled.clone()))?;
        registry.register(Box::new(connection_state.clone()))?;
        registry.register(Box::new(opportunities_tracked.clone()))?;
        registry.register(Box::new(alerts_tracked.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            frames_discarded,
            frames_sent,
            reconnects_scheduled,
            connection_state,
            opportunities_tracked,
            alerts_tracked,
        })
    }

    /// Count an inbound message; unknown types share one label
    pub fn record_frame(&self, kind: &str) {
        let label = if KNOWN_MESSAGE_TYPES.contains(&kind) {
            kind
        } else {
            "other"
        };
        self.frames_received.with_label_values(&[label]).inc();
    }

    /// Render all metrics in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| SyncError::MetricsError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_types_share_a_label() {
        let metrics = Metrics::new().unwrap();
        metrics.record_frame("new_opportunity");
        metrics.record_frame("mystery");
        metrics.record_frame("another_mystery");

        assert_eq!(
            metrics
                .frames_received
                .with_label_values(&["new_opportunity"])
                .get(),
            1
        );
        assert_eq!(metrics.frames_received.with_label_values(&["other"]).get(), 2);
    }

    #[test]
    fn test_encode_uses_namespace() {
        let metrics = Metrics::new().unwrap();
        metrics.reconnects_scheduled.inc();
        metrics.connection_state.set(2);

        let text = metrics.encode().unwrap();
        assert!(text.contains("arb_sync_reconnects_scheduled_total 1"));
        assert!(text.contains("arb_sync_connection_state 2"));
    }
}
