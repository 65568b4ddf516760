//! Wire protocol for the arbitrage monitor WebSocket feed
//!
//! Inbound frames are JSON objects tagged by `type`; the payload normally lives under
//! `data`. Outbound frames are flat tagged objects.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::state::OpportunityId;

/// Close code reserved for an intentional disconnect
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame received without a status code
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Transport lost without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Inbound message types the dispatcher understands
pub const KNOWN_MESSAGE_TYPES: &[&str] = &[
    "opportunity_detected",
    "new_opportunity",
    "opportunity_executed",
    "execution_result",
    "monitor_status",
    "monitor_status_update",
    "price_update",
    "monitor_statistics",
    "system_alert",
    "active_alerts",
    "pong",
    "heartbeat",
];

/// One inbound message unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Message type tag
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload
    pub data: Value,
}

/// Raw inbound frame before the payload is extracted
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Parse a raw text frame
    ///
    /// Frames carrying a `data` field use it as the payload; otherwise every
    /// top-level field except `type` becomes the payload.
    pub fn parse(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        let mut frame: RawFrame = serde_json::from_str(raw)?;
        let data = match frame.rest.remove("data") {
            Some(data) => data,
            None => Value::Object(frame.rest),
        };

        Ok(Self {
            kind: frame.kind,
            data,
        })
    }

    /// Deserialize the payload into a typed structure
    pub fn payload<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Payload of `opportunity_executed` / `execution_result`
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReport {
    #[serde(default)]
    pub opportunity_id: Option<OpportunityId>,

    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `system_alert`
#[derive(Debug, Clone, Deserialize)]
pub struct SystemNotice {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub level: Option<String>,
}

/// Outbound requests understood by the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Ping,
    SubscribePrices {
        exchanges: Vec<String>,
        pairs: Vec<String>,
    },
    #[serde(rename = "get_opportunities")]
    RequestOpportunities,
    #[serde(rename = "get_monitor_stats")]
    RequestStatistics,
}

impl OutboundMessage {
    /// Wire tag of this message
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Ping => "ping",
            OutboundMessage::SubscribePrices { .. } => "subscribe_prices",
            OutboundMessage::RequestOpportunities => "get_opportunities",
            OutboundMessage::RequestStatistics => "get_monitor_stats",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
