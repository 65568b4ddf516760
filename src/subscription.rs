//! Subscription API
//!
//! Outbound intents and the request sequence fired on every transition into Open.

use crate::config::Config;
use crate::protocol::OutboundMessage;

pub fn subscribe_prices(exchanges: Vec<String>, pairs: Vec<String>) -> OutboundMessage {
    OutboundMessage::SubscribePrices { exchanges, pairs }
}

pub fn request_opportunities() -> OutboundMessage {
    OutboundMessage::RequestOpportunities
}

pub fn request_statistics() -> OutboundMessage {
    OutboundMessage::RequestStatistics
}

/// Default price subscription sent after each successful open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub exchanges: Vec<String>,
    pub pairs: Vec<String>,
}

impl SubscriptionPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            exchanges: config.price_exchanges.clone(),
            pairs: config.price_pairs.clone(),
        }
    }

    /// Requests to send, in order, once the connection opens
    pub fn initial_requests(&self) -> Vec<OutboundMessage> {
        vec![
            request_opportunities(),
            request_statistics(),
            subscribe_prices(self.exchanges.clone(), self.pairs.clone()),
        ]
    }
}
