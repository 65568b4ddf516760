//! State projection module
//!
//! Projects the inbound event stream into bounded, query-ready state.

mod dispatcher;
mod store;

pub use dispatcher::{resolve, severity_for_spread, Mutation};
pub use store::{StateStore, ALERT_CAPACITY, OPPORTUNITY_CAPACITY};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Opportunity identifier as sent by the monitor (numeric or textual)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpportunityId {
    Number(i64),
    Text(String),
}

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityId::Number(n) => write!(f, "{}", n),
            OpportunityId::Text(s) => f.write_str(s),
        }
    }
}

/// Lifecycle of a detected opportunity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    #[default]
    Detected,
    Executing,
    Executed,
    Failed,
    Completed,
}

/// A detected arbitrage candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,

    #[serde(default)]
    pub trading_pair: String,

    #[serde(default)]
    pub buy_exchange: Option<String>,

    #[serde(default)]
    pub sell_exchange: Option<String>,

    /// Spread in percent (1.0 == 1%)
    pub spread_percentage: Decimal,

    #[serde(default)]
    pub potential_profit: Option<Decimal>,

    #[serde(default)]
    pub status: OpportunityStatus,

    /// Payload fields without a typed counterpart
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Opportunity,
    Execution,
    System,
}

impl AlertCategory {
    /// Parse a wire tag, treating anything unrecognized as a system alert
    pub fn parse_lenient(raw: &str) -> Self {
        match raw {
            "opportunity" => AlertCategory::Opportunity,
            "execution" => AlertCategory::Execution,
            _ => AlertCategory::System,
        }
    }
}

/// Severity of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Success,
    Error,
    Info,
}

impl AlertLevel {
    /// Parse a wire tag, falling back to `Info`
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "low" => AlertLevel::Low,
            "medium" => AlertLevel::Medium,
            "high" => AlertLevel::High,
            "success" => AlertLevel::Success,
            "error" => AlertLevel::Error,
            _ => AlertLevel::Info,
        }
    }
}

/// A notable event surfaced to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,

    #[serde(rename = "type")]
    pub category: AlertCategory,

    pub message: String,

    /// Raw payload that triggered the alert
    #[serde(rename = "data")]
    pub payload: Value,

    pub timestamp: DateTime<Utc>,

    pub level: AlertLevel,
}

/// Alert contents before the store stamps an id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub id: Option<String>,
    pub category: AlertCategory,
    pub message: String,
    pub payload: Value,
    pub timestamp: Option<DateTime<Utc>>,
    pub level: AlertLevel,
}

impl AlertDraft {
    pub fn new(
        category: AlertCategory,
        message: impl Into<String>,
        payload: Value,
        level: AlertLevel,
    ) -> Self {
        Self {
            id: None,
            category,
            message: message.into(),
            payload,
            timestamp: None,
            level,
        }
    }
}

/// Monitor running state, replaced wholesale on every status message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorStatus(Map<String, Value>);

impl MonitorStatus {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// `false` unless the monitor reported a boolean `true`
    pub fn is_running(&self) -> bool {
        self.0
            .get("is_running")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Aggregate monitor statistics, stored as received
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Statistics(Map<String, Value>);

impl Statistics {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn total_opportunities(&self) -> Option<u64> {
        self.count("total_opportunities")
    }

    pub fn executed_opportunities(&self) -> Option<u64> {
        self.count("executed_opportunities")
    }

    pub fn total_potential_profit(&self) -> Option<Decimal> {
        self.decimal("total_potential_profit")
    }

    pub fn average_spread(&self) -> Option<Decimal> {
        self.decimal("average_spread")
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Non-negative integral count; `12.0` reads as 12
    fn count(&self, field: &str) -> Option<u64> {
        let value = self.0.get(field)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        })
    }

    fn decimal(&self, field: &str) -> Option<Decimal> {
        match self.0.get(field)? {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .ok(),
            Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }
}

/// Latest price data keyed by symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSnapshot(Map<String, Value>);

impl PriceSnapshot {
    /// Shallow merge: keys in `update` overwrite existing entries, other keys are kept
    pub fn merge(&mut self, update: Map<String, Value>) {
        for (symbol, data) in update {
            self.0.insert(symbol, data);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&Value> {
        self.0.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_opportunity_from_minimal_payload() {
        let opp: Opportunity = serde_json::from_value(json!({
            "id": 7,
            "trading_pair": "USDT/BRL",
            "spread_percentage": 1.2
        }))
        .unwrap();

        assert_eq!(opp.id, OpportunityId::Number(7));
        assert_eq!(opp.spread_percentage, dec!(1.2));
        assert_eq!(opp.status, OpportunityStatus::Detected);
        assert!(opp.extra.is_empty());
    }

    #[test]
    fn test_opportunity_keeps_unknown_fields() {
        let opp: Opportunity = serde_json::from_value(json!({
            "id": "op-1",
            "trading_pair": "BTC/USDT",
            "buy_exchange": "binance",
            "sell_exchange": "kraken",
            "spread_percentage": "0.75",
            "potential_profit": 12.5,
            "status": "executing",
            "volume": 3
        }))
        .unwrap();

        assert_eq!(opp.id.to_string(), "op-1");
        assert_eq!(opp.buy_exchange.as_deref(), Some("binance"));
        assert_eq!(opp.potential_profit, Some(dec!(12.5)));
        assert_eq!(opp.status, OpportunityStatus::Executing);
        assert_eq!(opp.extra.get("volume"), Some(&json!(3)));
    }

    #[test]
    fn test_level_parsing_falls_back_to_info() {
        assert_eq!(AlertLevel::parse_lenient("HIGH"), AlertLevel::High);
        assert_eq!(AlertLevel::parse_lenient("critical"), AlertLevel::Info);
        assert_eq!(AlertCategory::parse_lenient("execution"), AlertCategory::Execution);
        assert_eq!(AlertCategory::parse_lenient("whatever"), AlertCategory::System);
    }

    #[test]
    fn test_monitor_status_tolerates_odd_values() {
        let status = MonitorStatus::new(
            json!({"is_running": null, "uptime": 5}).as_object().cloned().unwrap(),
        );
        assert!(!status.is_running());
        assert_eq!(status.get("uptime"), Some(&json!(5)));
        assert_eq!(status.get("is_running"), Some(&Value::Null));

        let status = MonitorStatus::new(json!({"is_running": true}).as_object().cloned().unwrap());
        assert!(status.is_running());
        assert!(!MonitorStatus::default().is_running());
    }

    #[test]
    fn test_statistics_getters_are_lenient() {
        let stats = Statistics::new(
            json!({
                "total_opportunities": 12.0,
                "executed_opportunities": "3",
                "total_potential_profit": "150.25",
                "average_spread": 0.8,
                "uptime_seconds": 42
            })
            .as_object()
            .cloned()
            .unwrap(),
        );

        assert_eq!(stats.total_opportunities(), Some(12));
        assert_eq!(stats.executed_opportunities(), None);
        assert_eq!(stats.total_potential_profit(), Some(dec!(150.25)));
        assert_eq!(stats.average_spread(), Some(dec!(0.8)));
        assert_eq!(stats.get("uptime_seconds"), Some(&json!(42)));

        let fractional = Statistics::new(
            json!({"total_opportunities": 2.5}).as_object().cloned().unwrap(),
        );
        assert_eq!(fractional.total_opportunities(), None);
    }

    #[test]
    fn test_price_merge_overwrites_and_keeps() {
        let mut prices = PriceSnapshot::default();
        prices.merge(
            json!({"USDT/BRL": {"binance": 5.01}, "BTC/USDT": {"kraken": 64000}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        prices.merge(json!({"USDT/BRL": {"binance": 5.02}}).as_object().cloned().unwrap());

        assert_eq!(prices.len(), 2);
        assert_eq!(prices.get("USDT/BRL"), Some(&json!({"binance": 5.02})));
        assert_eq!(prices.get("BTC/USDT"), Some(&json!({"kraken": 64000})));
    }
}
