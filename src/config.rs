//! Configuration module for the sync client

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the arbitrage monitor
    pub ws_endpoint: String,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,

    /// Interval between liveness probes while the connection is open
    pub keepalive_interval_ms: u64,

    /// Exchanges and pairs subscribed to on every successful open
    pub price_exchanges: Vec<String>,
    pub price_pairs: Vec<String>,

    /// Port for the health and metrics server
    pub health_port: u16,

    /// Status log interval in seconds
    pub status_log_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            ws_endpoint: lookup("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            reconnect_delay_ms: parse_or(&lookup, "RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            max_reconnect_attempts: parse_or(
                &lookup,
                "MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            keepalive_interval_ms: parse_or(
                &lookup,
                "KEEPALIVE_INTERVAL_MS",
                defaults.keepalive_interval_ms,
            ),
            price_exchanges: lookup("PRICE_EXCHANGES")
                .map(|raw| split_list(&raw, false))
                .unwrap_or(defaults.price_exchanges),
            price_pairs: lookup("PRICE_PAIRS")
                .map(|raw| split_list(&raw, true))
                .unwrap_or(defaults.price_pairs),
            health_port: parse_or(&lookup, "HEALTH_PORT", defaults.health_port),
            status_log_interval_secs: parse_or(
                &lookup,
                "STATUS_LOG_INTERVAL_SECS",
                defaults.status_log_interval_secs,
            ),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "ws://localhost:8000/api/v1/ws/ws".to_string(),
            reconnect_delay_ms: 3000,
            max_reconnect_attempts: 5,
            keepalive_interval_ms: 30_000,
            price_exchanges: vec![
                "binance".to_string(),
                "coinbase".to_string(),
                "kraken".to_string(),
            ],
            price_pairs: vec!["USDT/BRL".to_string()],
            health_port: 9090,
            status_log_interval_secs: 30,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str, uppercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if uppercase {
                s.to_uppercase()
            } else {
                s.to_lowercase()
            }
        })
        .collect()
}
