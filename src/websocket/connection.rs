//! Connection lifecycle state machine
//!
//! Owned by the manager event loop; nothing else mutates it.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::protocol::NORMAL_CLOSURE;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    /// Numeric code exported as a metrics gauge
    pub fn code(self) -> i64 {
        match self {
            ConnectionState::Idle => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Reconnecting => 3,
            ConnectionState::Failed => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the manager must do after a close event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Intentional close, stay idle
    Idle,
    /// Schedule a reconnect after `delay`
    Reconnect { attempt: u32, delay: Duration },
    /// Attempts exhausted
    Failed,
    /// No live transport in the current state
    Ignored,
}

/// Observable connection status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub error: Option<String>,
    pub reconnect_attempts: u32,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

/// The single connection entity
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    error: Option<String>,
    reconnect_attempts: u32,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl Connection {
    pub fn new(max_reconnect_attempts: u32, reconnect_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Idle,
            error: None,
            reconnect_attempts: 0,
            max_reconnect_attempts,
            reconnect_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_reconnect_attempts, config.reconnect_delay())
    }

    /// Idle, Failed or Reconnecting -> Connecting
    pub fn begin_connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Failed | ConnectionState::Reconnecting => {
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            from => Err(SyncError::InvalidTransition {
                from,
                action: "connect",
            }),
        }
    }

    /// Connecting -> Open; resets the attempt counter and clears the error
    pub fn opened(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connecting {
            return Err(SyncError::InvalidTransition {
                from: self.state,
                action: "open",
            });
        }
        self.state = ConnectionState::Open;
        self.reconnect_attempts = 0;
        self.error = None;
        Ok(())
    }

    /// Apply the reconnect policy to a close event
    pub fn closed(&mut self, code: u16) -> CloseOutcome {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return CloseOutcome::Ignored;
        }

        if code == NORMAL_CLOSURE {
            self.state = ConnectionState::Idle;
            return CloseOutcome::Idle;
        }

        if self.reconnect_attempts < self.max_reconnect_attempts {
            self.reconnect_attempts += 1;
            self.state = ConnectionState::Reconnecting;
            CloseOutcome::Reconnect {
                attempt: self.reconnect_attempts,
                delay: self.reconnect_delay,
            }
        } else {
            self.state = ConnectionState::Failed;
            self.error =
                Some(SyncError::MaxReconnectAttemptsExceeded(self.max_reconnect_attempts).to_string());
            CloseOutcome::Failed
        }
    }

    /// Record a transport error; the paired close event drives the transition
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Intentional disconnect from any state
    pub fn disconnected(&mut self) {
        self.state = ConnectionState::Idle;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            error: self.error.clone(),
            reconnect_attempts: self.reconnect_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ABNORMAL_CLOSURE;

    fn connection() -> Connection {
        Connection::new(5, Duration::from_millis(3000))
    }

    fn open(conn: &mut Connection) {
        conn.begin_connect().unwrap();
        conn.opened().unwrap();
    }

    #[test]
    fn test_connect_then_open() {
        let mut conn = connection();
        assert_eq!(conn.state(), ConnectionState::Idle);

        conn.begin_connect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.opened().unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert!(conn.status().is_connected());
    }

    #[test]
    fn test_open_requires_connecting() {
        let mut conn = connection();
        assert!(matches!(
            conn.opened(),
            Err(SyncError::InvalidTransition {
                from: ConnectionState::Idle,
                ..
            })
        ));

        open(&mut conn);
        assert!(conn.begin_connect().is_err());
        assert!(conn.opened().is_err());
    }

    #[test]
    fn test_sixth_abnormal_close_fails() {
        let mut conn = connection();
        conn.begin_connect().unwrap();

        for attempt in 1..=5 {
            let outcome = conn.closed(ABNORMAL_CLOSURE);
            assert_eq!(
                outcome,
                CloseOutcome::Reconnect {
                    attempt,
                    delay: Duration::from_millis(3000)
                }
            );
            assert_eq!(conn.state(), ConnectionState::Reconnecting);
            conn.begin_connect().unwrap();
        }

        assert_eq!(conn.closed(ABNORMAL_CLOSURE), CloseOutcome::Failed);
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_eq!(
            conn.error(),
            Some("Max reconnection attempts (5) exceeded")
        );

        // failed is terminal until an explicit connect
        assert_eq!(conn.closed(ABNORMAL_CLOSURE), CloseOutcome::Ignored);
        conn.begin_connect().unwrap();
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_intentional_close_never_reconnects() {
        let mut conn = connection();
        conn.begin_connect().unwrap();
        for _ in 0..4 {
            conn.closed(4000);
            conn.begin_connect().unwrap();
        }
        conn.opened().unwrap();
        conn.closed(ABNORMAL_CLOSURE);
        conn.begin_connect().unwrap();
        assert_eq!(conn.reconnect_attempts(), 1);

        assert_eq!(conn.closed(NORMAL_CLOSURE), CloseOutcome::Idle);
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_successful_open_resets_attempts_and_error() {
        let mut conn = connection();
        conn.begin_connect().unwrap();
        conn.record_error("connection refused");
        conn.closed(ABNORMAL_CLOSURE);
        conn.begin_connect().unwrap();
        conn.closed(ABNORMAL_CLOSURE);
        assert_eq!(conn.reconnect_attempts(), 2);

        conn.begin_connect().unwrap();
        conn.opened().unwrap();
        assert_eq!(conn.reconnect_attempts(), 0);
        assert_eq!(conn.error(), None);
    }

    #[test]
    fn test_error_does_not_change_state() {
        let mut conn = connection();
        open(&mut conn);
        conn.record_error("broken pipe");

        let status = conn.status();
        assert_eq!(status.state, ConnectionState::Open);
        assert_eq!(status.error.as_deref(), Some("broken pipe"));
    }

    #[test]
    fn test_disconnect_goes_idle_and_ignores_late_close() {
        let mut conn = connection();
        open(&mut conn);
        conn.disconnected();
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(conn.closed(ABNORMAL_CLOSURE), CloseOutcome::Ignored);
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_zero_attempt_budget_fails_immediately() {
        let mut conn = Connection::new(0, Duration::from_millis(10));
        open(&mut conn);
        assert_eq!(conn.closed(1011), CloseOutcome::Failed);
    }
}
