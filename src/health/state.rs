//! Connection status snapshot published by the monitor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ConnectionError;

/// Backend reachability, exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Healthy,
    Degraded,
    Down,
    Checking,
}

impl ConnectionStatus {
    pub fn is_healthy(self) -> bool {
        self == ConnectionStatus::Healthy
    }

    pub fn is_degraded(self) -> bool {
        self == ConnectionStatus::Degraded
    }

    pub fn is_down(self) -> bool {
        self == ConnectionStatus::Down
    }

    /// Healthy or degraded: requests are getting through.
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Healthy | ConnectionStatus::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Healthy => "healthy",
            ConnectionStatus::Degraded => "degraded",
            ConnectionStatus::Down => "down",
            ConnectionStatus::Checking => "checking",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of the monitor's view of the backend.
///
/// The monitor replaces the whole snapshot on every transition; listeners
/// receive clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Completion time of the most recent probe.
    pub last_check: Option<DateTime<Utc>>,
    /// Completion time of the most recent successful probe.
    pub last_successful_connection: Option<DateTime<Utc>>,
    /// Time since the last success; zero while healthy.
    pub downtime: Duration,
    /// Consecutive failed probes.
    pub retry_count: u32,
    /// Last classified failure, cleared by a success.
    pub error: Option<ConnectionError>,
    /// Latency of the last successful probe.
    pub latency: Option<Duration>,
    /// Delay before the next scheduled probe.
    pub next_interval: Duration,
}

impl ConnectionState {
    /// State at the moment monitoring starts.
    pub fn checking(next_interval: Duration) -> Self {
        Self {
            status: ConnectionStatus::Checking,
            last_check: None,
            last_successful_connection: None,
            downtime: Duration::ZERO,
            retry_count: 0,
            error: None,
            latency: None,
            next_interval,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::checking(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_connected_derivation() {
        assert!(ConnectionStatus::Healthy.is_connected());
        assert!(ConnectionStatus::Degraded.is_connected());
        assert!(!ConnectionStatus::Down.is_connected());
        assert!(!ConnectionStatus::Checking.is_connected());
    }

    #[test]
    fn test_initial_state() {
        let state = ConnectionState::checking(Duration::from_secs(30));
        assert_eq!(state.status, ConnectionStatus::Checking);
        assert!(!state.is_connected());
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.downtime, Duration::ZERO);
        assert!(state.last_check.is_none());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_value(ConnectionState::default()).unwrap();
        assert_eq!(json["status"], "checking");
        assert_eq!(json["retry_count"], 0);
        assert_eq!(ConnectionStatus::Down.to_string(), "down");
    }
}
