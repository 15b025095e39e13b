//! User-facing connection status.

use std::fmt;
use std::time::Duration;

use kiosk_core::errors::ConnectionState;

/// What the kiosk status indicator shows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Nothing open, nothing scheduled.
    #[default]
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// Open and healthy.
    Connected,
    /// Waiting to retry.
    Reconnecting {
        /// 1-based attempt number about to run.
        attempt: u32,
        /// Attempt budget.
        max_attempts: u32,
        /// Time until the attempt runs.
        delay: Duration,
    },
    /// Reconnect budget exhausted.
    Failed,
}

impl ConnectionStatus {
    /// Lifecycle state this status reflects.
    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Disconnected => ConnectionState::Disconnected,
            Self::Connecting => ConnectionState::Connecting,
            Self::Connected => ConnectionState::Connected,
            Self::Reconnecting { .. } => ConnectionState::Reconnecting,
            Self::Failed => ConnectionState::Failed,
        }
    }

    /// Whether the indicator should use its "connected" styling.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("Disconnected"),
            Self::Connecting => f.write_str("Connecting..."),
            Self::Connected => f.write_str("Connected"),
            Self::Reconnecting { delay, .. } => {
                write!(f, "Reconnecting in {}s...", delay.as_secs_f64().round())
            }
            Self::Failed => f.write_str("Reconnection failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(ConnectionStatus::Connecting.to_string(), "Connecting...");
        assert_eq!(ConnectionStatus::Connected.to_string(), "Connected");
        assert_eq!(ConnectionStatus::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionStatus::Failed.to_string(), "Reconnection failed");
    }

    #[test]
    fn reconnect_countdown_rounds_seconds() {
        let status = ConnectionStatus::Reconnecting {
            attempt: 1,
            max_attempts: 5,
            delay: Duration::from_millis(4_731),
        };
        assert_eq!(status.to_string(), "Reconnecting in 5s...");
        assert_eq!(status.state(), ConnectionState::Reconnecting);
        assert!(!status.is_healthy());
    }

    #[test]
    fn only_connected_is_healthy() {
        assert!(ConnectionStatus::Connected.is_healthy());
        assert!(!ConnectionStatus::Connecting.is_healthy());
        assert!(!ConnectionStatus::Failed.is_healthy());
    }
}
