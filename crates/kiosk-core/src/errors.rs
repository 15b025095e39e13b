//! Error types for the kiosk client.
//!
//! - [`ClientError`]: everything the connection manager can report
//! - [`TransportError`]: failures of the underlying byte pipe
//!
//! Parse and subscriber failures are recovered locally (logged and turned
//! into `error` events); open failures and timeouts reject `connect`; sends
//! while not connected fail synchronously.

use std::fmt;

use thiserror::Error;

use crate::protocol::{EventKind, FrameError};

// ─────────────────────────────────────────────────────────────────────────────
// Connection state
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport; nothing scheduled.
    #[default]
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// The transport is open.
    Connected,
    /// A reconnect timer is pending.
    Reconnecting,
    /// The reconnect budget is spent; waiting for an explicit connect.
    Failed,
}

impl ConnectionState {
    /// Lowercase name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of the underlying transport.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The handshake failed (refused, DNS, TLS, HTTP upgrade rejected, ...).
    #[error("open failed: {0}")]
    Open(String),
    /// The outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,
    /// The transport task has exited.
    #[error("transport closed")]
    Closed,
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientError
// ─────────────────────────────────────────────────────────────────────────────

/// Errors reported by the connection manager.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not be opened.
    #[error("failed to connect to {url}: {source}")]
    TransportOpen {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },

    /// No open confirmation within the connect timeout.
    #[error("connection to {url} timed out after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Endpoint that was dialled.
        url: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// An inbound frame could not be decoded.
    #[error("failed to parse inbound frame: {0}")]
    Parse(#[from] FrameError),

    /// A send was attempted while not connected.
    #[error("not connected (state: {state})")]
    SendWhileDisconnected {
        /// State at the time of the send.
        state: ConnectionState,
    },

    /// A subscriber returned an error or panicked.
    #[error("{kind} listener failed: {message}")]
    Subscriber {
        /// Kind being dispatched.
        kind: EventKind,
        /// Failure description.
        message: String,
    },

    /// Every reconnect attempt failed.
    #[error("reconnection failed after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// The operation is not valid in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Current state.
        state: ConnectionState,
        /// Operation that was refused.
        operation: &'static str,
    },

    /// A frame could not be handed to the transport.
    #[error("send failed: {0}")]
    Send(#[source] TransportError),

    /// An outbound message could not be serialized.
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ClientError {
    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransportOpen { .. } => "TRANSPORT_OPEN_ERROR",
            Self::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            Self::Parse(_) => "PARSE_ERROR",
            Self::SendWhileDisconnected { .. } => "NOT_CONNECTED",
            Self::Subscriber { .. } => "SUBSCRIBER_ERROR",
            Self::ReconnectExhausted { .. } => "RECONNECT_EXHAUSTED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Send(_) => "SEND_FAILED",
            Self::Serialize(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether trying again later could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportOpen { .. } | Self::ConnectionTimeout { .. } | Self::Send(_)
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn transport_open_display() {
        let err = ClientError::TransportOpen {
            url: "ws://localhost:8101/ws".into(),
            source: TransportError::Open("connection refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "failed to connect to ws://localhost:8101/ws: open failed: connection refused"
        );
        assert_eq!(err.code(), "TRANSPORT_OPEN_ERROR");
        assert!(err.is_retryable());
    }

    #[test]
    fn timeout_display() {
        let err = ClientError::ConnectionTimeout { url: "ws://k/ws".into(), timeout_ms: 10_000 };
        assert_eq!(err.to_string(), "connection to ws://k/ws timed out after 10000ms");
        assert!(err.is_retryable());
    }

    #[test]
    fn send_while_disconnected_is_not_retryable() {
        let err = ClientError::SendWhileDisconnected { state: ConnectionState::Reconnecting };
        assert_eq!(err.to_string(), "not connected (state: reconnecting)");
        assert_eq!(err.code(), "NOT_CONNECTED");
        assert!(!err.is_retryable());
    }

    #[test]
    fn parse_error_from_frame_error() {
        let frame_err = crate::protocol::parse_frame("{").unwrap_err().error;
        let err: ClientError = frame_err.into();
        assert_matches!(err, ClientError::Parse(FrameError::InvalidJson(_)));
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn subscriber_display_names_kind() {
        let err = ClientError::Subscriber {
            kind: EventKind::TableResponse,
            message: "render failed".into(),
        };
        assert_eq!(err.to_string(), "table_response listener failed: render failed");
    }

    #[test]
    fn exhausted_display() {
        let err = ClientError::ReconnectExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "reconnection failed after 5 attempts");
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_state_display() {
        let err = ClientError::InvalidState {
            state: ConnectionState::Connecting,
            operation: "connect",
        };
        assert_eq!(err.to_string(), "cannot connect while connecting");
    }
}
