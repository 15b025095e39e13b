//! Transport abstraction.
//!
//! A [`Connector`] opens a bidirectional text-frame pipe to the backend and
//! hands back a [`TransportHandle`]: a command sender toward the wire and an
//! event receiver from it. The connection manager only ever talks to these
//! channels, so the WebSocket implementation ([`websocket::WsConnector`]) and
//! the in-memory one used by tests ([`memory::MemoryConnector`]) are
//! interchangeable.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use kiosk_core::constants::{CLOSE_ABNORMAL, is_clean_close};
use kiosk_core::errors::TransportError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;

// ─────────────────────────────────────────────────────────────────────────────
// Commands and events
// ─────────────────────────────────────────────────────────────────────────────

/// Instruction for the transport task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    /// Send a text frame.
    Text(String),
    /// Start the closing handshake.
    Close {
        /// Close code to send.
        code: u16,
        /// Close reason to send.
        reason: String,
    },
}

/// Close code and reason observed when a transport ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason (may be empty).
    pub reason: String,
}

impl CloseInfo {
    /// Close with an explicit code.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    /// The connection dropped without a close frame.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }

    /// Whether this closure ends the session without reconnecting.
    pub fn is_clean(&self) -> bool {
        is_clean_close(self.code)
    }
}

/// Something that happened on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// The transport ended. Always the last event.
    Closed(CloseInfo),
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable, non-blocking sender toward a transport.
#[derive(Clone, Debug)]
pub struct TransportSender {
    tx: mpsc::Sender<TransportCommand>,
}

impl TransportSender {
    /// Wrap a command channel.
    pub fn new(tx: mpsc::Sender<TransportCommand>) -> Self {
        Self { tx }
    }

    /// Queue a text frame without waiting.
    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.push(TransportCommand::Text(text))
    }

    /// Queue a close request without waiting.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), TransportError> {
        self.push(TransportCommand::Close { code, reason: reason.into() })
    }

    /// Whether the transport task has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn push(&self, command: TransportCommand) -> Result<(), TransportError> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// An open transport.
#[derive(Debug)]
pub struct TransportHandle {
    /// Commands toward the wire.
    pub sender: TransportSender,
    /// Events from the wire, ending with [`TransportEvent::Closed`].
    pub events: mpsc::Receiver<TransportEvent>,
    /// Background task driving the wire, if any.
    pub task: Option<AbortHandle>,
}

/// Opens transports to the backend.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`, resolving once the handshake completes.
    async fn open(&self, url: &str) -> Result<TransportHandle, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
