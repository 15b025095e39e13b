//! In-memory transport for tests and offline demos.
//!
//! Each accepted open hands the far end of the channels to the caller as a
//! [`MemoryPeer`], which plays the server: it pushes frames and closures and
//! observes what the client sent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kiosk_core::errors::TransportError;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{CloseInfo, Connector, TransportCommand, TransportEvent, TransportHandle, TransportSender};

const QUEUE_CAPACITY: usize = 64;

/// How the next open attempt should behave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Complete the handshake.
    Accept,
    /// Fail the handshake with a message.
    Refuse(String),
    /// Never complete (exercises the connect timeout).
    Hang,
}

/// The server side of an in-memory transport.
#[derive(Debug)]
pub struct MemoryPeer {
    /// URL the client dialled.
    pub url: String,
    /// Commands sent by the client.
    pub commands: mpsc::Receiver<TransportCommand>,
    /// Events delivered to the client.
    pub events: mpsc::Sender<TransportEvent>,
}

impl MemoryPeer {
    /// Deliver a raw text frame. Returns `false` if the client stopped listening.
    pub async fn send_frame(&self, text: impl Into<String>) -> bool {
        self.events.send(TransportEvent::Frame(text.into())).await.is_ok()
    }

    /// Deliver a JSON frame.
    pub async fn send_json(&self, value: &Value) -> bool {
        self.send_frame(value.to_string()).await
    }

    /// Close the transport from the server side.
    pub async fn close(&self, code: u16, reason: &str) -> bool {
        self.events
            .send(TransportEvent::Closed(CloseInfo::new(code, reason)))
            .await
            .is_ok()
    }

    /// Next command from the client, `None` once the client side is gone.
    pub async fn next_command(&mut self) -> Option<TransportCommand> {
        self.commands.recv().await
    }

    /// Next text frame that is not a keep-alive ping.
    pub async fn next_text(&mut self) -> Option<Value> {
        loop {
            match self.commands.recv().await? {
                TransportCommand::Text(text) => {
                    let value: Value = serde_json::from_str(&text).ok()?;
                    if value["type"] != "ping" {
                        return Some(value);
                    }
                }
                TransportCommand::Close { .. } => return None,
            }
        }
    }
}

struct Shared {
    script: Mutex<VecDeque<OpenOutcome>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
    opens: AtomicUsize,
}

/// Scriptable [`Connector`] backed by channels.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// New connector and the stream of peers for accepted opens.
    ///
    /// Opens are accepted unless an outcome was queued with [`Self::push_outcome`].
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Shared {
                script: Mutex::new(VecDeque::new()),
                peers,
                opens: AtomicUsize::new(0),
            }),
        };
        (connector, peer_rx)
    }

    /// Queue the outcome of a future open attempt.
    pub fn push_outcome(&self, outcome: OpenOutcome) {
        self.shared.script.lock().push_back(outcome);
    }

    /// Number of open attempts so far.
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str) -> Result<TransportHandle, TransportError> {
        let _ = self.shared.opens.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .shared
            .script
            .lock()
            .pop_front()
            .unwrap_or(OpenOutcome::Accept);

        match outcome {
            OpenOutcome::Accept => {
                let (cmd_tx, cmd_rx) = mpsc::channel(QUEUE_CAPACITY);
                let (event_tx, event_rx) = mpsc::channel(QUEUE_CAPACITY);
                let peer = MemoryPeer { url: url.to_string(), commands: cmd_rx, events: event_tx };
                self.shared
                    .peers
                    .send(peer)
                    .map_err(|_| TransportError::Open("no peer listener".into()))?;
                Ok(TransportHandle {
                    sender: TransportSender::new(cmd_tx),
                    events: event_rx,
                    task: None,
                })
            }
            OpenOutcome::Refuse(message) => Err(TransportError::Open(message)),
            OpenOutcome::Hang => std::future::pending().await,
        }
    }
}
