//! WebSocket transport over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kiosk_core::constants::CLOSE_NO_STATUS;
use kiosk_core::errors::TransportError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{CloseInfo, Connector, TransportCommand, TransportEvent, TransportHandle, TransportSender};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Default outbound queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Opens WebSocket transports.
#[derive(Clone, Debug)]
pub struct WsConnector {
    queue_capacity: usize,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl WsConnector {
    /// Connector whose transports buffer up to `queue_capacity` outbound frames.
    pub fn new(queue_capacity: usize) -> Self {
        Self { queue_capacity: queue_capacity.max(1) }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<TransportHandle, TransportError> {
        let (ws, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Open(e.to_string()))?;
        info!(url, status = %response.status(), "websocket handshake complete");

        let (cmd_tx, cmd_rx) = mpsc::channel(self.queue_capacity);
        // Inbound is sized generously: the reader applies back-pressure to the socket.
        let (event_tx, event_rx) = mpsc::channel(self.queue_capacity.saturating_mul(4));
        let task = tokio::spawn(pump(ws, cmd_rx, event_tx));

        Ok(TransportHandle {
            sender: TransportSender::new(cmd_tx),
            events: event_rx,
            task: Some(task.abort_handle()),
        })
    }
}

/// Shuttle commands to the socket and frames back until either side closes.
///
/// Always finishes by emitting exactly one [`TransportEvent::Closed`]
/// (unless the event receiver is already gone).
async fn pump(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut requested: Option<CloseInfo> = None;
    let mut commands_open = true;

    let close = loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => match cmd {
                Some(TransportCommand::Text(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        warn!(error = %e, "websocket send failed");
                        break requested.take().unwrap_or_else(|| CloseInfo::abnormal(e.to_string()));
                    }
                }
                Some(TransportCommand::Close { code, reason }) => {
                    debug!(code, %reason, "sending close frame");
                    let frame = CloseFrame { code: CloseCode::from(code), reason: reason.clone().into() };
                    requested = Some(CloseInfo::new(code, reason));
                    if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "close frame not sent");
                        break requested.take().unwrap_or_else(|| CloseInfo::abnormal(e.to_string()));
                    }
                }
                None => {
                    // Every sender dropped: close politely and keep reading until the echo.
                    commands_open = false;
                    let _ = ws_tx.close().await;
                    let _ = requested.get_or_insert_with(|| CloseInfo::new(1000, "client dropped"));
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if event_tx.send(TransportEvent::Frame(text.to_string())).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => {
                        if event_tx.send(TransportEvent::Frame(text)).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => debug!(len = bytes.len(), "ignoring non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.to_string()),
                        None => requested
                            .take()
                            .unwrap_or_else(|| CloseInfo::new(CLOSE_NO_STATUS, "")),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break requested.take().unwrap_or_else(|| CloseInfo::abnormal(e.to_string()));
                }
                None => {
                    break requested
                        .take()
                        .unwrap_or_else(|| CloseInfo::abnormal("connection closed without close frame"));
                }
            },
        }
    };

    // Flush any pending close reply; the peer may already be gone.
    let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, ws_tx.close()).await;
    debug!(code = close.code, reason = %close.reason, "websocket closed");
    let _ = event_tx.send(TransportEvent::Closed(close)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_capacity_is_at_least_one() {
        assert_eq!(WsConnector::new(0).queue_capacity, 1);
        assert_eq!(WsConnector::default().queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn refused_connection_is_open_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WsConnector::default()
            .open(&format!("ws://{addr}/ws"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Open(_)));
    }

    #[tokio::test]
    async fn malformed_url_is_open_error() {
        let err = WsConnector::default().open("not a url").await.unwrap_err();
        assert!(matches!(err, TransportError::Open(_)));
    }
}
