//! Keep-alive pings while connected.

use std::time::Duration;

use kiosk_core::protocol::OutboundMessage;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::TransportSender;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// A ping could not be queued; the heartbeat stopped.
    SendFailed,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Send a `ping` frame every `interval` until cancelled or a send fails.
///
/// The first ping goes out one full interval after start. A failed send ends
/// the loop without touching the connection: closure detection belongs to
/// the transport.
pub async fn run_heartbeat(
    sender: TransportSender,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let ping = match OutboundMessage::Ping.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to encode ping");
            return HeartbeatResult::SendFailed;
        }
    };
    let mut ticker = time::interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sender.send_text(ping.clone()) {
                    warn!(error = %e, "heartbeat send failed, stopping heartbeat");
                    return HeartbeatResult::SendFailed;
                }
                debug!("heartbeat ping sent");
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
