//! Connection manager: lifecycle, inbound dispatch, reconnection.
//!
//! One [`ConnectionManager`] owns one logical session with the backend. It
//! opens transports through a [`Connector`], decodes inbound frames and fans
//! them out to subscribers, keeps the link alive with pings, and reconnects
//! with backoff after abnormal closures.
//!
//! State transitions:
//!
//! ```text
//! Disconnected --connect()--> Connecting
//! Connecting --open ok--> Connected
//! Connecting --timeout/error--> Disconnected (connect() rejects)
//! Connected --clean close--> Disconnected
//! Connected --abnormal close, attempts remain--> Reconnecting
//! Connected --abnormal close, no attempts remain--> Failed
//! Reconnecting --backoff elapses--> Connecting
//! Failed --connect()--> Connecting
//! ```
//!
//! Lifecycle state lives behind one `parking_lot` mutex, the subscriber
//! registry behind another. Neither is held while subscribers run, so
//! subscribers may call back into the manager. Every transport gets a
//! generation number; events from a superseded transport are ignored.

use std::sync::{Arc, Weak};

use kiosk_core::constants::CLOSE_NORMAL;
use kiosk_core::errors::{ClientError, ConnectionState, Result, TransportError};
use kiosk_core::protocol::{
    ClientEvent, DisconnectInfo, EventKind, FrameBody, MalformedFrame, OutboundMessage, parse_frame,
};
use kiosk_settings::KioskSettings;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::heartbeat::run_heartbeat;
use super::registry::{self, ListenerId, ListenerResult, SubscriberRegistry};
use super::status::ConnectionStatus;
use crate::config::ClientConfig;
use crate::transport::websocket::WsConnector;
use crate::transport::{CloseInfo, Connector, TransportEvent, TransportHandle, TransportSender};

// ─────────────────────────────────────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnectOrigin {
    /// `connect()` called by the embedder.
    Caller,
    /// Fired by the reconnect timer.
    Retry,
}

/// The transport currently owned by the manager.
struct LiveTransport {
    sender: TransportSender,
    generation: u64,
    reader: Option<AbortHandle>,
    pump: Option<AbortHandle>,
}

impl LiveTransport {
    /// Ask for a clean close and stop reading. The transport task finishes the handshake.
    fn release(self, reason: &str) {
        if let Err(e) = self.sender.close(CLOSE_NORMAL, reason) {
            debug!(error = %e, "close request not delivered");
        }
        if let Some(reader) = self.reader {
            reader.abort();
        }
    }

    /// Tear everything down immediately.
    fn abort(self) {
        if let Err(e) = self.sender.close(CLOSE_NORMAL, "client dropped") {
            debug!(error = %e, "close request not delivered");
        }
        if let Some(reader) = self.reader {
            reader.abort();
        }
        if let Some(pump) = self.pump {
            pump.abort();
        }
    }
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    session_id: Option<String>,
    reconnect_attempts: u32,
    generation: u64,
    transport: Option<LiveTransport>,
    heartbeat: Option<CancellationToken>,
    reconnect_timer: Option<AbortHandle>,
}

impl Shared {
    fn stop_heartbeat(&mut self) {
        if let Some(token) = self.heartbeat.take() {
            token.cancel();
        }
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

/// What the reconnect policy decided after an abnormal closure.
enum ReconnectPlan {
    Scheduled,
    Exhausted { attempts: u32 },
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    shared: Mutex<Shared>,
    registry: Mutex<SubscriberRegistry>,
    status: watch::Sender<ConnectionStatus>,
    session: watch::Sender<Option<String>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public handle
// ─────────────────────────────────────────────────────────────────────────────

/// Manages the kiosk's real-time connection to the assistant backend.
///
/// Cheap to clone; clones share the same connection. Dropping the last clone
/// cancels every timer and closes the transport.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Manager using a custom connector.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                shared: Mutex::new(Shared::default()),
                registry: Mutex::new(SubscriberRegistry::new()),
                status,
                session,
            }),
        }
    }

    /// Manager speaking WebSocket.
    pub fn websocket(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(WsConnector::default()))
    }

    /// WebSocket manager configured from loaded settings.
    pub fn from_settings(settings: &KioskSettings) -> Self {
        Self::new(
            ClientConfig::from_settings(settings),
            Arc::new(WsConnector::new(settings.connection.outbound_queue_capacity)),
        )
    }

    /// Open the connection.
    ///
    /// Valid from `Disconnected` or `Failed`. Resolves with the session id
    /// held when the transport opened (usually none yet: the server assigns
    /// it in its first frame, see [`Self::wait_for_session`]). Rejects on
    /// transport errors and after the connect timeout, leaving the manager
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<Option<String>> {
        self.inner.connect(ConnectOrigin::Caller).await
    }

    /// Request a clean close (code 1000). Ignored unless connected.
    pub fn disconnect(&self) {
        let shared = self.inner.shared.lock();
        if shared.state != ConnectionState::Connected {
            debug!(state = %shared.state, "disconnect ignored");
            return;
        }
        if let Some(live) = &shared.transport {
            info!("closing connection");
            if let Err(e) = live.sender.close(CLOSE_NORMAL, "client disconnect") {
                warn!(error = %e, "failed to request close");
            }
        }
    }

    /// Stop everything: timers, heartbeat, and the transport. Ends `Disconnected`.
    pub fn shutdown(&self) {
        let mut shared = self.inner.shared.lock();
        shared.cancel_reconnect_timer();
        shared.stop_heartbeat();
        if let Some(live) = shared.transport.take() {
            live.release("shutdown");
        }
        shared.generation += 1;
        shared.session_id = None;
        let _ = self.inner.session.send_replace(None);
        self.inner.set_status(&mut shared, ConnectionStatus::Disconnected);
        info!("connection manager shut down");
    }

    /// Send a typed query.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.inner.send(&OutboundMessage::Text { content: text.into() })
    }

    /// Send recorded audio, already base64-encoded.
    pub fn send_audio(&self, base64: impl Into<String>) -> Result<()> {
        self.inner.send(&OutboundMessage::Audio { content: base64.into() })
    }

    /// Send recorded audio from raw bytes.
    pub fn send_audio_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.inner.send(&OutboundMessage::audio_from_bytes(bytes))
    }

    /// Subscribe to events of `kind`. Listeners run in registration order.
    pub fn add_listener<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ClientEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.registry.lock().add(kind, Arc::new(listener))
    }

    /// Subscribe by wire tag. Unknown tags are rejected (logged, `None`).
    pub fn add_listener_for_tag<F>(&self, tag: &str, listener: F) -> Option<ListenerId>
    where
        F: Fn(&ClientEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.registry.lock().add_by_tag(tag, Arc::new(listener))
    }

    /// Unsubscribe. Removing an absent handle is a no-op returning `false`.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.registry.lock().remove(kind, id)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Session id assigned by the server, if any.
    pub fn session_id(&self) -> Option<String> {
        self.inner.shared.lock().session_id.clone()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect_attempts
    }

    /// Current status indicator value.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch the status indicator.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Resolve once the server has assigned a session id.
    pub async fn wait_for_session(&self) -> Option<String> {
        let mut rx = self.inner.session.subscribe();
        let session = rx.wait_for(Option::is_some).await.ok()?.clone();
        session
    }

    /// Endpoint this manager dials.
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

impl Inner {
    fn set_status(&self, shared: &mut Shared, status: ConnectionStatus) {
        shared.state = status.state();
        let _ = self.status.send_replace(status);
    }

    async fn connect(self: &Arc<Self>, origin: ConnectOrigin) -> Result<Option<String>> {
        let generation = {
            let mut shared = self.shared.lock();
            let allowed = match origin {
                ConnectOrigin::Caller => matches!(
                    shared.state,
                    ConnectionState::Disconnected | ConnectionState::Failed
                ),
                ConnectOrigin::Retry => shared.state == ConnectionState::Reconnecting,
            };
            if !allowed {
                return Err(ClientError::InvalidState { state: shared.state, operation: "connect" });
            }
            if let Some(stale) = shared.transport.take() {
                stale.release("superseded");
            }
            shared.generation += 1;
            self.set_status(&mut shared, ConnectionStatus::Connecting);
            shared.generation
        };
        info!(url = %self.config.url, ?origin, "connecting");

        // The attempt runs on its own task so the timeout settles the state
        // even if the caller stops polling `connect()`.
        let attempt = tokio::spawn(Arc::clone(self).open_attempt(origin, generation));
        match attempt.await {
            Ok(result) => result,
            Err(e) => Err(ClientError::TransportOpen {
                url: self.config.url.clone(),
                source: TransportError::Open(e.to_string()),
            }),
        }
    }

    async fn open_attempt(self: Arc<Self>, origin: ConnectOrigin, generation: u64) -> Result<Option<String>> {
        let opened = time::timeout(self.config.connect_timeout, self.connector.open(&self.config.url)).await;
        match opened {
            Ok(Ok(handle)) => self.on_open(handle, generation),
            Ok(Err(source)) => self.on_open_failed(
                ClientError::TransportOpen { url: self.config.url.clone(), source },
                origin,
                generation,
            ),
            Err(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.config.connect_timeout.as_millis() as u64;
                self.on_open_failed(
                    ClientError::ConnectionTimeout { url: self.config.url.clone(), timeout_ms },
                    origin,
                    generation,
                )
            }
        }
    }

    fn on_open(self: &Arc<Self>, handle: TransportHandle, generation: u64) -> Result<Option<String>> {
        let TransportHandle { sender, events, task } = handle;
        let session_id = {
            let mut shared = self.shared.lock();
            if shared.generation != generation || shared.state != ConnectionState::Connecting {
                let state = shared.state;
                drop(shared);
                debug!(%state, "open completed after the attempt was superseded");
                let _ = sender.close(CLOSE_NORMAL, "superseded");
                return Err(ClientError::InvalidState { state, operation: "complete connect" });
            }

            shared.reconnect_attempts = 0;
            shared.stop_heartbeat();
            let token = CancellationToken::new();
            let heartbeat = run_heartbeat(sender.clone(), self.config.heartbeat_interval, token.clone());
            let _ = tokio::spawn(async move {
                let result = heartbeat.await;
                debug!(?result, "heartbeat stopped");
            });
            shared.heartbeat = Some(token);
            shared.transport = Some(LiveTransport { sender, generation, reader: None, pump: task });
            self.set_status(&mut shared, ConnectionStatus::Connected);
            shared.session_id.clone()
        };
        info!(session_id = ?session_id, "connected");
        self.dispatch(ClientEvent::Connect { session_id: session_id.clone() });

        // Reading starts after `connect` subscribers ran, so they see it first.
        let reader = tokio::spawn(read_loop(Arc::downgrade(self), events, generation));
        let mut shared = self.shared.lock();
        match shared.transport.as_mut() {
            Some(live) if live.generation == generation => live.reader = Some(reader.abort_handle()),
            _ => reader.abort(),
        }
        Ok(session_id)
    }

    fn on_open_failed(
        self: &Arc<Self>,
        error: ClientError,
        origin: ConnectOrigin,
        generation: u64,
    ) -> Result<Option<String>> {
        let mut shared = self.shared.lock();
        if shared.generation != generation || shared.state != ConnectionState::Connecting {
            return Err(error);
        }
        let plan = match origin {
            ConnectOrigin::Caller => {
                self.set_status(&mut shared, ConnectionStatus::Disconnected);
                None
            }
            ConnectOrigin::Retry => Some(self.schedule_reconnect(&mut shared)),
        };
        drop(shared);

        warn!(error = %error, code = error.code(), ?origin, "connection attempt failed");
        self.dispatch(ClientEvent::error("Connection error", error.to_string()));
        if let Some(plan) = plan {
            self.after_plan(plan);
        }
        Err(error)
    }

    fn handle_close(self: &Arc<Self>, close: CloseInfo, generation: u64) {
        let mut shared = self.shared.lock();
        if !shared.transport.as_ref().is_some_and(|t| t.generation == generation) {
            debug!(code = close.code, "ignoring close of superseded transport");
            return;
        }
        drop(shared.transport.take());
        shared.stop_heartbeat();

        let clean = close.is_clean();
        let info = DisconnectInfo { code: close.code, reason: close.reason, clean };
        if info.clean {
            shared.session_id = None;
            let _ = self.session.send_replace(None);
            self.set_status(&mut shared, ConnectionStatus::Disconnected);
            drop(shared);
            info!(code = info.code, reason = %info.reason, "connection closed");
            self.dispatch(ClientEvent::Disconnect(info));
        } else {
            let plan = self.schedule_reconnect(&mut shared);
            drop(shared);
            warn!(code = info.code, reason = %info.reason, "connection lost");
            self.dispatch(ClientEvent::Disconnect(info));
            self.after_plan(plan);
        }
    }

    /// Apply the reconnect policy. Must be called with the state lock held.
    fn schedule_reconnect(self: &Arc<Self>, shared: &mut Shared) -> ReconnectPlan {
        shared.cancel_reconnect_timer();
        let max_attempts = self.config.backoff.max_attempts;
        if shared.reconnect_attempts >= max_attempts {
            shared.session_id = None;
            let _ = self.session.send_replace(None);
            self.set_status(shared, ConnectionStatus::Failed);
            return ReconnectPlan::Exhausted { attempts: shared.reconnect_attempts };
        }

        shared.reconnect_attempts += 1;
        let attempt = shared.reconnect_attempts;
        let delay = self.config.backoff.delay_for(attempt);
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            inner.shared.lock().reconnect_timer = None;
            if let Err(error) = inner.connect(ConnectOrigin::Retry).await {
                debug!(attempt, error = %error, "reconnect attempt did not connect");
            }
        });
        shared.reconnect_timer = Some(timer.abort_handle());
        self.set_status(shared, ConnectionStatus::Reconnecting { attempt, max_attempts, delay });
        #[allow(clippy::cast_possible_truncation)]
        let delay_ms = delay.as_millis() as u64;
        info!(attempt, max_attempts, delay_ms, "reconnect scheduled");
        ReconnectPlan::Scheduled
    }

    fn after_plan(&self, plan: ReconnectPlan) {
        if let ReconnectPlan::Exhausted { attempts } = plan {
            let err = ClientError::ReconnectExhausted { attempts };
            error!(attempts, code = err.code(), "giving up on reconnecting");
            self.dispatch(ClientEvent::error("Reconnection failed", err.to_string()));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────────────

    fn send(&self, message: &OutboundMessage) -> Result<()> {
        let sender = {
            let shared = self.shared.lock();
            match (&shared.transport, shared.state) {
                (Some(live), ConnectionState::Connected) => live.sender.clone(),
                (_, state) => return Err(ClientError::SendWhileDisconnected { state }),
            }
        };
        let json = message.to_json()?;
        sender.send_text(json).map_err(ClientError::Send)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────

    fn is_current(&self, generation: u64) -> bool {
        self.shared
            .lock()
            .transport
            .as_ref()
            .is_some_and(|t| t.generation == generation)
    }

    fn handle_frame(&self, text: &str, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(MalformedFrame { client_id, error }) => {
                if let Some(id) = client_id {
                    self.adopt_session_id(id);
                }
                let err = ClientError::from(error);
                warn!(error = %err, len = text.len(), "dropping malformed frame");
                self.dispatch(ClientEvent::error("Error parsing message", err.to_string()));
                return;
            }
        };

        if let Some(id) = frame.client_id {
            self.adopt_session_id(id);
        }
        match frame.body {
            FrameBody::Untyped => trace!("frame without type"),
            FrameBody::Event(event) => self.dispatch(event),
            FrameBody::Control(kind) => debug!(?kind, "control frame"),
            FrameBody::Unrecognized(tag) => warn!(%tag, "ignoring frame with unrecognised type"),
        }
    }

    fn adopt_session_id(&self, id: String) {
        let mut shared = self.shared.lock();
        match &shared.session_id {
            None => {
                info!(session_id = %id, "session assigned");
                let _ = self.session.send_replace(Some(id.clone()));
                shared.session_id = Some(id);
            }
            Some(current) if *current != id => {
                debug!(%current, offered = %id, "keeping existing session id");
            }
            Some(_) => {}
        }
    }

    fn dispatch(&self, event: ClientEvent) {
        let kind = event.kind();
        let listeners = self.registry.lock().snapshot(kind);
        if listeners.is_empty() {
            trace!(%kind, "no listeners");
            return;
        }
        let failures = registry::invoke(&listeners, &event);
        // Failures while reporting an error are only logged.
        if kind == EventKind::Error {
            return;
        }
        for failure in failures {
            let err = ClientError::Subscriber { kind, message: failure.message };
            self.dispatch(ClientEvent::error("Listener error", err.to_string()));
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut();
        shared.cancel_reconnect_timer();
        shared.stop_heartbeat();
        if let Some(live) = shared.transport.take() {
            live.abort();
        }
    }
}

/// Feed one transport's events into the manager, in order.
async fn read_loop(weak: Weak<Inner>, mut events: mpsc::Receiver<TransportEvent>, generation: u64) {
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else { return };
        match event {
            TransportEvent::Frame(text) => inner.handle_frame(&text, generation),
            TransportEvent::Closed(close) => {
                inner.handle_close(close, generation);
                return;
            }
        }
    }
    if let Some(inner) = weak.upgrade() {
        inner.handle_close(CloseInfo::abnormal("transport ended without close"), generation);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryConnector, MemoryPeer};
    use assert_matches::assert_matches;

    fn manager() -> (ConnectionManager, MemoryConnector, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (connector, peers) = MemoryConnector::new();
        let manager = ConnectionManager::new(ClientConfig::default(), Arc::new(connector.clone()));
        (manager, connector, peers)
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let (manager, _, _) = manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(manager.session_id().is_none());
        assert_eq!(manager.url(), "ws://localhost:8101/ws");
    }

    #[tokio::test]
    async fn send_before_connect_fails_without_opening() {
        let (manager, connector, _) = manager();
        assert_matches!(
            manager.send_text("latte"),
            Err(ClientError::SendWhileDisconnected { state: ConnectionState::Disconnected })
        );
        assert_matches!(manager.send_audio("AA=="), Err(ClientError::SendWhileDisconnected { .. }));
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test]
    async fn connect_then_connect_again_is_rejected() {
        let (manager, _, _peers) = manager();
        assert_eq!(manager.connect().await.unwrap(), None);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_matches!(
            manager.connect().await,
            Err(ClientError::InvalidState { state: ConnectionState::Connected, .. })
        );
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_ignored() {
        let (manager, _, _) = manager();
        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_sends_clean_close() {
        let (manager, _, mut peers) = manager();
        let _ = manager.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        manager.shutdown();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_matches!(
            peer.next_command().await,
            Some(crate::transport::TransportCommand::Close { code: 1000, .. })
        );
    }

    #[tokio::test]
    async fn remove_listener_reports_presence() {
        let (manager, _, _) = manager();
        let id = manager.add_listener(EventKind::Error, |_| Ok(()));
        assert!(manager.remove_listener(EventKind::Error, id));
        assert!(!manager.remove_listener(EventKind::Error, id));
        assert!(manager.add_listener_for_tag("bogus", |_| Ok(())).is_none());
    }

    #[tokio::test]
    async fn debug_output_names_url_and_state() {
        let (manager, _, _) = manager();
        let debug = format!("{manager:?}");
        assert!(debug.contains("ws://localhost:8101/ws"));
        assert!(debug.contains("Disconnected"));
    }
}
