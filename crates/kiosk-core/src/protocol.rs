//! Wire protocol between the kiosk and the assistant backend.
//!
//! Every frame is a JSON object sent as a WebSocket text frame.
//!
//! Outbound frames ([`OutboundMessage`]):
//! - `{"type":"text","content":"..."}` for typed queries
//! - `{"type":"audio","content":"<base64>"}` for recorded speech
//! - `{"type":"ping"}` for keep-alive
//!
//! Inbound frames may carry a `client_id` (the session identifier assigned
//! by the server) and/or a `type` tag. Valid JSON that is not an object, and
//! a `client_id` that is not a string, are tolerated and read as absent.
//! [`parse_frame`] turns raw text into a [`ParsedFrame`] whose body is one of:
//! - a typed [`ClientEvent`] for the subscribable response kinds
//! - a recognised server control frame ([`ControlKind`])
//! - an unrecognised tag
//! - nothing at all (welcome frames carrying only `client_id`)

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Event kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of event kinds subscribers can register for.
///
/// The first five arrive from the server; `Connect` and `Disconnect` are
/// raised locally by the connection manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Assistant text reply.
    TextResponse,
    /// Assistant spoken reply (text plus synthesized audio).
    AudioResponse,
    /// Assistant activity indicator.
    EventResponse,
    /// Product table and optional recipe.
    TableResponse,
    /// Server-reported or locally synthesized error.
    Error,
    /// Transport opened.
    Connect,
    /// Transport closed.
    Disconnect,
}

impl EventKind {
    /// Every kind, in wire-tag order.
    pub const ALL: [EventKind; 7] = [
        EventKind::TextResponse,
        EventKind::AudioResponse,
        EventKind::EventResponse,
        EventKind::TableResponse,
        EventKind::Error,
        EventKind::Connect,
        EventKind::Disconnect,
    ];

    /// Wire tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextResponse => "text_response",
            Self::AudioResponse => "audio_response",
            Self::EventResponse => "event_response",
            Self::TableResponse => "table_response",
            Self::Error => "error",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
        }
    }

    /// Whether frames of this kind are accepted from the server.
    pub fn is_server_sent(self) -> bool {
        !matches!(self, Self::Connect | Self::Disconnect)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type tag outside the closed [`EventKind`] set.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A frame sent from the kiosk to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Typed user query.
    Text {
        /// Query text.
        content: String,
    },
    /// Recorded speech.
    Audio {
        /// Base64-encoded audio.
        content: String,
    },
    /// Keep-alive.
    Ping,
}

impl OutboundMessage {
    /// Build an audio frame from raw bytes.
    pub fn audio_from_bytes(bytes: &[u8]) -> Self {
        Self::Audio { content: STANDARD.encode(bytes) }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound payloads
// ─────────────────────────────────────────────────────────────────────────────

/// What the assistant is doing, carried by `event_response`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssistantActivity {
    /// The backend is working on a query.
    Processing,
    /// The backend has started answering.
    Replying,
    /// The backend could not find anything for the query.
    ErrorNotFound,
    /// Any other activity string.
    Other(String),
}

impl AssistantActivity {
    /// Decode an activity string.
    pub fn from_content(content: &str) -> Self {
        match content {
            "processing" => Self::Processing,
            "replying" => Self::Replying,
            "errornotfound" => Self::ErrorNotFound,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Processing => "processing",
            Self::Replying => "replying",
            Self::ErrorNotFound => "errornotfound",
            Self::Other(s) => s,
        }
    }

    /// Whether the kiosk should show its busy state.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Processing)
    }
}

/// Where a product sits in the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLocation {
    /// Aisle identifier.
    #[serde(default)]
    pub aisle: String,
    /// Department.
    #[serde(default)]
    pub section: String,
    /// Shelf within the aisle.
    #[serde(default)]
    pub shelf: String,
}

/// One row of a product table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Store location, if known.
    #[serde(default)]
    pub location: Option<ProductLocation>,
    /// Recipe quantity, for ingredient rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Unit for `quantity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Remaining fields (details, brand, ...) preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    /// Aisle identifier, when non-empty.
    pub fn aisle(&self) -> Option<&str> {
        self.location
            .as_ref()
            .map(|l| l.aisle.as_str())
            .filter(|a| !a.is_empty())
    }
}

/// Recipe heading shown above an ingredient table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe title.
    #[serde(default)]
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
}

/// Content of a `table_response` frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableContent {
    /// Products to list.
    #[serde(default)]
    pub products: Vec<Product>,
    /// Recipe heading, for recipe searches.
    #[serde(default)]
    pub recipe: Option<Recipe>,
}

impl TableContent {
    /// The kiosk only shows the table when there is at least one product.
    pub fn has_products(&self) -> bool {
        !self.products.is_empty()
    }

    /// Distinct non-empty aisles, in first-seen order.
    pub fn unique_aisles(&self) -> Vec<&str> {
        let mut aisles: Vec<&str> = Vec::new();
        for aisle in self.products.iter().filter_map(Product::aisle) {
            if !aisles.contains(&aisle) {
                aisles.push(aisle);
            }
        }
        aisles
    }
}

/// Content of an `audio_response` frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioResponse {
    /// Transcript of the spoken reply.
    pub text: String,
    /// Base64-encoded WAV audio, if synthesis succeeded.
    pub audio: Option<String>,
}

impl AudioResponse {
    /// A `data:` URL suitable for an audio element.
    pub fn data_url(&self) -> Option<String> {
        self.audio
            .as_ref()
            .map(|b64| format!("data:audio/wav;base64,{b64}"))
    }

    /// Decode the audio payload to raw bytes.
    pub fn decode_audio(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.audio.as_ref().map(|b64| STANDARD.decode(b64))
    }
}

/// Payload of an `error` event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Human-readable message.
    pub message: String,
    /// Extra diagnostic detail (parse error, failing listener, ...).
    pub details: Option<String>,
}

impl ErrorPayload {
    /// Error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), details: None }
    }

    /// Attach diagnostic detail.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Why and how a transport closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason text (may be empty).
    pub reason: String,
    /// Whether the closure was clean (1000/1001).
    pub clean: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client events
// ─────────────────────────────────────────────────────────────────────────────

/// An event delivered to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// `text_response`.
    TextResponse {
        /// Reply text.
        content: String,
    },
    /// `audio_response`.
    AudioResponse(AudioResponse),
    /// `event_response`.
    EventResponse(AssistantActivity),
    /// `table_response`.
    TableResponse(TableContent),
    /// `error`, from the server or synthesized locally.
    Error(ErrorPayload),
    /// The transport opened.
    Connect {
        /// Session id held at the moment of opening.
        session_id: Option<String>,
    },
    /// The transport closed.
    Disconnect(DisconnectInfo),
}

impl ClientEvent {
    /// The kind this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TextResponse { .. } => EventKind::TextResponse,
            Self::AudioResponse(_) => EventKind::AudioResponse,
            Self::EventResponse(_) => EventKind::EventResponse,
            Self::TableResponse(_) => EventKind::TableResponse,
            Self::Error(_) => EventKind::Error,
            Self::Connect { .. } => EventKind::Connect,
            Self::Disconnect(_) => EventKind::Disconnect,
        }
    }

    /// Shorthand for a locally raised error event.
    pub fn error(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Error(ErrorPayload::new(message).with_details(details))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Server keep-alive and diagnostics frames. Never delivered to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    /// Reply to our `ping`.
    Pong,
    /// Server-initiated heartbeat.
    Heartbeat,
    /// Reply to a heartbeat.
    HeartbeatAck,
    /// Server liveness probe.
    ConnectionCheck,
}

impl ControlKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "pong" => Some(Self::Pong),
            "heartbeat" => Some(Self::Heartbeat),
            "heartbeat_ack" => Some(Self::HeartbeatAck),
            "connection_check" => Some(Self::ConnectionCheck),
            _ => None,
        }
    }
}

/// What an inbound frame asks the client to do.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameBody {
    /// No `type` tag: nothing to deliver.
    Untyped,
    /// A subscribable event.
    Event(ClientEvent),
    /// A server control frame.
    Control(ControlKind),
    /// A `type` tag outside the accepted set.
    Unrecognized(String),
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFrame {
    /// Session identifier carried by the frame, if any.
    pub client_id: Option<String>,
    /// What to do with the rest of the frame.
    pub body: FrameBody,
}

/// Why an inbound frame could not be decoded.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// A field had the wrong JSON type.
    #[error("field `{field}` must be a {expected}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
    },
    /// The `content` of a typed frame did not match its kind.
    #[error("invalid {kind} content: {source}")]
    InvalidContent {
        /// Kind whose content failed to decode.
        kind: EventKind,
        /// Decode failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A frame that could not be decoded.
///
/// Keeps the `client_id` when the frame got far enough to carry one, so the
/// session can still be adopted.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct MalformedFrame {
    /// Session identifier carried by the frame, if any.
    pub client_id: Option<String>,
    /// Why decoding failed.
    pub error: FrameError,
}

impl From<FrameError> for MalformedFrame {
    fn from(error: FrameError) -> Self {
        Self { client_id: None, error }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, FrameError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(FrameError::InvalidField { field, expected: "string" }),
    }
}

fn client_id_field(object: &Map<String, Value>) -> Option<String> {
    match object.get("client_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id.clone()),
        Some(other) => {
            warn!(found = json_type_name(other), "ignoring non-string client_id");
            None
        }
    }
}

fn string_content(object: &Map<String, Value>, kind: EventKind) -> Result<String, FrameError> {
    let content = object.get("content").cloned().unwrap_or(Value::Null);
    serde_json::from_value(content).map_err(|source| FrameError::InvalidContent { kind, source })
}

/// Parse one inbound text frame.
///
/// Only invalid JSON and typed frames with a wrongly shaped field fail.
pub fn parse_frame(text: &str) -> Result<ParsedFrame, MalformedFrame> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
    let object = match value {
        Value::Object(object) => object,
        other => {
            debug!(found = json_type_name(&other), "non-object frame read as untyped");
            return Ok(ParsedFrame { client_id: None, body: FrameBody::Untyped });
        }
    };

    let client_id = client_id_field(&object);
    match decode_body(&object) {
        Ok(body) => Ok(ParsedFrame { client_id, body }),
        Err(error) => Err(MalformedFrame { client_id, error }),
    }
}

fn decode_body(object: &Map<String, Value>) -> Result<FrameBody, FrameError> {
    let Some(tag) = optional_string(object, "type")? else {
        return Ok(FrameBody::Untyped);
    };

    if let Some(control) = ControlKind::from_tag(&tag) {
        return Ok(FrameBody::Control(control));
    }

    let kind = match tag.parse::<EventKind>() {
        Ok(kind) if kind.is_server_sent() => kind,
        _ => return Ok(FrameBody::Unrecognized(tag)),
    };

    let event = match kind {
        EventKind::TextResponse => ClientEvent::TextResponse {
            content: string_content(object, kind)?,
        },
        EventKind::EventResponse => {
            ClientEvent::EventResponse(AssistantActivity::from_content(&string_content(object, kind)?))
        }
        EventKind::AudioResponse => ClientEvent::AudioResponse(AudioResponse {
            text: string_content(object, kind)?,
            audio: optional_string(object, "audio")?,
        }),
        EventKind::TableResponse => {
            let content = object.get("content").cloned().unwrap_or(Value::Null);
            let table: TableContent = serde_json::from_value(content)
                .map_err(|source| FrameError::InvalidContent { kind, source })?;
            ClientEvent::TableResponse(table)
        }
        EventKind::Error => {
            let message = optional_string(object, "content")?
                .or(optional_string(object, "error")?)
                .unwrap_or_else(|| "unknown error".to_string());
            ClientEvent::Error(ErrorPayload::new(message))
        }
        EventKind::Connect | EventKind::Disconnect => return Ok(FrameBody::Unrecognized(tag)),
    };

    Ok(FrameBody::Event(event))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
