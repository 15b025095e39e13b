//! # kiosk-client
//!
//! Real-time connection to the market assistant backend.
//!
//! - **Connection**: [`ConnectionManager`] owns the lifecycle (connect,
//!   heartbeat, reconnect with backoff, teardown) and fans inbound events out
//!   to subscribers
//! - **Transport**: the [`Connector`](transport::Connector) seam, with a
//!   WebSocket implementation and an in-memory one for tests
//! - **Dashboard**: HTTP client for the search statistics endpoints

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dashboard;
pub mod transport;

pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionStatus, ListenerId, ListenerResult};
pub use dashboard::{DashboardClient, DashboardError};
pub use kiosk_core::errors::{ClientError, ConnectionState};
pub use kiosk_core::protocol::{ClientEvent, EventKind};

/// Install the global `tracing` subscriber described by the logging settings.
pub fn init_logging(settings: &kiosk_settings::LoggingSettings) {
    if settings.json {
        kiosk_core::logging::init_json_subscriber(&settings.level);
    } else {
        kiosk_core::logging::init_subscriber(&settings.level);
    }
}
