//! # kiosk-core
//!
//! Foundation types for the market assistant kiosk client.
//!
//! - **Protocol**: outbound frames, inbound frame parsing, the closed
//!   [`EventKind`](protocol::EventKind) set, and typed payloads
//! - **Errors**: [`ClientError`](errors::ClientError) taxonomy via `thiserror`
//! - **Backoff**: reconnect schedule with jitter
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod backoff;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod protocol;
