//! Package-level constants.

use std::time::Duration;

/// Current version of the kiosk client (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "kiosk";

/// Path of the assistant WebSocket endpoint, appended to the base address.
pub const WS_PATH: &str = "/ws";

/// Default assistant backend port.
pub const DEFAULT_PORT: u16 = 8101;

/// How long an open attempt may take before it is abandoned.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between `ping` frames while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Endpoint going away (page unload, server restart with notice).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Closed without a status code in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Whether a close code ends the session cleanly (no reconnect).
pub fn is_clean_close(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY)
}
