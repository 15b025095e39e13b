//! Connection manager configuration.

use std::time::Duration;

use kiosk_core::backoff::BackoffConfig;
use kiosk_core::constants::{CONNECT_TIMEOUT, HEARTBEAT_INTERVAL, WS_PATH};
use kiosk_settings::KioskSettings;

/// Everything the connection manager needs to know up front.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Full endpoint URL, e.g. `ws://localhost:8101/ws`.
    pub url: String,
    /// Open attempts are abandoned after this long.
    pub connect_timeout: Duration,
    /// Interval between pings while connected.
    pub heartbeat_interval: Duration,
    /// Reconnect schedule.
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("ws://localhost:8101")
    }
}

impl ClientConfig {
    /// Configuration for a backend at `base_url` with default timers.
    ///
    /// The endpoint path `/ws` is appended to the base address.
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            url: format!("{}{WS_PATH}", base_url.as_ref().trim_end_matches('/')),
            connect_timeout: CONNECT_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            backoff: BackoffConfig::default(),
        }
    }

    /// Configuration described by loaded settings.
    pub fn from_settings(settings: &KioskSettings) -> Self {
        let connection = &settings.connection;
        Self {
            url: settings.server.ws_url(),
            connect_timeout: Duration::from_millis(connection.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(connection.heartbeat_interval_ms),
            backoff: connection.backoff(),
        }
    }

    /// Override the reconnect schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_ws_path() {
        assert_eq!(ClientConfig::new("ws://kiosk:8101").url, "ws://kiosk:8101/ws");
        assert_eq!(ClientConfig::new("ws://kiosk:8101/").url, "ws://kiosk:8101/ws");
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "ws://localhost:8101/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(config.backoff.max_attempts, 5);
    }

    #[test]
    fn from_settings_maps_every_field() {
        let mut settings = KioskSettings::default();
        settings.server.host = "10.1.2.3".into();
        settings.server.secure = true;
        settings.connection.connect_timeout_ms = 2000;
        settings.connection.heartbeat_interval_ms = 5000;
        settings.connection.max_reconnect_attempts = 9;

        let config = ClientConfig::from_settings(&settings);
        assert_eq!(config.url, "wss://10.1.2.3:8101/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.backoff.max_attempts, 9);
    }
}
