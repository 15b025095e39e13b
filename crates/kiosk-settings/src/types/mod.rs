//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the keys it changes.

mod connection;
mod server;

pub use connection::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the kiosk client.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "host": "10.0.0.5", "port": 8101 },
///   "connection": { "maxReconnectAttempts": 8 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KioskSettings {
    /// Backend address.
    pub server: ServerSettings,
    /// Connection lifecycle.
    pub connection: ConnectionSettings,
    /// Dashboard statistics client.
    pub dashboard: DashboardSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl KioskSettings {
    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.connection;
        if c.connect_timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.connectTimeoutMs", "must be positive"));
        }
        if c.heartbeat_interval_ms == 0 {
            return Err(SettingsError::invalid("connection.heartbeatIntervalMs", "must be positive"));
        }
        if !c.backoff_multiplier.is_finite() || c.backoff_multiplier < 1.0 {
            return Err(SettingsError::invalid("connection.backoffMultiplier", "must be at least 1"));
        }
        if c.outbound_queue_capacity == 0 {
            return Err(SettingsError::invalid("connection.outboundQueueCapacity", "must be positive"));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::invalid(
                "server.wsPath",
                format!("{:?} does not start with '/'", self.server.ws_path),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        KioskSettings::default().validate().unwrap();
    }

    #[test]
    fn serde_roundtrip_uses_camel_case() {
        let json = serde_json::to_value(KioskSettings::default()).unwrap();
        assert_eq!(json["server"]["wsPath"], "/ws");
        assert_eq!(json["connection"]["maxReconnectAttempts"], 5);
        assert_eq!(json["dashboard"]["logLimit"], 1000);
        let back: KioskSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, KioskSettings::default());
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let mut settings = KioskSettings::default();
        settings.connection.heartbeat_interval_ms = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { field: "connection.heartbeatIntervalMs", .. })
        ));
    }

    #[test]
    fn shrinking_multiplier_rejected() {
        let mut settings = KioskSettings::default();
        settings.connection.backoff_multiplier = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn relative_ws_path_rejected() {
        let mut settings = KioskSettings::default();
        settings.server.ws_path = "ws".into();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("wsPath"));
    }
}
