//! Connection lifecycle, dashboard, and logging settings.

use kiosk_core::backoff::{
    BackoffConfig, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_JITTER_MS, DEFAULT_MULTIPLIER,
};
use kiosk_core::constants::{CONNECT_TIMEOUT, HEARTBEAT_INTERVAL};
use serde::{Deserialize, Serialize};

/// Timers, reconnect policy, and queue sizing for the connection manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Open attempt timeout in ms.
    pub connect_timeout_ms: u64,
    /// Interval between pings in ms.
    pub heartbeat_interval_ms: u64,
    /// Reconnect attempts after an abnormal closure.
    pub max_reconnect_attempts: u32,
    /// Base reconnect delay in ms.
    pub base_backoff_ms: u64,
    /// Reconnect delay cap (before jitter) in ms.
    pub max_backoff_ms: u64,
    /// Growth factor per reconnect attempt.
    pub backoff_multiplier: f64,
    /// Additive reconnect jitter upper bound in ms.
    pub max_jitter_ms: u64,
    /// Frames buffered toward the transport before sends fail.
    pub outbound_queue_capacity: usize,
}

impl Default for ConnectionSettings {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            connect_timeout_ms: CONNECT_TIMEOUT.as_millis() as u64,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL.as_millis() as u64,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_DELAY_MS,
            max_backoff_ms: DEFAULT_MAX_DELAY_MS,
            backoff_multiplier: DEFAULT_MULTIPLIER,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
            outbound_queue_capacity: 64,
        }
    }
}

impl ConnectionSettings {
    /// Reconnect schedule described by these settings.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_attempts: self.max_reconnect_attempts,
            base_delay_ms: self.base_backoff_ms,
            max_delay_ms: self.max_backoff_ms,
            multiplier: self.backoff_multiplier,
            max_jitter_ms: self.max_jitter_ms,
        }
    }
}

/// Dashboard statistics client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardSettings {
    /// How many recent search logs to fetch.
    pub log_limit: u32,
    /// HTTP request timeout in ms.
    pub request_timeout_ms: u64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self { log_limit: 1000, request_timeout_ms: 10_000 }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
