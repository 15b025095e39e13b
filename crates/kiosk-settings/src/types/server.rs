//! Backend address settings.

use kiosk_core::constants::{DEFAULT_PORT, WS_PATH};
use serde::{Deserialize, Serialize};

/// Where the assistant backend lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Backend host name.
    pub host: String,
    /// Backend port.
    pub port: u16,
    /// Use `wss`/`https` instead of `ws`/`http`.
    pub secure: bool,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            secure: false,
            ws_path: WS_PATH.to_string(),
        }
    }
}

impl ServerSettings {
    /// Base WebSocket address, without the endpoint path.
    pub fn ws_base_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Full WebSocket endpoint URL.
    pub fn ws_url(&self) -> String {
        format!("{}{}", self.ws_base_url(), self.ws_path)
    }

    /// Base HTTP address for the dashboard endpoints.
    pub fn http_base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}
