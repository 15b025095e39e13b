//! # kiosk-settings
//!
//! Configuration management with layered sources for the kiosk client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`KioskSettings::default()`]
//! 2. **User file**: `~/.kiosk/settings.json` (overlaid onto the defaults)
//! 3. **Environment variables**: `KIOSK_*` overrides (highest priority)
//!
//! Settings are loaded explicitly and handed to whatever needs them; there
//! is no process-wide singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, load_settings, load_settings_from_path, overlay, settings_path};
pub use types::*;
