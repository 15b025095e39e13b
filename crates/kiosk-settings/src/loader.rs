//! Layered settings loading.
//!
//! Precedence, lowest first: compiled defaults, the user file
//! (`~/.kiosk/settings.json`), then `KIOSK_*` environment variables. The
//! result is validated before it is returned.
//!
//! The user file is overlaid onto the defaults as JSON: nested objects merge
//! key by key, anything else (arrays included) replaces what was there, and
//! `null` leaves the existing value alone.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::{Result, SettingsError};
use crate::types::KioskSettings;

const SETTINGS_DIR: &str = ".kiosk";
const SETTINGS_FILE: &str = "settings.json";

/// Location of the user settings file.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(std::env::temp_dir, PathBuf::from);
    home.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Load settings from [`settings_path`], applying environment overrides.
pub fn load_settings() -> Result<KioskSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path`, applying environment overrides.
///
/// A missing file means defaults. An unreadable or malformed file, or values
/// that fail [`KioskSettings::validate`], are errors.
pub fn load_settings_from_path(path: &Path) -> Result<KioskSettings> {
    load_layers(path, |name| std::env::var(name).ok())
}

fn load_layers(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<KioskSettings> {
    let mut document = serde_json::to_value(KioskSettings::default())?;
    if let Some(user) = read_user_file(path)? {
        overlay(&mut document, user);
    }

    let mut settings: KioskSettings = serde_json::from_value(document)?;
    let applied = override_from(&mut settings, env);
    if applied > 0 {
        debug!(applied, "environment overrides applied");
    }
    settings.validate()?;
    info!(url = %settings.server.ws_url(), "settings loaded");
    Ok(settings)
}

fn read_user_file(path: &Path) -> Result<Option<Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(None);
        }
        Err(source) => return Err(SettingsError::Read { path: path.to_path_buf(), source }),
    };
    let value = serde_json::from_str(&content)
        .map_err(|source| SettingsError::Parse { path: path.to_path_buf(), source })?;
    debug!(path = %path.display(), "settings file read");
    Ok(Some(value))
}

/// Overlay `patch` onto `base` in place.
pub fn overlay(base: &mut Value, patch: Value) {
    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `KIOSK_*` environment variables to `settings`.
///
/// Unparseable or out-of-range values are skipped with a warning; the value
/// from the file or defaults stays in place.
pub fn apply_env_overrides(settings: &mut KioskSettings) {
    let _ = override_from(settings, |name| std::env::var(name).ok());
}

/// Returns how many overrides took effect.
fn override_from(settings: &mut KioskSettings, env: impl Fn(&str) -> Option<String>) -> usize {
    let vars = Vars { env, applied: std::cell::Cell::new(0) };
    let server = &mut settings.server;
    vars.text("KIOSK_HOST", &mut server.host);
    vars.number("KIOSK_PORT", 1..=u16::MAX, &mut server.port);
    vars.flag("KIOSK_SECURE", &mut server.secure);
    vars.text("KIOSK_WS_PATH", &mut server.ws_path);

    let connection = &mut settings.connection;
    vars.number("KIOSK_CONNECT_TIMEOUT_MS", 100..=600_000, &mut connection.connect_timeout_ms);
    vars.number("KIOSK_HEARTBEAT_INTERVAL_MS", 1000..=600_000, &mut connection.heartbeat_interval_ms);
    vars.number("KIOSK_MAX_RECONNECT_ATTEMPTS", 0..=1000, &mut connection.max_reconnect_attempts);
    vars.number("KIOSK_BASE_BACKOFF_MS", 1..=600_000, &mut connection.base_backoff_ms);

    vars.text("KIOSK_LOG_LEVEL", &mut settings.logging.level);
    vars.flag("KIOSK_LOG_JSON", &mut settings.logging.json);
    vars.applied.get()
}

/// Parse an on/off value: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_flag(raw: &str) -> Option<bool> {
    const ON: [&str; 4] = ["true", "1", "yes", "on"];
    const OFF: [&str; 4] = ["false", "0", "no", "off"];
    let raw = raw.trim();
    if ON.iter().any(|v| raw.eq_ignore_ascii_case(v)) {
        Some(true)
    } else if OFF.iter().any(|v| raw.eq_ignore_ascii_case(v)) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number that must fall inside `bounds`.
pub fn parse_bounded<T>(raw: &str, bounds: &RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| bounds.contains(n))
}

struct Vars<F> {
    env: F,
    applied: std::cell::Cell<usize>,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn set<T>(&self, slot: &mut T, value: T) {
        *slot = value;
        self.applied.set(self.applied.get() + 1);
    }

    fn text(&self, name: &str, slot: &mut String) {
        if let Some(value) = (self.env)(name).filter(|v| !v.is_empty()) {
            self.set(slot, value);
        }
    }

    fn flag(&self, name: &str, slot: &mut bool) {
        let Some(raw) = (self.env)(name) else { return };
        match parse_flag(&raw) {
            Some(value) => self.set(slot, value),
            None => warn!(var = name, value = %raw, "ignoring non-boolean environment value"),
        }
    }

    fn number<T>(&self, name: &str, bounds: RangeInclusive<T>, slot: &mut T)
    where
        T: FromStr + PartialOrd + std::fmt::Display,
    {
        let Some(raw) = (self.env)(name) else { return };
        match parse_bounded(&raw, &bounds) {
            Some(value) => self.set(slot, value),
            None => warn!(
                var = name,
                value = %raw,
                min = %bounds.start(),
                max = %bounds.end(),
                "ignoring out-of-range environment value"
            ),
        }
    }
}
