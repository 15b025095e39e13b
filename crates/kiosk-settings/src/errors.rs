//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not JSON.
    #[error("{} is not valid JSON: {source}", .path.display())]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Decoder error.
        source: serde_json::Error,
    },

    /// The merged document does not fit the settings schema.
    #[error("settings do not match the schema: {0}")]
    Schema(#[from] serde_json::Error),

    /// A field holds a value the client cannot run with.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// camelCase field path, e.g. `connection.connectTimeoutMs`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SettingsError::Parse { path: PathBuf::from("/etc/kiosk.json"), source };
        assert!(err.to_string().starts_with("/etc/kiosk.json is not valid JSON"));
    }

    #[test]
    fn invalid_names_the_field() {
        let err = SettingsError::invalid("connection.backoffMultiplier", "must be at least 1");
        assert_eq!(err.to_string(), "invalid `connection.backoffMultiplier`: must be at least 1");
    }

    #[test]
    fn schema_errors_convert() {
        let source = serde_json::from_value::<u16>(serde_json::json!("x")).unwrap_err();
        let err: SettingsError = source.into();
        assert!(matches!(err, SettingsError::Schema(_)));
    }
}
