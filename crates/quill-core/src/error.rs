//! Errors raised by the settings store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, validating or writing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("The model {0} is not a valid GPT model.")]
    InvalidModel(String),

    #[error("max_tokens must be between {min} and {max}, got {value}.")]
    MaxTokensOutOfRange { value: i64, min: u32, max: u32 },

    #[error("max_tokens must be an integer, got {0}.")]
    MaxTokensNotInteger(String),

    #[error("Invalid value for {key}: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("The provided API key is invalid.")]
    InvalidApiKey,

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Settings file {0:?} does not contain a JSON object")]
    NotAnObject(PathBuf),
}

impl SettingsError {
    /// Whether this error is a user-facing validation failure, as opposed to
    /// a file or authentication problem.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidModel(_)
                | Self::MaxTokensOutOfRange { .. }
                | Self::MaxTokensNotInteger(_)
                | Self::InvalidValue { .. }
                | Self::InvalidApiKey
        )
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
