//! Core types and settings persistence for quill.
//!
//! This crate has no UI or network dependencies. It owns the settings
//! store, the model cache and the types shared by the other crates.

mod cache;
mod config;
mod error;
pub mod paths;
mod state;
mod store;

pub use cache::ModelCache;
pub use config::{
    BUILTIN_DEFAULTS, HotkeyAction, KEY_ALLOWED_TOKENS_RANGE, KEY_API_KEY, KEY_HOTKEYS,
    KEY_MAX_TOKENS, KEY_MODEL, KEY_STREAM, KEY_SYSTEM_PROMPT, Settings, allowed_tokens_range,
    validate_max_tokens,
};
pub use error::{Result, SettingsError};
pub use state::ActivityState;
pub use store::{ModelCatalog, SettingsStore, validate_model};

/// Application name
pub const APP_NAME: &str = "quill";

/// Pretty application name for display
pub const APP_NAME_PRETTY: &str = "Quill";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable holding the log filter
pub const LOG_ENV_VAR: &str = "QUILL_LOG";
