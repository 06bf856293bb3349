// Re-export from sub-crates
pub use quill_complete::{CompleteError, Completer, CompletionRequest, OpenAIClient, OpenAIConfig};
pub use quill_core::{
    APP_NAME, APP_NAME_PRETTY, ActivityState, DEFAULT_LOG_LEVEL, LOG_ENV_VAR, Settings,
    SettingsError, SettingsStore,
};

// App-specific modules
pub mod cli;
pub mod context;
pub mod dispatch;
pub mod event;
pub mod hotkey;
pub mod icon;
pub mod input;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod settings;
pub mod tray;

// Version from this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
