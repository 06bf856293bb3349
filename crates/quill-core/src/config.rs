//! Typed view over the merged settings.
//!
//! The store keeps settings as JSON maps so that overrides can be diffed
//! against the defaults key by key. This module provides the typed snapshot
//! the rest of the application reads, plus the value checks shared by `set`,
//! startup loading and imports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SettingsError};

pub const KEY_API_KEY: &str = "api_key";
pub const KEY_MODEL: &str = "model";
pub const KEY_MAX_TOKENS: &str = "max_tokens";
pub const KEY_STREAM: &str = "stream";
pub const KEY_ALLOWED_TOKENS_RANGE: &str = "allowed_tokens_range";
pub const KEY_SYSTEM_PROMPT: &str = "system_prompt";
pub const KEY_HOTKEYS: &str = "hotkeys";

/// Defaults shipped with the application. Used whenever no defaults file is
/// configured or the configured one cannot be read.
pub const BUILTIN_DEFAULTS: &str = include_str!("../defaults.json");

/// A single hotkey → prompt mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HotkeyAction {
    /// Key combination, e.g. `ctrl+r` or `shift+alt+KeyQ`
    pub key_combo: String,

    /// Instruction prepended to the highlighted text
    pub prompt: String,
}

/// Settings after merging overrides over defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// API key for the completion service
    #[serde(default)]
    pub api_key: String,

    /// Model used for completions
    #[serde(default = "default_model")]
    pub model: String,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Stream responses instead of waiting for the full completion
    #[serde(default)]
    pub stream: bool,

    /// Inclusive range `max_tokens` must fall in
    #[serde(default = "default_allowed_tokens_range")]
    pub allowed_tokens_range: [u32; 2],

    /// System message sent ahead of every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Action name → hotkey mapping
    #[serde(default)]
    pub hotkeys: BTreeMap<String, HotkeyAction>,
}

fn default_model() -> String {
    "gpt-4-1106-preview".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

fn default_allowed_tokens_range() -> [u32; 2] {
    [1, 4096]
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            stream: false,
            allowed_tokens_range: default_allowed_tokens_range(),
            system_prompt: default_system_prompt(),
            hotkeys: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Build a typed snapshot from a merged settings map, validating
    /// `max_tokens` first so out-of-range values get a precise error.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let range = allowed_tokens_range(map)?;
        if let Some(max_tokens) = map.get(KEY_MAX_TOKENS) {
            validate_max_tokens(max_tokens, range)?;
        }

        serde_json::from_value(Value::Object(map.clone())).map_err(|source| {
            SettingsError::InvalidValue {
                key: first_invalid_key(map).unwrap_or_else(|| "settings".to_string()),
                source,
            }
        })
    }

    /// Whether an API key has been configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Look up the hotkey action with the given name.
    pub fn hotkey(&self, action: &str) -> Option<&HotkeyAction> {
        self.hotkeys.get(action)
    }
}

/// Read `allowed_tokens_range` from a settings map, falling back to the
/// built-in range when absent.
pub fn allowed_tokens_range(map: &Map<String, Value>) -> Result<(u32, u32)> {
    let Some(value) = map.get(KEY_ALLOWED_TOKENS_RANGE) else {
        let [min, max] = default_allowed_tokens_range();
        return Ok((min, max));
    };
    let [min, max]: [u32; 2] =
        serde_json::from_value(value.clone()).map_err(|source| SettingsError::InvalidValue {
            key: KEY_ALLOWED_TOKENS_RANGE.to_string(),
            source,
        })?;
    Ok((min, max))
}

/// Check that `value` is an integer within `min..=max`.
pub fn validate_max_tokens(value: &Value, (min, max): (u32, u32)) -> Result<u32> {
    let Some(tokens) = value.as_i64() else {
        return Err(SettingsError::MaxTokensNotInteger(value.to_string()));
    };
    if tokens < i64::from(min) || tokens > i64::from(max) {
        return Err(SettingsError::MaxTokensOutOfRange {
            value: tokens,
            min,
            max,
        });
    }
    Ok(tokens as u32)
}

/// Finds the first key whose value does not deserialize into its field type,
/// so error messages can name it.
fn first_invalid_key(map: &Map<String, Value>) -> Option<String> {
    let probe = |key: &str, value: &Value| -> bool {
        let value = value.clone();
        match key {
            KEY_API_KEY | KEY_MODEL | KEY_SYSTEM_PROMPT => {
                serde_json::from_value::<String>(value).is_err()
            }
            KEY_MAX_TOKENS => serde_json::from_value::<u32>(value).is_err(),
            KEY_STREAM => serde_json::from_value::<bool>(value).is_err(),
            KEY_ALLOWED_TOKENS_RANGE => serde_json::from_value::<[u32; 2]>(value).is_err(),
            KEY_HOTKEYS => {
                serde_json::from_value::<BTreeMap<String, HotkeyAction>>(value).is_err()
            }
            _ => false,
        }
    };
    map.iter()
        .find(|(key, value)| probe(key, value))
        .map(|(key, _)| key.clone())
}
