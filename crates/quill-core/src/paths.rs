//! Default file locations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use dirs::{config_dir, data_local_dir};

use crate::APP_NAME;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const MODEL_CACHE_FILE_NAME: &str = "models_cache.json";
pub const LOG_FILE_NAME: &str = "quill.log";

/// Returns the default path to the override file.
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
    Ok(config_dir.join(APP_NAME).join(CONFIG_FILE_NAME))
}

/// Returns the directory for the log file and model cache.
pub fn default_data_dir() -> Result<PathBuf> {
    let data_dir = data_local_dir().context("Failed to get data local directory")?;
    Ok(data_dir.join(APP_NAME))
}

/// Returns the default path to the model cache.
pub fn default_model_cache_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join(MODEL_CACHE_FILE_NAME))
}

/// Returns the default path to the log file.
pub fn default_log_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join(LOG_FILE_NAME))
}
