//! On-disk cache of the last fetched model list.

use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SettingsError};

/// Stores the model identifiers from the most recent successful fetch so the
/// settings surface does not hit the network while the API key is unchanged.
///
/// The list is tagged with a fingerprint of the key it was fetched with, never
/// the key itself. A list fetched with another key reads as empty.
#[derive(Debug, Clone)]
pub struct ModelCache {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedModels {
    key: String,
    models: Vec<String>,
}

fn key_fingerprint(api_key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    api_key.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl ModelCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the models cached for `api_key`, or an empty list if the cache
    /// is missing, unreadable or was filled using a different key.
    pub fn load(&self, api_key: &str) -> Vec<String> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let cached: CachedModels = match serde_json::from_str(&content) {
            Ok(cached) => cached,
            Err(e) => {
                debug!(error = %e, path = ?self.path, "Ignoring corrupt model cache");
                return Vec::new();
            }
        };
        if cached.key != key_fingerprint(api_key) {
            debug!(path = ?self.path, "Model cache belongs to another API key");
            return Vec::new();
        }
        cached.models
    }

    /// Replaces the cached list with `models`, fetched using `api_key`.
    pub fn save(&self, api_key: &str, models: &[String]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let cached = CachedModels {
            key: key_fingerprint(api_key),
            models: models.to_vec(),
        };
        let serialized = serde_json::to_string(&cached).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, serialized).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
