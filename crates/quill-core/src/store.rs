//! Settings persistence: defaults merged with a user override file.
//!
//! Only keys whose value differs from the defaults are written to the
//! override file. The defaults are re-read whenever the diff is re-derived,
//! so a newer defaults file takes effect for every key the user never
//! changed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::{BUILTIN_DEFAULTS, KEY_MODEL, Settings};
use crate::error::{Result, SettingsError};

/// Source of the model identifiers a `model` setting is checked against.
pub trait ModelCatalog: Send + Sync {
    /// List the models currently available.
    fn models(&self) -> Result<Vec<String>>;
}

impl ModelCatalog for Vec<String> {
    fn models(&self) -> Result<Vec<String>> {
        Ok(self.clone())
    }
}

/// Check that `model` is offered by `catalog`.
pub fn validate_model(model: &str, catalog: &dyn ModelCatalog) -> Result<()> {
    let models = catalog.models()?;
    if models.iter().any(|m| m == model) {
        Ok(())
    } else {
        Err(SettingsError::InvalidModel(model.to_string()))
    }
}

/// Loads, validates and persists settings.
pub struct SettingsStore {
    config_path: PathBuf,
    defaults_path: Option<PathBuf>,
    /// Defaults with overrides applied
    merged: Map<String, Value>,
    /// Keys that differ from the defaults
    overrides: Map<String, Value>,
    current: Settings,
    catalog: Option<Arc<dyn ModelCatalog>>,
}

impl SettingsStore {
    /// Opens the store at `config_path`. Without a `defaults_path` the
    /// built-in defaults are used.
    ///
    /// Missing, unparseable or invalid override files are ignored; only a
    /// defaults file that fails validation is an error.
    pub fn open(config_path: impl Into<PathBuf>, defaults_path: Option<PathBuf>) -> Result<Self> {
        let mut store = Self {
            config_path: config_path.into(),
            defaults_path,
            merged: Map::new(),
            overrides: Map::new(),
            current: Settings::default(),
            catalog: None,
        };
        store.load(None)?;
        Ok(store)
    }

    /// Re-reads defaults and overrides. With `Some(path)` the file is treated
    /// as an explicit import: read, parse and validation errors propagate,
    /// and the imported values are persisted to the config file.
    ///
    /// Without a path, an override file that fails validation is reported
    /// and ignored (but left on disk) so the application can still start.
    pub fn load(&mut self, path: Option<&Path>) -> Result<()> {
        let defaults = self.read_defaults();
        let candidate = match path {
            Some(path) => read_object(path)?,
            None => self.read_config_lenient(),
        };

        let mut overrides = diff_from_defaults(&defaults, candidate);
        let mut merged = merge(&defaults, &overrides);
        let current = match Settings::from_map(&merged) {
            Ok(current) => current,
            Err(e) if path.is_none() => {
                error!(
                    path = ?self.config_path,
                    "Ignoring invalid settings file, using defaults: {}",
                    e
                );
                overrides.clear();
                merged = defaults;
                Settings::from_map(&merged)?
            }
            Err(e) => return Err(e),
        };

        self.overrides = overrides;
        self.merged = merged;
        self.current = current;

        if let Some(path) = path {
            info!(path = ?path, keys = self.overrides.len(), "Imported settings");
            self.save()?;
        }
        Ok(())
    }

    /// Returns the merged value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.merged.get(key)
    }

    /// Returns the merged value for `key`, or `default` if it is missing or
    /// has a different type.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    /// Validates and stores `value` under `key`, then persists the override
    /// file. Setting a key back to its default removes it from the file.
    /// Nothing changes if validation fails.
    pub fn set<V: Serialize>(&mut self, key: &str, value: V) -> Result<()> {
        let value = to_value(key, value)?;
        if key == KEY_MODEL {
            if let Some(catalog) = self.catalog.clone() {
                validate_model_value(&value, catalog.as_ref())?;
            }
        }
        self.store(key, value)
    }

    /// Stores `model` after checking it against `catalog` instead of the
    /// bound catalog.
    pub fn set_model_from(&mut self, model: &str, catalog: &dyn ModelCatalog) -> Result<()> {
        validate_model(model, catalog)?;
        self.store(KEY_MODEL, Value::from(model))
    }

    fn store(&mut self, key: &str, value: Value) -> Result<()> {
        let defaults = self.read_defaults();
        let mut overrides = self.overrides.clone();
        overrides.insert(key.to_string(), value);
        // every key is diffed again, the defaults may have changed since load
        let overrides = diff_from_defaults(&defaults, overrides);

        let merged = merge(&defaults, &overrides);
        let current = Settings::from_map(&merged)?;

        self.overrides = overrides;
        self.merged = merged;
        self.current = current;
        debug!(key, "Setting updated");

        self.save()
    }

    /// Writes the override map to the config file.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir).map_err(|source| SettingsError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let serialized =
            serde_json::to_string_pretty(&self.overrides).map_err(|source| {
                SettingsError::InvalidValue {
                    key: "settings".to_string(),
                    source,
                }
            })?;

        fs::write(&self.config_path, serialized).map_err(|source| SettingsError::Io {
            path: self.config_path.clone(),
            source,
        })
    }

    /// Drops every override and persists the empty override file.
    pub fn reset(&mut self) -> Result<()> {
        let defaults = self.read_defaults();
        self.current = Settings::from_map(&defaults)?;
        self.overrides.clear();
        self.merged = defaults;
        info!("Settings reset to defaults");
        self.save()
    }

    /// Binds the catalog used to validate `model` updates.
    pub fn bind_catalog(&mut self, catalog: Arc<dyn ModelCatalog>) {
        self.catalog = Some(catalog);
    }

    /// Stops validating `model` updates, for when no API key is set.
    pub fn unbind_catalog(&mut self) {
        self.catalog = None;
    }

    /// Whether a model catalog is bound.
    pub fn has_catalog(&self) -> bool {
        self.catalog.is_some()
    }

    /// Typed snapshot of the merged settings.
    pub fn settings(&self) -> &Settings {
        &self.current
    }

    /// Keys currently overriding the defaults.
    pub fn overrides(&self) -> &Map<String, Value> {
        &self.overrides
    }

    /// Path of the override file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn read_defaults(&self) -> Map<String, Value> {
        if let Some(path) = &self.defaults_path {
            match read_object(path) {
                Ok(defaults) => return defaults,
                Err(e) => debug!(error = %e, "Using built-in defaults"),
            }
        }
        serde_json::from_str(BUILTIN_DEFAULTS).unwrap_or_default()
    }

    fn read_config_lenient(&self) -> Map<String, Value> {
        if !self.config_path.exists() {
            return Map::new();
        }
        read_object(&self.config_path).unwrap_or_else(|e| {
            debug!(error = %e, "Ignoring unreadable config file");
            Map::new()
        })
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(SettingsError::NotAnObject(path.to_path_buf())),
    }
}

fn to_value<V: Serialize>(key: &str, value: V) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| SettingsError::InvalidValue {
        key: key.to_string(),
        source,
    })
}

fn validate_model_value(value: &Value, catalog: &dyn ModelCatalog) -> Result<()> {
    let model = value
        .as_str()
        .ok_or_else(|| SettingsError::InvalidModel(value.to_string()))?;
    validate_model(model, catalog)
}

fn diff_from_defaults(
    defaults: &Map<String, Value>,
    mut candidate: Map<String, Value>,
) -> Map<String, Value> {
    candidate.retain(|key, value| defaults.get(key) != Some(value));
    candidate
}

fn merge(defaults: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    use super::*;

    fn store_in(temp: &TempDir) -> SettingsStore {
        SettingsStore::open(temp.path().join("config.json"), None).unwrap()
    }

    fn written_overrides(store: &SettingsStore) -> Map<String, Value> {
        let content = fs::read_to_string(store.config_path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn test_open_without_files_uses_defaults() {
        let temp = tempdir().unwrap();
        let store = store_in(&temp);
        assert!(store.overrides().is_empty());
        assert_eq!(store.settings().max_tokens, 256);
        assert_eq!(store.get_or("model", String::new()), "gpt-4-1106-preview");
        assert!(!store.config_path().exists());
    }

    #[test]
    fn test_set_non_default_persists() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);

        store.set("max_tokens", 512).unwrap();
        store.set("stream", true).unwrap();

        assert_eq!(store.settings().max_tokens, 512);
        assert!(store.settings().stream);
        let written = written_overrides(&store);
        assert_eq!(written.get("max_tokens"), Some(&json!(512)));
        assert_eq!(written.get("stream"), Some(&json!(true)));
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn test_set_default_value_removes_override() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);

        store.set("max_tokens", 512).unwrap();
        store.set("max_tokens", 256).unwrap();

        assert_eq!(store.settings().max_tokens, 256);
        assert!(written_overrides(&store).is_empty());
    }

    #[test]
    fn test_max_tokens_out_of_range_rejected_on_set() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        store.set("max_tokens", 100).unwrap();

        for bad in [json!(0), json!(4097), json!(-3)] {
            let err = store.set("max_tokens", bad).unwrap_err();
            assert!(matches!(err, SettingsError::MaxTokensOutOfRange { .. }));
        }
        let err = store.set("max_tokens", "lots").unwrap_err();
        assert!(matches!(err, SettingsError::MaxTokensNotInteger(_)));

        assert_eq!(store.settings().max_tokens, 100);
        assert_eq!(written_overrides(&store).get("max_tokens"), Some(&json!(100)));
    }

    #[test]
    fn test_shrinking_range_below_max_tokens_is_rejected() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        let err = store.set("allowed_tokens_range", [1, 100]).unwrap_err();
        assert!(matches!(err, SettingsError::MaxTokensOutOfRange { value: 256, .. }));
        assert!(store.overrides().is_empty());
    }

    #[test]
    fn test_ill_typed_value_rejected() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        let err = store.set("stream", "yes").unwrap_err();
        assert!(err.is_validation());
        assert!(!store.settings().stream);
    }

    #[test]
    fn test_model_accepted_without_catalog() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        assert!(!store.has_catalog());
        store.set("model", "made-up-model").unwrap();
        assert_eq!(store.settings().model, "made-up-model");
    }

    #[test]
    fn test_model_validated_with_catalog() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        store.bind_catalog(Arc::new(vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]));

        let err = store.set("model", "made-up-model").unwrap_err();
        assert!(matches!(err, SettingsError::InvalidModel(ref m) if m == "made-up-model"));
        assert_eq!(store.settings().model, "gpt-4-1106-preview");

        store.set("model", "gpt-4o-mini").unwrap();
        assert_eq!(store.settings().model, "gpt-4o-mini");
    }

    #[test]
    fn test_catalog_errors_propagate() {
        struct Locked;
        impl ModelCatalog for Locked {
            fn models(&self) -> Result<Vec<String>> {
                Err(SettingsError::Authentication("invalid_api_key".to_string()))
            }
        }

        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        store.bind_catalog(Arc::new(Locked));
        let err = store.set("model", "gpt-4o").unwrap_err();
        assert!(matches!(err, SettingsError::Authentication(_)));
    }

    #[test]
    fn test_set_model_from_ignores_bound_catalog() {
        struct Locked;
        impl ModelCatalog for Locked {
            fn models(&self) -> Result<Vec<String>> {
                Err(SettingsError::Authentication("invalid_api_key".to_string()))
            }
        }

        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        store.bind_catalog(Arc::new(Locked));
        let fetched = vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()];

        store.set_model_from("gpt-4o-mini", &fetched).unwrap();
        assert_eq!(store.settings().model, "gpt-4o-mini");

        let err = store.set_model_from("davinci", &fetched).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidModel(ref m) if m == "davinci"));
        assert_eq!(store.settings().model, "gpt-4o-mini");
    }

    #[test]
    fn test_unbind_catalog_accepts_any_model() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        store.bind_catalog(Arc::new(vec!["gpt-4o".to_string()]));
        assert!(store.set("model", "gpt-4o-mini").is_err());

        store.unbind_catalog();
        assert!(!store.has_catalog());
        store.set("model", "gpt-4o-mini").unwrap();
    }

    #[test]
    fn test_startup_malformed_config_falls_back() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::open(&path, None).unwrap();
        assert!(store.overrides().is_empty());
        assert_eq!(store.settings().max_tokens, 256);
    }

    #[test]
    fn test_startup_out_of_range_config_ignored_but_kept() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{ "max_tokens": 10000, "stream": true }"#).unwrap();

        let mut store = SettingsStore::open(&path, None).unwrap();
        assert_eq!(store.settings().max_tokens, 256);
        assert!(!store.settings().stream);
        assert!(fs::read_to_string(&path).unwrap().contains("10000"));

        let err = store.load(Some(&path)).unwrap_err();
        assert!(matches!(err, SettingsError::MaxTokensOutOfRange { .. }));
    }

    #[test]
    fn test_startup_drops_values_equal_to_defaults() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{ "max_tokens": 256, "stream": true }"#).unwrap();

        let store = SettingsStore::open(&path, None).unwrap();
        assert_eq!(store.overrides().len(), 1);
        assert!(store.settings().stream);
    }

    #[test]
    fn test_import_malformed_json_propagates() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        let import = temp.path().join("import.json");
        fs::write(&import, "[1, 2").unwrap();

        let err = store.load(Some(&import)).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));

        let err = store.load(Some(&temp.path().join("missing.json"))).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn test_import_out_of_range_rejected() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        let import = temp.path().join("import.json");
        fs::write(&import, r#"{ "api_key": "sk-imported", "max_tokens": 0 }"#).unwrap();

        let err = store.load(Some(&import)).unwrap_err();
        assert!(matches!(err, SettingsError::MaxTokensOutOfRange { .. }));
        assert_eq!(store.settings().api_key, "");
    }

    #[test]
    fn test_import_persists_diff() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        let import = temp.path().join("import.json");
        fs::write(
            &import,
            r#"{ "api_key": "sk-imported", "max_tokens": 256, "stream": true }"#,
        )
        .unwrap();

        store.load(Some(&import)).unwrap();

        assert_eq!(store.settings().api_key, "sk-imported");
        let written = written_overrides(&store);
        assert_eq!(written.len(), 2);
        assert!(written.get("max_tokens").is_none());
    }

    #[test]
    fn test_import_non_object_rejected() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        let import = temp.path().join("import.json");
        fs::write(&import, r#"["gpt-4o"]"#).unwrap();

        let err = store.load(Some(&import)).unwrap_err();
        assert!(matches!(err, SettingsError::NotAnObject(_)));
    }

    #[test]
    fn test_reset_clears_overrides() {
        let temp = tempdir().unwrap();
        let mut store = store_in(&temp);
        store.set("api_key", "sk-test").unwrap();
        store.set("stream", true).unwrap();

        store.reset().unwrap();

        assert!(store.overrides().is_empty());
        assert_eq!(store.settings(), &Settings::from_map(&store.read_defaults()).unwrap());
        assert!(written_overrides(&store).is_empty());
    }

    #[test]
    fn test_updated_defaults_apply_to_untouched_keys() {
        let temp = tempdir().unwrap();
        let defaults = temp.path().join("defaults.json");
        fs::write(&defaults, r#"{ "max_tokens": 256, "stream": false }"#).unwrap();
        let config = temp.path().join("config.json");

        let mut store = SettingsStore::open(&config, Some(defaults.clone())).unwrap();
        store.set("stream", true).unwrap();

        fs::write(&defaults, r#"{ "max_tokens": 1024, "stream": false }"#).unwrap();
        let store = SettingsStore::open(&config, Some(defaults)).unwrap();

        assert_eq!(store.settings().max_tokens, 1024);
        assert!(store.settings().stream);
    }

    #[test]
    fn test_set_drops_overrides_matching_updated_defaults() {
        let temp = tempdir().unwrap();
        let defaults = temp.path().join("defaults.json");
        fs::write(&defaults, r#"{ "max_tokens": 256, "stream": false }"#).unwrap();

        let mut store =
            SettingsStore::open(temp.path().join("config.json"), Some(defaults.clone())).unwrap();
        store.set("max_tokens", 1024).unwrap();

        fs::write(&defaults, r#"{ "max_tokens": 1024, "stream": false }"#).unwrap();
        store.set("stream", true).unwrap();

        assert_eq!(store.settings().max_tokens, 1024);
        assert_eq!(written_overrides(&store), json!({ "stream": true }).as_object().unwrap().clone());
    }

    #[test]
    fn test_missing_defaults_file_uses_builtin() {
        let temp = tempdir().unwrap();
        let store = SettingsStore::open(
            temp.path().join("config.json"),
            Some(temp.path().join("nope.json")),
        )
        .unwrap();
        assert_eq!(store.settings().hotkeys.len(), 2);
    }

    #[test]
    fn test_get_or_type_mismatch_returns_default() {
        let temp = tempdir().unwrap();
        let store = store_in(&temp);
        assert_eq!(store.get_or("max_tokens", 0u32), 256);
        assert_eq!(store.get_or("model", 7u32), 7);
        assert!(store.get_or("missing", true));
    }
}
