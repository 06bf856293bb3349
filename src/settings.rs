//! Handlers behind the settings surface.
//!
//! [`SettingsController`] holds the logic a settings dialog needs (filling
//! the form, saving it, switching models, importing, resetting and showing
//! the log) as plain methods with no UI toolkit attached. The `quill
//! settings` command line drives it.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use quill_complete::{Completer, list_models};
use quill_core::{
    KEY_API_KEY, KEY_MAX_TOKENS, KEY_MODEL, KEY_STREAM, ModelCache, SettingsError, validate_max_tokens,
    validate_model,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::logging;

/// The values a settings dialog shows and edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsForm {
    pub api_key: String,
    /// Models offered for selection
    pub models: Vec<String>,
    pub model: Option<String>,
    /// As typed; parsed and range checked on save
    pub max_tokens: String,
    pub stream: bool,
}

pub struct SettingsController {
    context: Arc<AppContext>,
    cache: ModelCache,
}

impl SettingsController {
    pub fn new(context: Arc<AppContext>) -> Self {
        let cache = ModelCache::new(context.paths().model_cache.clone());
        Self { context, cache }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Fills the form from the current settings. The configured model is
    /// selected if it is offered, otherwise the first model offered.
    pub fn load_form(&self) -> Result<SettingsForm> {
        let settings = self.context.snapshot();
        let [min, max] = settings.allowed_tokens_range;
        validate_max_tokens(&Value::from(settings.max_tokens), (min, max))?;

        let models = self.available_models(false)?;
        let model = if models.contains(&settings.model) {
            Some(settings.model.clone())
        } else {
            models.first().cloned()
        };

        Ok(SettingsForm {
            api_key: settings.api_key,
            models,
            model,
            max_tokens: settings.max_tokens.to_string(),
            stream: settings.stream,
        })
    }

    /// Models that can be selected. Served from the cache while it holds a
    /// list fetched with the configured API key, unless `refresh` is set; a
    /// fresh list replaces the cache.
    pub fn available_models(&self, refresh: bool) -> Result<Vec<String>> {
        let settings = self.context.snapshot();
        if !refresh {
            let cached = self.cache.load(&settings.api_key);
            if !cached.is_empty() {
                debug!(count = cached.len(), "Using cached model list");
                return Ok(cached);
            }
        }

        if !settings.has_api_key() {
            warn!("API key is not set, no models to offer");
            return Ok(Vec::new());
        }
        let client = self.context.client_for(&settings.api_key);
        let models = self.fetch_models(client.as_ref())?;
        if !models.is_empty() {
            self.cache.save(&settings.api_key, &models)?;
        }
        Ok(models)
    }

    fn fetch_models(&self, client: &dyn Completer) -> Result<Vec<String>> {
        let models = self
            .context
            .handle()
            .block_on(list_models(client))
            .map_err(|e| SettingsError::Authentication(e.to_string()))?;
        Ok(models)
    }

    /// Validates and stores the form. Nothing is stored if validation fails.
    ///
    /// A changed API key is checked by listing the models it can use. A model
    /// picked in the form must be on that list. Without one, the configured
    /// model is kept if listed and the first listed model is selected
    /// otherwise. Once stored, the list replaces the model cache and the key
    /// becomes the catalog new model selections are validated against.
    pub fn save_form(&self, form: &SettingsForm) -> Result<()> {
        let settings = self.context.snapshot();
        let [min, max] = settings.allowed_tokens_range;
        let max_tokens = parse_max_tokens(&form.max_tokens, (min, max))?;
        let api_key = form.api_key.trim();

        let mut fetched = None;
        let model = if api_key != settings.api_key {
            let client = self.context.client_for(api_key);
            let models = self.fetch_models(client.as_ref())?;
            let Some(first) = models.first() else {
                return Err(SettingsError::InvalidApiKey.into());
            };
            let model = match &form.model {
                Some(model) => {
                    validate_model(model, &models)?;
                    model.clone()
                }
                None if models.contains(&settings.model) => settings.model.clone(),
                None => {
                    info!(
                        previous = %settings.model,
                        model = %first,
                        "Configured model is not available with the new API key"
                    );
                    first.clone()
                }
            };
            fetched = Some((client, models));
            Some(model)
        } else {
            form.model.clone()
        };

        {
            let mut store = self.context.settings().write();
            if let Some(model) = model.filter(|model| *model != settings.model) {
                match &fetched {
                    Some((_, models)) => store.set_model_from(&model, models)?,
                    None => store.set(KEY_MODEL, &model)?,
                }
            }
            store.set(KEY_API_KEY, api_key)?;
            store.set(KEY_MAX_TOKENS, max_tokens)?;
            store.set(KEY_STREAM, form.stream)?;
        }

        if let Some((client, models)) = fetched {
            self.cache.save(api_key, &models)?;
            self.context.bind_catalog(client);
            info!(models = models.len(), "API key accepted");
        }
        info!("Settings saved");
        Ok(())
    }

    /// Switches the model used for completions.
    pub fn select_model(&self, model: &str) -> Result<()> {
        self.context.settings().write().set(KEY_MODEL, model)?;
        info!(model, "Model selected");
        Ok(())
    }

    /// Replaces the settings with those in `path` and persists them.
    pub fn import(&self, path: &Path) -> Result<()> {
        self.context
            .settings()
            .write()
            .load(Some(path))
            .with_context(|| format!("Failed to import settings from {:?}", path))?;
        self.context.rebind_catalog();
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.context.settings().write().reset()?;
        self.context.rebind_catalog();
        Ok(())
    }

    /// The last `lines` lines of the log.
    pub fn log_tail(&self, lines: usize) -> Result<Vec<String>> {
        logging::tail_lines(&self.context.paths().log, lines)
    }

    /// Log text appended since `offset`, and the next offset.
    pub fn log_since(&self, offset: u64) -> Result<(String, u64)> {
        logging::read_since(&self.context.paths().log, offset)
    }
}

/// Parses the typed token limit and checks it against the allowed range.
pub fn parse_max_tokens(text: &str, range: (u32, u32)) -> Result<u32, SettingsError> {
    let value = text
        .trim()
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(text.to_string()));
    validate_max_tokens(&value, range)
}
