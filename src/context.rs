//! Explicitly constructed application context handed to every handler.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use quill_complete::{BlockingCatalog, Completer, OpenAIClient};
use quill_core::{Settings, SettingsStore, paths};
use tokio::runtime::{Handle, Runtime};
use tracing::warn;

/// Builds a completion client for an API key.
pub type ClientFactory = Arc<dyn Fn(&str) -> Arc<dyn Completer> + Send + Sync>;

/// Files the application reads and writes.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    pub defaults: Option<PathBuf>,
    pub model_cache: PathBuf,
    pub log: PathBuf,
}

impl AppPaths {
    /// Resolves the platform default locations, honouring explicit overrides.
    pub fn resolve(config: Option<PathBuf>, defaults: Option<PathBuf>) -> Result<Self> {
        let config = match config {
            Some(config) => config,
            None => paths::default_config_path()?,
        };
        Ok(Self {
            config,
            defaults,
            model_cache: paths::default_model_cache_path()?,
            log: paths::default_log_path()?,
        })
    }

    /// Places every file under `dir`. Useful for tests.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            config: dir.join(paths::CONFIG_FILE_NAME),
            defaults: None,
            model_cache: dir.join(paths::MODEL_CACHE_FILE_NAME),
            log: dir.join(paths::LOG_FILE_NAME),
        }
    }
}

/// Shared state for the dispatcher, the tray and the settings surface.
pub struct AppContext {
    paths: AppPaths,
    settings: Arc<RwLock<SettingsStore>>,
    runtime: Runtime,
    client_factory: ClientFactory,
    /// Client for the most recently used API key
    client: Mutex<Option<(String, Arc<dyn Completer>)>>,
}

impl AppContext {
    /// Opens the settings store and talks to OpenAI.
    pub fn new(paths: AppPaths) -> Result<Self> {
        let factory: ClientFactory = Arc::new(|api_key: &str| -> Arc<dyn Completer> {
            Arc::new(OpenAIClient::from_api_key(api_key))
        });
        Self::with_client_factory(paths, factory)
    }

    /// Opens the settings store with a custom client factory.
    pub fn with_client_factory(paths: AppPaths, client_factory: ClientFactory) -> Result<Self> {
        let store = SettingsStore::open(&paths.config, paths.defaults.clone())
            .with_context(|| format!("Failed to load settings from {:?}", paths.config))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let context = Self {
            paths,
            settings: Arc::new(RwLock::new(store)),
            runtime,
            client_factory,
            client: Mutex::new(None),
        };

        let settings = context.snapshot();
        if settings.has_api_key() {
            let client = context.client_for(&settings.api_key);
            context.bind_catalog(client);
        } else {
            warn!(
                "API key is not set. Hotkeys will not work without it. \
                 Set it with `quill settings save --api-key <key>`."
            );
        }

        Ok(context)
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// The shared settings store.
    pub fn settings(&self) -> &Arc<RwLock<SettingsStore>> {
        &self.settings
    }

    /// A copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.settings.read().settings().clone()
    }

    /// Handle to the runtime remote calls run on.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Client for the configured API key, if one is set.
    pub fn client(&self) -> Option<Arc<dyn Completer>> {
        let settings = self.snapshot();
        settings
            .has_api_key()
            .then(|| self.client_for(&settings.api_key))
    }

    /// Client for `api_key`, reusing the previous one when the key matches.
    pub fn client_for(&self, api_key: &str) -> Arc<dyn Completer> {
        let mut cached = self.client.lock();
        if let Some((key, client)) = cached.as_ref() {
            if key == api_key {
                return client.clone();
            }
        }
        let client = (self.client_factory)(api_key);
        *cached = Some((api_key.to_string(), client.clone()));
        client
    }

    /// Makes `client` the catalog that `model` updates are validated against.
    pub fn bind_catalog(&self, client: Arc<dyn Completer>) {
        let catalog = BlockingCatalog::new(client, self.handle());
        self.settings.write().bind_catalog(Arc::new(catalog));
    }

    /// Binds the catalog for the configured API key, or unbinds it when no
    /// key is set. Call after the settings were replaced wholesale.
    pub fn rebind_catalog(&self) {
        match self.client() {
            Some(client) => self.bind_catalog(client),
            None => self.settings.write().unbind_catalog(),
        }
    }
}
