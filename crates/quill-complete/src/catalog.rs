//! Bridges a [`Completer`] to the settings store's synchronous catalog seam.

use std::sync::Arc;

use quill_core::{ModelCatalog, SettingsError};
use tokio::runtime::Handle;

use crate::{Completer, list_models};

/// A [`ModelCatalog`] that lists models by blocking on a runtime.
///
/// Must not be queried from inside that runtime's worker threads.
pub struct BlockingCatalog {
    client: Arc<dyn Completer>,
    runtime: Handle,
}

impl BlockingCatalog {
    pub fn new(client: Arc<dyn Completer>, runtime: Handle) -> Self {
        Self { client, runtime }
    }
}

impl ModelCatalog for BlockingCatalog {
    fn models(&self) -> quill_core::Result<Vec<String>> {
        self.runtime
            .block_on(list_models(self.client.as_ref()))
            .map_err(|e| SettingsError::Authentication(e.to_string()))
    }
}
