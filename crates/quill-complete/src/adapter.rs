//! Call policy around a [`Completer`].
//!
//! Listing and single-shot completion never fail the caller for transport or
//! service errors; they log and return an empty result. Authentication
//! failures while listing are returned so the settings surface can report
//! them. Streaming raises every failure, including mid-stream ones, so the
//! caller can abort.

use futures_util::StreamExt;
use tracing::{error, warn};

use crate::{ChunkStream, CompleteError, Completer, CompletionRequest, Result};

/// Only models whose id starts with this prefix are offered.
pub const MODEL_PREFIX: &str = "gpt-";

/// Lists the chat models offered by the service, in service order.
pub async fn list_models(client: &dyn Completer) -> Result<Vec<String>> {
    match client.models().await {
        Ok(models) => Ok(models
            .into_iter()
            .filter(|id| id.starts_with(MODEL_PREFIX))
            .collect()),
        Err(e) if e.is_auth() => {
            error!(backend = client.name(), "Authentication error listing models: {}", e);
            Err(e)
        }
        Err(CompleteError::NetworkError(e)) => {
            error!(backend = client.name(), "API connection error occurred: {}", e);
            Ok(Vec::new())
        }
        Err(e) => {
            error!(backend = client.name(), "API error occurred: {}", e);
            Ok(Vec::new())
        }
    }
}

/// Requests a completion and waits for the full text. Returns an empty
/// string on any failure.
pub async fn complete(client: &dyn Completer, request: &CompletionRequest) -> String {
    match client.complete(request).await {
        Ok(text) => text,
        Err(e) => {
            error!(
                backend = client.name(),
                model = %request.model,
                "An error occurred during the completion call: {}",
                e
            );
            String::new()
        }
    }
}

/// Requests a streamed completion. Errors are logged and re-raised.
pub async fn stream(client: &dyn Completer, request: &CompletionRequest) -> Result<ChunkStream> {
    let chunks = client.stream(request).await.inspect_err(|e| {
        error!(
            backend = client.name(),
            model = %request.model,
            "An error occurred starting the streamed completion: {}",
            e
        );
    })?;

    Ok(chunks
        .inspect(|chunk| {
            if let Err(e) = chunk {
                warn!("Streamed completion aborted: {}", e);
            }
        })
        .boxed())
}
