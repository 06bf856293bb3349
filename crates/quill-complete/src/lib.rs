//! Chat completion client library for quill.
//!
//! This crate provides a trait-based abstraction over a remote chat
//! completion service, an implementation for OpenAI-compatible APIs, and the
//! call policy the application relies on (which failures degrade to an empty
//! result and which are raised).

mod adapter;
mod catalog;
mod openai;
mod sse;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use adapter::{MODEL_PREFIX, complete, list_models, stream};
pub use catalog::BlockingCatalog;
pub use openai::{OpenAIClient, OpenAIConfig};
pub use sse::SseDecoder;

/// Errors that can occur while talking to the completion service.
#[derive(Debug, Error)]
pub enum CompleteError {
    #[error("No API key configured")]
    NoApiKey,

    #[error("Incorrect API key provided: {0}")]
    Unauthorized(String),

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl CompleteError {
    /// Whether the service rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::NoApiKey)
    }
}

/// Result type for completion operations.
pub type Result<T> = std::result::Result<T, CompleteError>;

/// Incrementally delivered completion text. Finite and not restartable.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Everything needed to issue one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Builds the request for a hotkey action: the system prompt followed by
    /// the action prompt and the captured text as one user message.
    pub fn for_prompt(
        model: impl Into<String>,
        max_tokens: u32,
        system_prompt: &str,
        prompt: &str,
        text: &str,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(format!("{prompt}\n\n{text}")),
            ],
            max_tokens,
        }
    }
}

/// Trait for completion backends.
///
/// Implementations report every failure; the free functions in this crate
/// decide which failures the caller gets to see.
#[async_trait]
pub trait Completer: Send + Sync {
    /// List every model identifier the service offers.
    async fn models(&self) -> Result<Vec<String>>;

    /// Request a completion and wait for the full text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Request a completion delivered in chunks as it is generated.
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream>;

    /// Returns the name of this backend for logging/debugging.
    fn name(&self) -> &str;
}
