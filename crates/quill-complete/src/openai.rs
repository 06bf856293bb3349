//! OpenAI-compatible chat completion backend.

use async_trait::async_trait;
use futures_util::{StreamExt, future, stream};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sse::SseDecoder;
use crate::{ChatMessage, ChunkStream, CompleteError, Completer, CompletionRequest, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DONE_MARKER: &str = "[DONE]";

/// Configuration for the OpenAI client.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// OpenAI API key
    pub api_key: String,

    /// API base URL (defaults to https://api.openai.com/v1)
    pub base_url: Option<String>,
}

impl OpenAIConfig {
    /// Create a new OpenAI config with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    /// Point the client at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Get the base URL, using the default if not set.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

/// OpenAI chat completions client.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: reqwest::Client,
    config: OpenAIConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAIClient {
    /// Create a new OpenAI client with the given configuration.
    pub fn new(config: OpenAIConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    /// Create a client that sends requests through `client`.
    pub fn with_http_client(config: OpenAIConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    /// Create a client from just an API key with default settings.
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        Self::new(OpenAIConfig::new(api_key))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url().trim_end_matches('/'), path)
    }

    fn bearer(&self) -> Result<&str> {
        let key = self.config.api_key.trim();
        if key.is_empty() {
            return Err(CompleteError::NoApiKey);
        }
        Ok(key)
    }

    async fn send_chat(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let key = self.bearer()?;
        debug!(
            model = %request.model,
            max_tokens = request.max_tokens,
            stream,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(key)
            .json(&ChatRequest {
                model: &request.model,
                messages: &request.messages,
                max_tokens: request.max_tokens,
                stream,
            })
            .send()
            .await?;

        check_status(response).await
    }
}

/// Maps non-success statuses to errors, keeping the body for the message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CompleteError::Unauthorized(body)),
        _ => Err(CompleteError::ApiError(format!(
            "API returned {}: {}",
            status, body
        ))),
    }
}

/// Decodes one streamed payload into its text delta, if any.
fn parse_chunk(data: &str) -> Result<Option<String>> {
    if data == DONE_MARKER {
        return Ok(None);
    }
    if let Ok(StreamError { error }) = serde_json::from_str::<StreamError>(data) {
        return Err(CompleteError::ApiError(error.message));
    }

    let chunk: ChatChunk =
        serde_json::from_str(data).map_err(|e| CompleteError::Decode(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

#[async_trait]
impl Completer for OpenAIClient {
    async fn models(&self) -> Result<Vec<String>> {
        let key = self.bearer()?;
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(key)
            .send()
            .await?;

        let list: ModelList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| CompleteError::Decode(e.to_string()))?;

        debug!(count = list.data.len(), "Fetched model list");
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response: ChatResponse = self
            .send_chat(request, false)
            .await?
            .json()
            .await
            .map_err(|e| CompleteError::Decode(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| CompleteError::Decode("response contained no choices".to_string()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let response = self.send_chat(request, true).await?;

        // None marks the end of the body so a trailing unterminated line is flushed
        let mut decoder = SseDecoder::new();
        let chunks = response
            .bytes_stream()
            .map(Some)
            .chain(stream::once(future::ready(None)))
            .map(move |bytes| {
                let payloads = match bytes {
                    Some(Ok(bytes)) => decoder.feed(&bytes),
                    Some(Err(e)) => return vec![Err(CompleteError::from(e))],
                    None => decoder.finish().into_iter().collect(),
                };
                payloads
                    .iter()
                    .filter_map(|data| parse_chunk(data).transpose())
                    .collect::<Vec<_>>()
            })
            .flat_map(stream::iter);

        Ok(chunks.boxed())
    }

    fn name(&self) -> &str {
        "openai"
    }
}
