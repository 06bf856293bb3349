//! The capture → complete → paste sequence run for each hotkey press.

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use futures_util::StreamExt;
use quill_complete::{Completer, CompletionRequest};
use quill_core::Settings;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Read and write access to the clipboard's text.
pub trait ClipboardAccess {
    fn get_text(&mut self) -> Result<String>;
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// Simulated copy and paste keyboard shortcuts.
pub trait KeySender {
    fn copy(&mut self) -> Result<()>;
    fn paste(&mut self) -> Result<()>;
}

/// Pauses between the steps of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delays {
    /// Before touching the keyboard, so the hotkey's own modifiers are up
    pub modifier_release: Duration,
    /// Between the simulated copy and reading the clipboard
    pub copy: Duration,
    /// After the simulated paste, before the clipboard is restored
    pub paste: Duration,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            modifier_release: Duration::from_millis(150),
            copy: Duration::from_millis(100),
            paste: Duration::from_millis(100),
        }
    }
}

impl Delays {
    pub fn none() -> Self {
        Self {
            modifier_release: Duration::ZERO,
            copy: Duration::ZERO,
            paste: Duration::ZERO,
        }
    }
}

/// A hotkey action resolved against the settings at press time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub action: String,
    pub prompt: String,
    pub system_prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub stream: bool,
}

impl Job {
    /// Returns `None` if `action` is not configured.
    pub fn from_settings(settings: &Settings, action: &str) -> Option<Self> {
        let hotkey = settings.hotkey(action)?;
        Some(Self {
            action: action.to_string(),
            prompt: hotkey.prompt.clone(),
            system_prompt: settings.system_prompt.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            stream: settings.stream,
        })
    }

    pub fn request(&self, text: &str) -> CompletionRequest {
        CompletionRequest::for_prompt(
            &self.model,
            self.max_tokens,
            &self.system_prompt,
            &self.prompt,
            text,
        )
    }
}

/// How a request ended. The clipboard has been restored in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The selection was replaced with the completion
    Replaced { chars: usize },
    /// The copy produced no text
    NothingSelected,
    /// The completion came back empty
    EmptyResponse,
    /// A step failed
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Replaced { .. })
    }
}

/// Drives the clipboard and keyboard for one request at a time.
pub struct Dispatcher<C, K> {
    clipboard: C,
    keys: K,
    runtime: Handle,
    delays: Delays,
}

impl<C: ClipboardAccess, K: KeySender> Dispatcher<C, K> {
    pub fn new(clipboard: C, keys: K, runtime: Handle) -> Self {
        Self {
            clipboard,
            keys,
            runtime,
            delays: Delays::default(),
        }
    }

    pub fn with_delays(mut self, delays: Delays) -> Self {
        self.delays = delays;
        self
    }

    /// Replaces the highlighted text with the completion for `job`.
    ///
    /// Blocks until done. Must not be called from inside the runtime.
    pub fn handle(&mut self, client: &dyn Completer, job: &Job) -> Outcome {
        let before = Instant::now();
        sleep(self.delays.modifier_release);

        let original = match self.clipboard.get_text() {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Failed to get clipboard text, it will not be restored: {:#}", e);
                None
            }
        };

        let outcome = self
            .run(client, job)
            .unwrap_or_else(|e| Outcome::Failed(format!("{e:#}")));

        if let Some(original) = original {
            if let Err(e) = self.clipboard.set_text(&original) {
                warn!("Failed to restore clipboard text: {:#}", e);
            }
        }

        match &outcome {
            Outcome::Replaced { chars } => info!(
                action = %job.action,
                chars,
                duration = ?before.elapsed(),
                "Replaced highlighted text"
            ),
            Outcome::NothingSelected => warn!(action = %job.action, "No text highlighted"),
            Outcome::EmptyResponse => warn!(action = %job.action, "Received empty completion"),
            Outcome::Failed(e) => error!(action = %job.action, "Hotkey request failed: {}", e),
        }
        outcome
    }

    fn run(&mut self, client: &dyn Completer, job: &Job) -> Result<Outcome> {
        self.keys.copy().context("Failed to simulate copy")?;
        sleep(self.delays.copy);

        // A copy with nothing highlighted can leave non-text on the clipboard
        let text = self.clipboard.get_text().unwrap_or_else(|e| {
            debug!("Clipboard holds no text after copy: {:#}", e);
            String::new()
        });
        if text.trim().is_empty() {
            return Ok(Outcome::NothingSelected);
        }

        let request = job.request(&text);
        debug!(action = %job.action, model = %job.model, stream = job.stream, "Requesting completion");
        let completion = if job.stream {
            self.runtime
                .block_on(collect_stream(client, &request))
                .map_err(|e| anyhow!("Streamed completion failed: {e}"))?
        } else {
            self.runtime.block_on(quill_complete::complete(client, &request))
        };
        if completion.is_empty() {
            return Ok(Outcome::EmptyResponse);
        }

        self.clipboard
            .set_text(&completion)
            .context("Failed to set clipboard text")?;
        self.keys.paste().context("Failed to simulate paste")?;
        sleep(self.delays.paste);

        Ok(Outcome::Replaced {
            chars: completion.chars().count(),
        })
    }
}

/// Concatenates every chunk of a streamed completion.
async fn collect_stream(
    client: &dyn Completer,
    request: &CompletionRequest,
) -> quill_complete::Result<String> {
    let mut chunks = quill_complete::stream(client, request).await?;
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}
