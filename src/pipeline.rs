use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use quill_core::ActivityState;
use tao::event_loop::EventLoopProxy;
use tracing::{debug, error, info, warn};

use crate::context::AppContext;
use crate::dispatch::{ClipboardAccess, Dispatcher, Job, KeySender, Outcome};
use crate::event::QuillEvent;
use crate::input::{SystemClipboard, SystemKeys};

/// Where the pipeline reports progress.
pub trait EventSink: Send + 'static {
    fn send(&self, event: QuillEvent);
}

impl EventSink for EventLoopProxy<QuillEvent> {
    fn send(&self, event: QuillEvent) {
        // only fails once the event loop is gone
        self.send_event(event).ok();
    }
}

impl EventSink for Sender<QuillEvent> {
    fn send(&self, event: QuillEvent) {
        Sender::send(self, event).ok();
    }
}

/// Queue of hotkey actions, processed one at a time to completion on a
/// dedicated thread. The clipboard and keystroke simulator are created on
/// that thread and never leave it.
pub struct Pipeline {
    actions: Sender<String>,
    worker: JoinHandle<()>,
}

impl Pipeline {
    /// Start the worker using the system clipboard and keyboard.
    pub fn spawn(context: Arc<AppContext>, events: impl EventSink) -> Result<Self> {
        Self::spawn_with(context, events, || {
            let clipboard = SystemClipboard::new()?;
            let keys = SystemKeys::new()?;
            Ok((clipboard, keys))
        })
    }

    /// Start the worker with the clipboard and keyboard returned by `devices`,
    /// which runs on the worker thread.
    pub fn spawn_with<C, K, F>(context: Arc<AppContext>, events: impl EventSink, devices: F) -> Result<Self>
    where
        C: ClipboardAccess,
        K: KeySender,
        F: FnOnce() -> Result<(C, K)> + Send + 'static,
    {
        let (actions, receiver) = channel();
        let worker = std::thread::Builder::new()
            .name("quill-dispatch".to_string())
            .spawn(move || match devices() {
                Ok((clipboard, keys)) => {
                    let dispatcher = Dispatcher::new(clipboard, keys, context.handle());
                    run(dispatcher, &context, &receiver, &events);
                }
                Err(e) => error!("Failed to set up clipboard and keyboard: {:#}", e),
            })
            .context("Failed to spawn dispatcher thread")?;

        Ok(Self { actions, worker })
    }

    /// Queue `action` to run after any requests already waiting.
    pub fn submit(&self, action: &str) -> Result<()> {
        info!(action, "Hotkey pressed");
        self.actions
            .send(action.to_string())
            .context("Dispatcher thread has stopped")
    }

    /// Stop accepting actions and wait for queued ones to finish.
    pub fn shutdown(self) {
        drop(self.actions);
        if self.worker.join().is_err() {
            error!("Dispatcher thread panicked");
        }
    }
}

fn run<C: ClipboardAccess, K: KeySender>(
    mut dispatcher: Dispatcher<C, K>,
    context: &AppContext,
    actions: &Receiver<String>,
    events: &impl EventSink,
) {
    while let Ok(action) = actions.recv() {
        let settings = context.snapshot();
        let Some(job) = Job::from_settings(&settings, &action) else {
            warn!(action = %action, "Hotkey action is no longer configured");
            continue;
        };
        let Some(client) = context.client() else {
            error!(
                "API key is not set. Set it with `quill settings save --api-key <key>` \
                 and reload settings."
            );
            events.send(QuillEvent::StateChanged(ActivityState::Failed));
            continue;
        };

        events.send(QuillEvent::StateChanged(ActivityState::Working));
        let outcome = dispatcher.handle(client.as_ref(), &job);
        let state = match outcome {
            Outcome::Replaced { .. } | Outcome::NothingSelected => ActivityState::Idle,
            Outcome::EmptyResponse | Outcome::Failed(_) => ActivityState::Failed,
        };
        events.send(QuillEvent::StateChanged(state));
        events.send(QuillEvent::Finished { action, outcome });
    }
    debug!("Dispatcher thread exiting");
}
