//! Hotkey id → action registration.

use global_hotkey::GlobalHotKeyManager;
use global_hotkey::hotkey::HotKey;
use quill_core::{HotkeyAction, Settings};
use thiserror::Error;
use tracing::{error, info, warn};

/// Parse a configured key combination.
pub trait HotkeyActionExt {
    fn hotkey(&self) -> Result<HotKey, global_hotkey::hotkey::HotKeyParseError>;
}

impl HotkeyActionExt for HotkeyAction {
    fn hotkey(&self) -> Result<HotKey, global_hotkey::hotkey::HotKeyParseError> {
        self.key_combo.parse()
    }
}

/// A hotkey bound to the action it triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub action: String,
    pub hotkey: HotKey,
}

/// A configured action that could not be bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Invalid key combination {combo:?} for {action}: {reason}")]
    Unparseable {
        action: String,
        combo: String,
        reason: String,
    },

    #[error("Key combination {combo:?} for {action} is already bound to {existing}")]
    Duplicate {
        action: String,
        combo: String,
        existing: String,
    },
}

/// Works out which actions get which hotkeys. Actions are visited in name
/// order and the first one to claim a key combination keeps it.
pub fn plan(settings: &Settings) -> (Vec<Binding>, Vec<Rejection>) {
    let mut bindings: Vec<Binding> = Vec::new();
    let mut rejections = Vec::new();

    for (action, hotkey_action) in &settings.hotkeys {
        let hotkey = match hotkey_action.hotkey() {
            Ok(hotkey) => hotkey,
            Err(e) => {
                rejections.push(Rejection::Unparseable {
                    action: action.clone(),
                    combo: hotkey_action.key_combo.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if let Some(existing) = bindings.iter().find(|b| b.hotkey.id() == hotkey.id()) {
            rejections.push(Rejection::Duplicate {
                action: action.clone(),
                combo: hotkey_action.key_combo.clone(),
                existing: existing.action.clone(),
            });
            continue;
        }

        bindings.push(Binding {
            action: action.clone(),
            hotkey,
        });
    }

    (bindings, rejections)
}

/// Hotkeys currently registered with the OS.
#[derive(Debug, Default)]
pub struct HotkeyBindings {
    bindings: Vec<Binding>,
}

impl HotkeyBindings {
    /// Registers every bindable action from `settings`. Problems with single
    /// actions are logged and skipped.
    pub fn register(manager: &GlobalHotKeyManager, settings: &Settings) -> Self {
        let (planned, rejections) = plan(settings);
        for rejection in rejections {
            warn!("{}", rejection);
        }

        let mut bindings = Vec::with_capacity(planned.len());
        for binding in planned {
            match manager.register(binding.hotkey) {
                Ok(()) => {
                    info!(action = %binding.action, hotkey = ?binding.hotkey, "Registered hotkey");
                    bindings.push(binding);
                }
                Err(e) => error!(
                    action = %binding.action,
                    "Failed to register hotkey {:?}: {}",
                    binding.hotkey,
                    e
                ),
            }
        }

        if bindings.is_empty() {
            warn!("No hotkeys registered");
        }
        Self { bindings }
    }

    pub fn unregister_all(&mut self, manager: &GlobalHotKeyManager) {
        for binding in self.bindings.drain(..) {
            if let Err(e) = manager.unregister(binding.hotkey) {
                warn!(action = %binding.action, "Failed to unregister hotkey: {}", e);
            }
        }
    }

    /// The action bound to the hotkey with this event id.
    pub fn action_for(&self, id: u32) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.hotkey.id() == id)
            .map(|b| b.action.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
