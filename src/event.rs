//! Application events for the tao event loop.

use global_hotkey::GlobalHotKeyEvent;
use quill_core::ActivityState;
use tray_icon::menu::MenuEvent;

use crate::dispatch::Outcome;

/// Events delivered to the tray's event loop.
#[derive(Debug, Clone)]
pub enum QuillEvent {
    /// A registered hotkey was pressed or released
    Hotkey(GlobalHotKeyEvent),
    /// A tray menu item was clicked
    Menu(MenuEvent),
    /// The dispatcher started or stopped working on a request
    StateChanged(ActivityState),
    /// A hotkey request ran to completion
    Finished { action: String, outcome: Outcome },
}
