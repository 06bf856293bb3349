//! Activity state shown by the tray icon.

/// What the hotkey dispatcher is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// Waiting for a hotkey
    Idle,
    /// Capturing text, waiting on the completion or pasting
    Working,
    /// The last request failed
    Failed,
}
