//! System clipboard and keystroke simulation.

use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use arboard::Clipboard;
use enigo::Direction::{Click, Press, Release};
use enigo::{Enigo, Key, Keyboard};

use crate::dispatch::{ClipboardAccess, KeySender};

const KEY_GAP: Duration = Duration::from_millis(10);

/// The OS clipboard, via arboard.
pub struct SystemClipboard {
    clipboard: Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        Ok(Self {
            clipboard: Clipboard::new().context("Failed to open clipboard")?,
        })
    }
}

impl ClipboardAccess for SystemClipboard {
    fn get_text(&mut self) -> Result<String> {
        Ok(self.clipboard.get_text()?)
    }

    fn set_text(&mut self, text: &str) -> Result<()> {
        Ok(self.clipboard.set_text(text)?)
    }
}

/// Simulated copy and paste shortcuts, via enigo. Enigo is not Send, so this
/// lives on the dispatcher thread for its whole life.
pub struct SystemKeys {
    enigo: Enigo,
}

impl SystemKeys {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&enigo::Settings::default())
            .context("Failed to create keystroke simulator")?;
        Ok(Self { enigo })
    }

    fn chord(&mut self, key: char) -> Result<()> {
        #[cfg(target_os = "macos")]
        let modifier = Key::Meta;
        #[cfg(not(target_os = "macos"))]
        let modifier = Key::Control;

        self.enigo.key(modifier, Press)?;
        sleep(KEY_GAP);
        let clicked = self.enigo.key(Key::Unicode(key), Click);
        sleep(KEY_GAP);
        // release the modifier even if the click failed
        self.enigo.key(modifier, Release)?;
        Ok(clicked?)
    }
}

impl KeySender for SystemKeys {
    fn copy(&mut self) -> Result<()> {
        self.chord('c')
    }

    fn paste(&mut self) -> Result<()> {
        self.chord('v')
    }
}
