//! User-facing settings as immutable published snapshots
//!
//! Sensitivity, axis inversion, and hotkeys are mutated from outside the
//! tick loop (typically a UI thread) while the tick task and the decode
//! workers read them. Mutators build a complete new [`Settings`] value and
//! publish it atomically over a watch channel, so a reader never observes a
//! torn, partially-updated value — it borrows whichever whole snapshot was
//! most recently published.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Default sensitivity multiplier applied to raw motion counts.
pub const DEFAULT_SENSITIVITY: f32 = 0.0045;

/// Logical hotkey roles mapped to optional raw device keycodes.
///
/// `toggle` drives injection on/off. The two mouse-button entries are the
/// keycodes a front end wants mouse buttons remapped to while injecting;
/// they are surfaced as notifications, not synthesized by this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyTable {
    pub toggle: Option<u16>,
    pub mouse_button_1: Option<u16>,
    pub mouse_button_2: Option<u16>,
}

/// One immutable snapshot of everything the user can configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Multiplier applied by the game driver to scaled deltas. Not clamped.
    pub sensitivity: f32,
    /// Negate the horizontal raw delta before it reaches the driver.
    pub invert_x: bool,
    /// Negate the vertical raw delta before it reaches the driver.
    pub invert_y: bool,
    /// Front-end preference; this crate only carries the flag.
    pub hide_cursor: bool,
    pub hotkeys: HotkeyTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            invert_x: false,
            invert_y: false,
            hide_cursor: false,
            hotkeys: HotkeyTable::default(),
        }
    }
}

/// Writer half of the published settings.
///
/// Each mutator clones the current snapshot, applies one change, and
/// replaces the published value in a single operation.
#[derive(Debug)]
pub struct SettingsPublisher {
    tx: watch::Sender<Settings>,
}

impl SettingsPublisher {
    /// Create a publisher (and its first subscriber) from initial settings.
    pub fn new(initial: Settings) -> (Self, watch::Receiver<Settings>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }

    /// Subscribe another reader.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn set_sensitivity(&self, sensitivity: f32) {
        self.publish(|s| s.sensitivity = sensitivity);
    }

    pub fn set_invert_x(&self, invert: bool) {
        self.publish(|s| s.invert_x = invert);
    }

    pub fn set_invert_y(&self, invert: bool) {
        self.publish(|s| s.invert_y = invert);
    }

    pub fn set_hide_cursor(&self, hide: bool) {
        self.publish(|s| s.hide_cursor = hide);
    }

    pub fn set_toggle_key(&self, keycode: Option<u16>) {
        self.publish(|s| s.hotkeys.toggle = keycode);
    }

    pub fn set_mouse_button_keys(&self, button_1: Option<u16>, button_2: Option<u16>) {
        self.publish(|s| {
            s.hotkeys.mouse_button_1 = button_1;
            s.hotkeys.mouse_button_2 = button_2;
        });
    }

    fn publish(&self, change: impl FnOnce(&mut Settings)) {
        let mut next = self.tx.borrow().clone();
        change(&mut next);
        self.tx.send_replace(next);
    }
}
