//! 16-key hexadecimal keypad state.
//!
//! The keypad is the only point where state crosses from the outside world
//! into the execution context, so it is backed by atomics: frontends write
//! key transitions from their own thread, and the worker samples a snapshot
//! once per frame tick. A write may be observed on the current or the next
//! frame; key state is sampled, not transacted.

use std::sync::atomic::{AtomicBool, Ordering};

/// Number of keys on the CHIP-8 keypad (0–F).
pub const KEY_COUNT: usize = 16;

/// Shared key switch state; `true` is held down.
pub struct Keypad {
    keys: [AtomicBool; KEY_COUNT],
}

impl Keypad {
    pub fn new() -> Self {
        Keypad { keys: Default::default() }
    }

    /// Set one key's state. Indexes outside 0–15 are ignored.
    pub fn set(&self, index: usize, pressed: bool) {
        if let Some(key) = self.keys.get(index) {
            key.store(pressed, Ordering::Relaxed);
        }
    }

    /// Release every key.
    pub fn clear(&self) {
        for key in &self.keys {
            key.store(false, Ordering::Relaxed);
        }
    }

    /// Sample all 16 switches.
    pub fn snapshot(&self) -> [bool; KEY_COUNT] {
        let mut out = [false; KEY_COUNT];
        for (slot, key) in out.iter_mut().zip(&self.keys) {
            *slot = key.load(Ordering::Relaxed);
        }
        out
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}
