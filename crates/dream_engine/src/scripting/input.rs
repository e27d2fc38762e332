//! Input snapshot handed to focused entities

use std::collections::{HashMap, HashSet};

/// Keyboard, mouse and axis state for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    keys: HashSet<String>,
    mouse_buttons: HashSet<u32>,
    mouse_position: (f32, f32),
    axes: HashMap<String, f32>,
}

impl InputState {
    /// Nothing pressed
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a key pressed or released
    pub fn set_key(&mut self, key: &str, pressed: bool) {
        if pressed {
            self.keys.insert(key.to_string());
        } else {
            self.keys.remove(key);
        }
    }

    /// Whether a key is held
    pub fn is_key_down(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Mark a mouse button pressed or released
    pub fn set_mouse_button(&mut self, button: u32, pressed: bool) {
        if pressed {
            self.mouse_buttons.insert(button);
        } else {
            self.mouse_buttons.remove(&button);
        }
    }

    /// Whether a mouse button is held
    pub fn is_mouse_button_down(&self, button: u32) -> bool {
        self.mouse_buttons.contains(&button)
    }

    /// Move the cursor
    pub fn set_mouse_position(&mut self, x: f32, y: f32) {
        self.mouse_position = (x, y);
    }

    /// Cursor position in window pixels
    pub const fn mouse_position(&self) -> (f32, f32) {
        self.mouse_position
    }

    /// Set an analogue axis, clamped to [-1, 1]
    pub fn set_axis(&mut self, axis: &str, value: f32) {
        self.axes.insert(axis.to_string(), value.clamp(-1.0, 1.0));
    }

    /// Analogue axis value, zero when unset
    pub fn axis(&self, axis: &str) -> f32 {
        self.axes.get(axis).copied().unwrap_or(0.0)
    }
}
