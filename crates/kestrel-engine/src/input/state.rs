use std::collections::{HashMap, HashSet};

use glam::Vec2;

use super::types::{ControllerAxis, ControllerButton, Key, Modifiers, MouseButton};

/// What is currently held, and where the cursor is.
///
/// Updated by the window while it dispatches queued events, so it always
/// matches what delegates have been told.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    pub modifiers: Modifiers,

    /// Last cursor position in window pixels. `None` until the first mouse event.
    pub cursor_position: Option<Vec2>,

    pub keys_down: HashSet<Key>,
    pub buttons_down: HashSet<MouseButton>,
    pub controller_buttons_down: HashSet<(u32, ControllerButton)>,
    pub controller_axes: HashMap<(u32, ControllerAxis), f32>,
}

impl InputState {
    /// Returns false when the key was already down (a repeat).
    pub(crate) fn press_key(&mut self, key: Key) -> bool {
        self.track_modifier(key, true);
        self.keys_down.insert(key)
    }

    pub(crate) fn release_key(&mut self, key: Key) -> bool {
        self.track_modifier(key, false);
        self.keys_down.remove(&key)
    }

    fn track_modifier(&mut self, key: Key, down: bool) {
        match key {
            Key::Shift => self.modifiers.shift = down,
            Key::Control => self.modifiers.ctrl = down,
            Key::Alt => self.modifiers.alt = down,
            Key::Meta => self.modifiers.meta = down,
            _ => {}
        }
    }

    /// Focus loss: nothing can be released while unfocused, so forget what is held.
    pub(crate) fn release_all(&mut self) {
        self.keys_down.clear();
        self.buttons_down.clear();
        self.controller_buttons_down.clear();
        self.modifiers = Modifiers::default();
    }

    pub fn key_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn button_down(&self, button: MouseButton) -> bool {
        self.buttons_down.contains(&button)
    }

    pub fn controller_button_down(&self, controller: u32, button: ControllerButton) -> bool {
        self.controller_buttons_down.contains(&(controller, button))
    }

    pub fn controller_axis(&self, controller: u32, axis: ControllerAxis) -> f32 {
        self.controller_axes.get(&(controller, axis)).copied().unwrap_or(0.0)
    }
}
