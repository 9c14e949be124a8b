use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use crate::input::{ControllerAxis, ControllerButton, InputMode, InputState, Key, MouseButton};
use crate::render::RenderSystem;
use crate::time::FrameTime;

/// Per-frame context passed to [`UpdateDelegate::on_update`].
pub struct FrameCtx<'a> {
    pub render: &'a mut RenderSystem,
    pub input: &'a InputState,
    /// `time.dt` is clamped, and zero while the window is unfocused.
    pub time: FrameTime,
    /// Window size in pixels.
    pub size: (u32, u32),
    pub fps: u32,
}

impl FrameCtx<'_> {
    #[inline]
    pub fn dt(&self) -> f32 {
        self.time.dt
    }
}

/// Called once per frame. Returning false ends the main loop.
pub trait UpdateDelegate {
    fn on_update(&mut self, ctx: &mut FrameCtx<'_>) -> bool;
}

/// Mouse callbacks. Single-touch input is delivered here too.
pub trait MouseDelegate {
    fn on_mouse_down(&mut self, button: MouseButton, position: Vec2) {
        let _ = (button, position);
    }

    fn on_mouse_up(&mut self, button: MouseButton, position: Vec2) {
        let _ = (button, position);
    }

    /// The last `on_mouse_down` will not get a matching `on_mouse_up`.
    fn on_mouse_cancel(&mut self, button: MouseButton, position: Vec2) {
        let _ = (button, position);
    }

    fn on_mouse_move(&mut self, position: Vec2) {
        let _ = position;
    }

    fn on_mouse_scroll(&mut self, delta: Vec2) {
        let _ = delta;
    }
}

pub trait KeyboardDelegate {
    fn on_key_down(&mut self, key: Key) {
        let _ = key;
    }

    fn on_key_up(&mut self, key: Key) {
        let _ = key;
    }

    fn on_char(&mut self, character: char) {
        let _ = character;
    }
}

/// Multi-touch callbacks.
pub trait TouchDelegate {
    /// Every active touch, in the order they went down. Empty once the last lifts.
    fn on_touch(&mut self, touches: &[Vec2]);
}

pub trait ControllerDelegate {
    fn on_button_down(&mut self, controller: u32, button: ControllerButton) {
        let _ = (controller, button);
    }

    fn on_button_up(&mut self, controller: u32, button: ControllerButton) {
        let _ = (controller, button);
    }

    fn on_axis_change(&mut self, controller: u32, axis: ControllerAxis, value: f32) {
        let _ = (controller, axis, value);
    }
}

pub trait SystemDelegate {
    fn on_window_size_changed(&mut self, width: u32, height: u32, fullscreen: bool) {
        let _ = (width, height, fullscreen);
    }

    fn on_focus_changed(&mut self, focused: bool) {
        let _ = focused;
    }

    /// Asked before the main loop is ended by a quit request. False keeps running.
    fn on_quit(&mut self, can_cancel: bool) -> bool {
        let _ = can_cancel;
        true
    }

    fn on_low_memory(&mut self) {}

    fn on_virtual_keyboard_changed(&mut self, visible: bool, height_ratio: f32) {
        let _ = (visible, height_ratio);
    }

    fn on_input_mode_changed(&mut self, mode: InputMode) {
        let _ = mode;
    }
}

/// Delegate slots of a window. Released on `Window::destroy`.
#[derive(Default)]
pub(crate) struct Delegates {
    pub update: Option<Rc<RefCell<dyn UpdateDelegate>>>,
    pub mouse: Option<Rc<RefCell<dyn MouseDelegate>>>,
    pub keyboard: Option<Rc<RefCell<dyn KeyboardDelegate>>>,
    pub touch: Option<Rc<RefCell<dyn TouchDelegate>>>,
    pub controller: Option<Rc<RefCell<dyn ControllerDelegate>>>,
    pub system: Option<Rc<RefCell<dyn SystemDelegate>>>,
}

impl Delegates {
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Calls `f` on the delegate in `slot`, if any.
pub(crate) fn with<D: ?Sized, R>(
    slot: &Option<Rc<RefCell<D>>>,
    f: impl FnOnce(&mut D) -> R,
) -> Option<R> {
    let delegate = slot.as_ref()?;
    let mut delegate = delegate.borrow_mut();
    Some(f(&mut *delegate))
}
