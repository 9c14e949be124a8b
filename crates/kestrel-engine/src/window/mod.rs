//! Window, event queue and main loop.
//!
//! Platform input arrives on an [`EventSender`] from any thread. The window
//! drains the queue once per frame on the logic thread, tracks held input
//! and touches, and dispatches to delegates. Nothing is dispatched outside
//! [`Window::update_one_frame`].

mod backend;
mod delegate;
mod headless;
pub mod platform;
mod queue;
mod touch;

pub use backend::{SystemInfo, WindowBackend, WindowError, WindowSpec};
pub use delegate::{
    ControllerDelegate, FrameCtx, KeyboardDelegate, MouseDelegate, SystemDelegate, TouchDelegate,
    UpdateDelegate,
};
pub use headless::{HeadlessWindowBackend, HeadlessWindowProbe, WindowCall};
pub use queue::{
    coalesce, EventQueue, EventSender, KeyEventKind, MouseEventKind, QueuedEvent, SystemEvent,
    TouchEventKind,
};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::input::{InputMode, InputState, Key, MouseButton};
use crate::render::RenderSystem;
use crate::time::{FpsCounter, FrameClock, TimeSource};

use self::delegate::{with, Delegates};
use self::touch::{TouchOutput, TouchTracker};

/// Window behavior and the initial window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,

    /// Upper clamp of the frame delta, in seconds.
    pub max_frame_delta: f32,
    pub min_frame_delta: f32,
    /// Seconds between fps counter updates.
    pub fps_resolution: f32,
    /// Share of the display resolution used when leaving fullscreen.
    pub windowed_scale_factor: f32,
    /// Sleep per frame while unfocused.
    pub unfocused_idle_sleep_ms: u64,
    pub unload_textures_on_focus_loss: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        let spec = WindowSpec::default();
        Self {
            title: spec.title,
            width: spec.width,
            height: spec.height,
            fullscreen: spec.fullscreen,
            max_frame_delta: 0.1,
            min_frame_delta: 0.0,
            fps_resolution: 0.5,
            windowed_scale_factor: 0.8,
            unfocused_idle_sleep_ms: 100,
            unload_textures_on_focus_loss: false,
        }
    }
}

impl WindowConfig {
    pub fn spec(&self) -> WindowSpec {
        WindowSpec {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            fullscreen: self.fullscreen,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WindowState {
    Uninitialized,
    Created,
    Running,
    FocusLost,
    /// The main loop was asked to end; the window still exists.
    Terminating,
    Destroyed,
}

/// A platform window plus the logic-thread half of its event pipeline.
pub struct Window {
    backend: Box<dyn WindowBackend>,
    config: WindowConfig,
    state: WindowState,
    spec: WindowSpec,
    cursor_visible: bool,

    queue: EventQueue,
    touches: TouchTracker,
    delegates: Delegates,
    input: InputState,
    input_mode: InputMode,
    focused: bool,

    clock: FrameClock,
    fps: FpsCounter,
    running: bool,
}

impl Window {
    pub fn new(backend: Box<dyn WindowBackend>, config: WindowConfig) -> Self {
        let clock = FrameClock::with_clamps(config.min_frame_delta, config.max_frame_delta);
        Self::build(backend, config, clock)
    }

    /// Like [`new`](Self::new) with frame deltas measured on `source`.
    pub fn with_time_source(
        backend: Box<dyn WindowBackend>,
        config: WindowConfig,
        source: Arc<dyn TimeSource>,
    ) -> Self {
        let clock =
            FrameClock::with_source(source, config.min_frame_delta, config.max_frame_delta);
        Self::build(backend, config, clock)
    }

    fn build(backend: Box<dyn WindowBackend>, config: WindowConfig, clock: FrameClock) -> Self {
        Self {
            backend,
            spec: config.spec(),
            fps: FpsCounter::new(config.fps_resolution),
            config,
            state: WindowState::Uninitialized,
            cursor_visible: true,
            queue: EventQueue::new(),
            touches: TouchTracker::default(),
            delegates: Delegates::default(),
            input: InputState::default(),
            input_mode: InputMode::default(),
            focused: false,
            clock,
            running: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_created(&self) -> bool {
        !matches!(self.state, WindowState::Uninitialized | WindowState::Destroyed)
    }

    pub fn backend(&self) -> &dyn WindowBackend {
        self.backend.as_ref()
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Opens the platform window. `Ok(false)` if it already exists.
    pub fn create(&mut self, spec: WindowSpec) -> Result<bool, WindowError> {
        if self.is_created() {
            return Ok(false);
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(WindowError::InvalidSize(spec.width, spec.height));
        }
        log::info!(
            "creating window '{}' {}x{} on '{}'{}",
            spec.title,
            spec.width,
            spec.height,
            self.name(),
            if spec.fullscreen { " (fullscreen)" } else { "" }
        );
        self.backend.create(&spec)?;
        self.spec = spec;
        self.state = WindowState::Created;
        self.focused = true;
        self.running = true;
        self.clock.reset();
        Ok(true)
    }

    /// Closes the window, drops queued events and releases every delegate.
    /// False if the window did not exist.
    pub fn destroy(&mut self) -> bool {
        if !self.is_created() {
            return false;
        }
        log::info!("destroying window '{}'", self.spec.title);
        self.running = false;
        self.backend.destroy();
        self.queue.clear();
        self.touches.clear();
        self.delegates.clear();
        self.input = InputState::default();
        self.state = WindowState::Destroyed;
        true
    }

    // ── main loop ────────────────────────────────────────────────────────

    /// Runs frames until the update delegate returns false, a quit request
    /// goes through, or [`terminate_main_loop`](Self::terminate_main_loop) is called.
    pub fn enter_main_loop(&mut self, render: &mut RenderSystem) {
        while self.update_one_frame(render) {}
    }

    /// One iteration of the main loop: drain and dispatch events, advance the
    /// clock, update, present. Returns whether to keep going.
    pub fn update_one_frame(&mut self, render: &mut RenderSystem) -> bool {
        if !self.is_created() {
            log::warn!("update_one_frame called on a window that does not exist");
            return false;
        }
        if !self.running {
            return false;
        }
        if self.state == WindowState::Created {
            self.state = WindowState::Running;
        }

        let sender = self.queue.sender();
        self.backend.check_events(&sender);
        self.process_events(render);
        if !self.running {
            return false;
        }

        let mut time = self.clock.tick();
        if !self.focused {
            time.dt = 0.0;
            if self.config.unfocused_idle_sleep_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.config.unfocused_idle_sleep_ms));
            }
        }
        self.fps.frame(time.raw_dt);
        render.update(time.dt);

        let size = (self.spec.width, self.spec.height);
        let fps = self.fps.fps();
        let input = &self.input;
        let keep_running = with(&self.delegates.update, |d| {
            let mut ctx = FrameCtx { render: &mut *render, input, time, size, fps };
            d.on_update(&mut ctx)
        })
        .unwrap_or(true);
        if !keep_running {
            self.terminate_main_loop();
        }

        self.present(render);
        self.running
    }

    fn present(&mut self, render: &mut RenderSystem) {
        if render.is_created() {
            if let Err(err) = render.present_frame() {
                log::warn!("present failed: {err}");
            }
        }
        self.backend.present_frame();
    }

    /// Ends the main loop after the current frame.
    pub fn terminate_main_loop(&mut self) {
        if self.running {
            log::debug!("main loop of window '{}' terminating", self.spec.title);
        }
        self.running = false;
        if self.is_created() {
            self.state = WindowState::Terminating;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Asks the system delegate whether to quit; a request that cannot be
    /// cancelled always goes through. Returns whether the loop was terminated.
    pub fn handle_quit_request(&mut self, can_cancel: bool) -> bool {
        let allowed = with(&self.delegates.system, |d| d.on_quit(can_cancel)).unwrap_or(true);
        if allowed || !can_cancel {
            self.terminate_main_loop();
            true
        } else {
            log::debug!("quit request cancelled by delegate");
            false
        }
    }

    /// Producer handle for platform code, possibly on another thread.
    pub fn sender(&self) -> EventSender {
        self.queue.sender()
    }

    // ── event dispatch ───────────────────────────────────────────────────

    fn process_events(&mut self, render: &mut RenderSystem) {
        for event in self.queue.drain() {
            match event {
                QueuedEvent::Key { kind, key, character } => self.dispatch_key(kind, key, character),
                QueuedEvent::Mouse { kind, position, button } => {
                    self.set_input_mode(InputMode::Mouse);
                    self.dispatch_mouse(kind, position, button);
                }
                QueuedEvent::Touch { kind, index, position } => {
                    self.set_input_mode(InputMode::Touch);
                    for out in self.touches.handle(kind, index, position) {
                        match out {
                            TouchOutput::Mouse(kind, position) => {
                                self.dispatch_mouse(kind, position, MouseButton::Left)
                            }
                            TouchOutput::Touches(touches) => {
                                with(&self.delegates.touch, |d| d.on_touch(&touches));
                            }
                        }
                    }
                }
                QueuedEvent::ControllerButton { kind, controller, button } => {
                    self.set_input_mode(InputMode::Controller);
                    match kind {
                        KeyEventKind::Down => {
                            self.input.controller_buttons_down.insert((controller, button));
                            with(&self.delegates.controller, |d| d.on_button_down(controller, button));
                        }
                        KeyEventKind::Up => {
                            self.input.controller_buttons_down.remove(&(controller, button));
                            with(&self.delegates.controller, |d| d.on_button_up(controller, button));
                        }
                    }
                }
                QueuedEvent::ControllerAxis { controller, axis, value } => {
                    self.input.controller_axes.insert((controller, axis), value);
                    with(&self.delegates.controller, |d| d.on_axis_change(controller, axis, value));
                }
                QueuedEvent::System(event) => self.dispatch_system(event, render),
            }
        }
    }

    fn dispatch_key(&mut self, kind: KeyEventKind, key: Key, character: Option<char>) {
        match kind {
            KeyEventKind::Down => {
                if !key.is_none() {
                    self.input.press_key(key);
                    with(&self.delegates.keyboard, |d| d.on_key_down(key));
                }
                if let Some(c) = character.filter(|c| *c != '\0' && *c != '\u{7f}') {
                    with(&self.delegates.keyboard, |d| d.on_char(c));
                }
            }
            KeyEventKind::Up => {
                if !key.is_none() {
                    self.input.release_key(key);
                    with(&self.delegates.keyboard, |d| d.on_key_up(key));
                }
            }
        }
    }

    fn dispatch_mouse(&mut self, kind: MouseEventKind, position: Vec2, button: MouseButton) {
        let mouse = &self.delegates.mouse;
        match kind {
            MouseEventKind::Down => {
                self.input.cursor_position = Some(position);
                self.input.buttons_down.insert(button);
                with(mouse, |d| d.on_mouse_down(button, position));
            }
            MouseEventKind::Up => {
                self.input.cursor_position = Some(position);
                self.input.buttons_down.remove(&button);
                with(mouse, |d| d.on_mouse_up(button, position));
            }
            MouseEventKind::Cancel => {
                self.input.buttons_down.remove(&button);
                with(mouse, |d| d.on_mouse_cancel(button, position));
            }
            MouseEventKind::Move => {
                self.input.cursor_position = Some(position);
                with(mouse, |d| d.on_mouse_move(position));
            }
            MouseEventKind::Scroll => {
                with(mouse, |d| d.on_mouse_scroll(position));
            }
        }
    }

    fn dispatch_system(&mut self, event: SystemEvent, render: &mut RenderSystem) {
        match event {
            SystemEvent::FocusChanged(focused) => self.handle_focus_change(focused, render),
            SystemEvent::LowMemory => {
                let unloaded = render.unload_textures();
                log::info!("low memory: {unloaded} textures unloaded");
                with(&self.delegates.system, |d| d.on_low_memory());
            }
            SystemEvent::QuitRequest { can_cancel } => {
                self.handle_quit_request(can_cancel);
            }
            SystemEvent::SizeChanged { width, height, fullscreen } => {
                if width == 0 || height == 0 {
                    log::debug!("ignoring {width}x{height} resize");
                    return;
                }
                let current = (self.spec.width, self.spec.height, self.spec.fullscreen);
                if (width, height, fullscreen) == current {
                    return;
                }
                self.apply_size(width, height, fullscreen, render);
            }
            SystemEvent::VirtualKeyboardChanged { visible, height_ratio } => {
                with(&self.delegates.system, |d| d.on_virtual_keyboard_changed(visible, height_ratio));
            }
            SystemEvent::InputModeChanged(mode) => self.set_input_mode(mode),
        }
    }

    fn handle_focus_change(&mut self, focused: bool, render: &mut RenderSystem) {
        if focused == self.focused {
            return;
        }
        self.focused = focused;
        if focused {
            log::debug!("window '{}' gained focus", self.spec.title);
            self.clock.reset();
            if self.state == WindowState::FocusLost {
                self.state = WindowState::Running;
            }
        } else {
            log::debug!("window '{}' lost focus", self.spec.title);
            self.input.release_all();
            if self.config.unload_textures_on_focus_loss {
                let unloaded = render.unload_textures();
                log::info!("focus lost: {unloaded} textures unloaded");
            }
            if matches!(self.state, WindowState::Created | WindowState::Running) {
                self.state = WindowState::FocusLost;
            }
        }
        with(&self.delegates.system, |d| d.on_focus_changed(focused));
    }

    // ── resolution ───────────────────────────────────────────────────────

    /// Switches to the display resolution, or back to a windowed size of
    /// `windowed_scale_factor` times the display resolution.
    pub fn set_fullscreen(&mut self, fullscreen: bool, render: &mut RenderSystem) -> bool {
        let (dw, dh) = self.backend.system_info().display_resolution;
        let (width, height) = if fullscreen {
            (dw, dh)
        } else {
            let scale = self.config.windowed_scale_factor;
            (
                ((dw as f32 * scale).round() as u32).max(1),
                ((dh as f32 * scale).round() as u32).max(1),
            )
        };
        self.set_resolution(width, height, fullscreen, render)
    }

    /// Resizes the window. The render system and the system delegate both
    /// see the new size before this returns.
    pub fn set_resolution(
        &mut self,
        width: u32,
        height: u32,
        fullscreen: bool,
        render: &mut RenderSystem,
    ) -> bool {
        if !self.is_created() {
            log::warn!("set_resolution on a window that does not exist");
            return false;
        }
        if width == 0 || height == 0 {
            log::warn!("cannot resize window to {width}x{height}");
            return false;
        }
        if !self.backend.apply_resolution(width, height, fullscreen) {
            log::warn!("'{}' refused resolution {width}x{height}", self.name());
            return false;
        }
        self.apply_size(width, height, fullscreen, render);
        true
    }

    fn apply_size(&mut self, width: u32, height: u32, fullscreen: bool, render: &mut RenderSystem) {
        log::info!(
            "window resolution {width}x{height}{}",
            if fullscreen { " (fullscreen)" } else { "" }
        );
        self.spec.width = width;
        self.spec.height = height;
        self.spec.fullscreen = fullscreen;
        render.on_resolution_changed(width, height);
        with(&self.delegates.system, |d| d.on_window_size_changed(width, height, fullscreen));
    }

    // ── queries and setters ──────────────────────────────────────────────

    pub fn size(&self) -> (u32, u32) {
        (self.spec.width, self.spec.height)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.spec.fullscreen
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.spec.height == 0 {
            return 1.0;
        }
        self.spec.width as f32 / self.spec.height as f32
    }

    pub fn title(&self) -> &str {
        &self.spec.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.spec.title = title.into();
        if self.is_created() {
            self.backend.set_title(&self.spec.title);
        }
    }

    pub fn is_cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    pub fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor_visible = visible;
        if self.is_created() {
            self.backend.set_cursor_visible(visible);
        }
    }

    /// Last dispatched cursor position.
    pub fn cursor_position(&self) -> Option<Vec2> {
        self.input.cursor_position
    }

    pub fn is_cursor_inside(&self) -> bool {
        let Some(p) = self.input.cursor_position else {
            return false;
        };
        p.x >= 0.0 && p.y >= 0.0 && p.x <= self.spec.width as f32 && p.y <= self.spec.height as f32
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn fps(&self) -> u32 {
        self.fps.fps()
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn is_key_down(&self, key: Key) -> bool {
        self.input.key_down(key)
    }

    /// Touches currently held down.
    pub fn active_touches(&self) -> usize {
        self.touches.active()
    }

    pub fn is_multi_touch(&self) -> bool {
        self.touches.is_multi_touch()
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    /// Notifies the system delegate when the mode actually changes.
    pub fn set_input_mode(&mut self, mode: InputMode) {
        if mode == self.input_mode {
            return;
        }
        log::debug!("input mode {} -> {mode}", self.input_mode);
        self.input_mode = mode;
        with(&self.delegates.system, |d| d.on_input_mode_changed(mode));
    }

    // ── delegates ────────────────────────────────────────────────────────

    pub fn set_update_delegate<D: UpdateDelegate + 'static>(&mut self, delegate: Rc<RefCell<D>>) {
        let delegate: Rc<RefCell<dyn UpdateDelegate>> = delegate;
        self.delegates.update = Some(delegate);
    }

    pub fn set_mouse_delegate<D: MouseDelegate + 'static>(&mut self, delegate: Rc<RefCell<D>>) {
        let delegate: Rc<RefCell<dyn MouseDelegate>> = delegate;
        self.delegates.mouse = Some(delegate);
    }

    pub fn set_keyboard_delegate<D: KeyboardDelegate + 'static>(
        &mut self,
        delegate: Rc<RefCell<D>>,
    ) {
        let delegate: Rc<RefCell<dyn KeyboardDelegate>> = delegate;
        self.delegates.keyboard = Some(delegate);
    }

    pub fn set_touch_delegate<D: TouchDelegate + 'static>(&mut self, delegate: Rc<RefCell<D>>) {
        let delegate: Rc<RefCell<dyn TouchDelegate>> = delegate;
        self.delegates.touch = Some(delegate);
    }

    pub fn set_controller_delegate<D: ControllerDelegate + 'static>(
        &mut self,
        delegate: Rc<RefCell<D>>,
    ) {
        let delegate: Rc<RefCell<dyn ControllerDelegate>> = delegate;
        self.delegates.controller = Some(delegate);
    }

    pub fn set_system_delegate<D: SystemDelegate + 'static>(&mut self, delegate: Rc<RefCell<D>>) {
        let delegate: Rc<RefCell<dyn SystemDelegate>> = delegate;
        self.delegates.system = Some(delegate);
    }

    pub fn clear_delegates(&mut self) {
        self.delegates.clear();
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("backend", &self.name())
            .field("state", &self.state)
            .field("spec", &self.spec)
            .field("input_mode", &self.input_mode)
            .finish()
    }
}
