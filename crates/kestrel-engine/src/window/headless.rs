use std::cell::RefCell;
use std::rc::Rc;

use super::backend::{SystemInfo, WindowBackend, WindowError, WindowSpec};
use super::queue::{EventSender, QueuedEvent};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowCall {
    Create(WindowSpec),
    Destroy,
    Present,
    SetTitle(String),
    ApplyResolution { width: u32, height: u32, fullscreen: bool },
    SetCursorVisible(bool),
}

#[derive(Debug, Default)]
struct HeadlessWindowState {
    created: bool,
    calls: Vec<WindowCall>,
    pending: Vec<QueuedEvent>,
}

/// Inspection and injection handle onto a [`HeadlessWindowBackend`].
#[derive(Debug, Clone)]
pub struct HeadlessWindowProbe {
    state: Rc<RefCell<HeadlessWindowState>>,
}

impl HeadlessWindowProbe {
    /// Queues `event` as if the platform reported it; it is delivered on the
    /// window's next `check_events`.
    pub fn inject(&self, event: QueuedEvent) {
        self.state.borrow_mut().pending.push(event);
    }

    pub fn calls(&self) -> Vec<WindowCall> {
        self.state.borrow().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<WindowCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn is_created(&self) -> bool {
        self.state.borrow().created
    }

    pub fn frames_presented(&self) -> usize {
        self.state.borrow().calls.iter().filter(|c| **c == WindowCall::Present).count()
    }
}

/// Window backend with no platform window behind it.
#[derive(Debug)]
pub struct HeadlessWindowBackend {
    state: Rc<RefCell<HeadlessWindowState>>,
    info: SystemInfo,
    fail_create: bool,
}

impl HeadlessWindowBackend {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessWindowState::default())),
            info: SystemInfo::default(),
            fail_create: false,
        }
    }

    pub fn with_display_resolution(mut self, width: u32, height: u32) -> Self {
        self.info.display_resolution = (width, height);
        self
    }

    /// Makes `create` fail, as a platform without a display would.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn probe(&self) -> HeadlessWindowProbe {
        HeadlessWindowProbe { state: self.state.clone() }
    }

    fn record(&self, call: WindowCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl Default for HeadlessWindowBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowBackend for HeadlessWindowBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create(&mut self, spec: &WindowSpec) -> Result<(), WindowError> {
        self.record(WindowCall::Create(spec.clone()));
        if self.fail_create {
            return Err(WindowError::Creation {
                backend: self.name(),
                reason: "no display".to_string(),
            });
        }
        self.state.borrow_mut().created = true;
        Ok(())
    }

    fn destroy(&mut self) {
        self.record(WindowCall::Destroy);
        let mut state = self.state.borrow_mut();
        state.created = false;
        state.pending.clear();
    }

    fn check_events(&mut self, sender: &EventSender) {
        let pending = std::mem::take(&mut self.state.borrow_mut().pending);
        for event in pending {
            sender.push(event);
        }
    }

    fn present_frame(&mut self) {
        self.record(WindowCall::Present);
    }

    fn set_title(&mut self, title: &str) {
        self.record(WindowCall::SetTitle(title.to_string()));
    }

    fn apply_resolution(&mut self, width: u32, height: u32, fullscreen: bool) -> bool {
        self.record(WindowCall::ApplyResolution { width, height, fullscreen });
        self.state.borrow().created
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.record(WindowCall::SetCursorVisible(visible));
    }

    fn system_info(&self) -> SystemInfo {
        self.info
    }
}
