use raw_window_handle::WindowHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::queue::EventSender;

/// What the platform is asked to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "kestrel".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Facts about the display the window lives on.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SystemInfo {
    /// Native resolution of the display, in pixels.
    pub display_resolution: (u32, u32),
    pub scale_factor: f64,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            display_resolution: (1920, 1080),
            scale_factor: 1.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("window backend '{backend}' failed to create a window: {reason}")]
    Creation { backend: &'static str, reason: String },

    #[error("invalid window size {0}x{1}")]
    InvalidSize(u32, u32),
}

/// Platform shim under a [`Window`](super::Window).
///
/// Backends translate platform input into queued events and apply window
/// changes. They never call delegates; the window does that while draining.
pub trait WindowBackend {
    fn name(&self) -> &'static str;

    fn create(&mut self, spec: &WindowSpec) -> Result<(), WindowError>;
    fn destroy(&mut self);

    /// Pumps pending platform events onto `sender`. Backends whose event loop
    /// is driven from outside queue as events arrive and do nothing here.
    fn check_events(&mut self, sender: &EventSender);

    /// Called after the render system presented the frame.
    fn present_frame(&mut self);

    fn set_title(&mut self, title: &str);

    /// False if the platform refused the change.
    fn apply_resolution(&mut self, width: u32, height: u32, fullscreen: bool) -> bool;

    fn set_cursor_visible(&mut self, visible: bool);

    fn system_info(&self) -> SystemInfo;

    /// Native handle for GPU surface creation. `None` for backends without one.
    fn window_handle(&self) -> Option<WindowHandle<'_>> {
        None
    }
}
