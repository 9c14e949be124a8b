//! winit platform layer.
//!
//! [`run`] owns the winit event loop. It opens the native window on resume,
//! builds a wgpu-backed [`RenderSystem`] on it, and drives
//! [`Window::update_one_frame`] from `RedrawRequested`.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use raw_window_handle::{HasWindowHandle, WindowHandle};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Fullscreen, Window as NativeWindow, WindowId};

use crate::config::EngineConfig;
use crate::device::{GpuInit, WgpuDevice};
use crate::input::platform::winit::WinitTranslator;
use crate::render::RenderSystem;

use super::{EventSender, SystemEvent, SystemInfo, Window, WindowBackend, WindowError, WindowSpec};

/// [`WindowBackend`] over a native winit window.
///
/// The native window is opened by the event loop before the backend is
/// created; `create` applies the requested spec to it.
pub struct WinitWindowBackend {
    window: Arc<NativeWindow>,
    created: bool,
}

impl WinitWindowBackend {
    pub fn new(window: Arc<NativeWindow>) -> Self {
        Self { window, created: false }
    }

    pub fn native(&self) -> &Arc<NativeWindow> {
        &self.window
    }

    fn fullscreen_mode(fullscreen: bool) -> Option<Fullscreen> {
        fullscreen.then(|| Fullscreen::Borderless(None))
    }
}

impl WindowBackend for WinitWindowBackend {
    fn name(&self) -> &'static str {
        "winit"
    }

    fn create(&mut self, spec: &WindowSpec) -> Result<(), WindowError> {
        self.window.set_title(&spec.title);
        self.window.set_fullscreen(Self::fullscreen_mode(spec.fullscreen));
        if !spec.fullscreen {
            let _ = self.window.request_inner_size(PhysicalSize::new(spec.width, spec.height));
        }
        self.window.set_visible(true);
        self.created = true;
        Ok(())
    }

    fn destroy(&mut self) {
        self.window.set_visible(false);
        self.created = false;
    }

    fn check_events(&mut self, _sender: &EventSender) {}

    fn present_frame(&mut self) {
        self.window.request_redraw();
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn apply_resolution(&mut self, width: u32, height: u32, fullscreen: bool) -> bool {
        if !self.created {
            return false;
        }
        self.window.set_fullscreen(Self::fullscreen_mode(fullscreen));
        if !fullscreen {
            let _ = self.window.request_inner_size(PhysicalSize::new(width, height));
        }
        true
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.window.set_cursor_visible(visible);
    }

    fn system_info(&self) -> SystemInfo {
        let scale_factor = self.window.scale_factor();
        match self.window.current_monitor() {
            Some(monitor) => {
                let size = monitor.size();
                SystemInfo { display_resolution: (size.width, size.height), scale_factor }
            }
            None => SystemInfo { scale_factor, ..SystemInfo::default() },
        }
    }

    fn window_handle(&self) -> Option<WindowHandle<'_>> {
        self.window.window_handle().ok()
    }
}

/// Runs the engine on a native window until the main loop ends.
///
/// `setup` runs once the window and render system exist; it installs the
/// delegates and loads startup resources.
pub fn run<F>(config: EngineConfig, gpu_init: GpuInit, setup: F) -> Result<()>
where
    F: FnOnce(&mut Window, &mut RenderSystem) -> Result<()> + 'static,
{
    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = PlatformApp {
        config,
        gpu_init,
        setup: Some(Box::new(setup)),
        session: None,
        error: None,
    };

    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

type Setup = Box<dyn FnOnce(&mut Window, &mut RenderSystem) -> Result<()>>;

struct Session {
    native: Arc<NativeWindow>,
    window: Window,
    render: RenderSystem,
    translator: WinitTranslator,
    sender: EventSender,
}

impl Session {
    fn shutdown(&mut self) {
        self.window.destroy();
        self.render.destroy();
    }
}

struct PlatformApp {
    config: EngineConfig,
    gpu_init: GpuInit,
    setup: Option<Setup>,
    session: Option<Session>,
    error: Option<anyhow::Error>,
}

impl PlatformApp {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<Session> {
        let spec = self.config.window.spec();
        let attrs = NativeWindow::default_attributes()
            .with_title(spec.title.clone())
            .with_inner_size(PhysicalSize::new(spec.width, spec.height))
            .with_visible(false);
        let native = Arc::new(event_loop.create_window(attrs).context("failed to create window")?);

        let device = WgpuDevice::new(native.clone(), self.gpu_init.clone());
        let mut render = RenderSystem::new(Box::new(device), self.config.render.clone());
        render
            .create(self.config.render.options)
            .context("failed to create render system")?;

        let mut window = Window::new(
            Box::new(WinitWindowBackend::new(native.clone())),
            self.config.window.clone(),
        );
        window.create(spec).context("failed to create window")?;
        let size = native.inner_size();
        render.on_resolution_changed(size.width, size.height);

        let setup = self.setup.take().ok_or_else(|| anyhow!("setup already ran"))?;
        setup(&mut window, &mut render).context("setup failed")?;

        let sender = window.sender();
        Ok(Session {
            native,
            window,
            render,
            translator: WinitTranslator::default(),
            sender,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        self.exit(event_loop);
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for PlatformApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() || self.error.is_some() {
            return;
        }
        match self.open(event_loop) {
            Ok(session) => {
                session.native.request_redraw();
                self.session = Some(session);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(session) = &self.session {
            session.native.request_redraw();
        }
    }

    fn memory_warning(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(session) = &self.session {
            session.sender.queue_system_event(SystemEvent::LowMemory);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.native.id() != window_id {
            return;
        }

        if let WindowEvent::RedrawRequested = event {
            let Session { window, render, .. } = session;
            if !window.update_one_frame(render) {
                self.exit(event_loop);
            }
            return;
        }

        let fullscreen = session.native.fullscreen().is_some();
        session.translator.translate(&event, fullscreen, &session.sender);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut session) = self.session.take() {
            session.shutdown();
        }
    }
}
