use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use kestrel_engine::config::EngineConfig;
use kestrel_engine::coords::{Color, Vec2};
use kestrel_engine::device::HeadlessDevice;
use kestrel_engine::image::PixelFormat;
use kestrel_engine::input::{InputMode, Key, MouseButton};
use kestrel_engine::render::{RenderOptions, RenderSystem, RenderSystemConfig};
use kestrel_engine::texture::TextureType;
use kestrel_engine::time::ManualTimeSource;
use kestrel_engine::window::{
    FrameCtx, HeadlessWindowBackend, HeadlessWindowProbe, KeyEventKind, MouseDelegate,
    MouseEventKind, QueuedEvent, SystemDelegate, SystemEvent, TouchEventKind, UpdateDelegate,
    Window, WindowConfig, WindowState,
};

#[derive(Default)]
struct Journal {
    lines: Vec<String>,
    deltas: Vec<f32>,
    frames_left: Option<u32>,
}

impl MouseDelegate for Journal {
    fn on_mouse_down(&mut self, button: MouseButton, p: Vec2) {
        self.lines.push(format!("down {button:?} {} {}", p.x, p.y));
    }
    fn on_mouse_move(&mut self, p: Vec2) {
        self.lines.push(format!("move {} {}", p.x, p.y));
    }
    fn on_mouse_scroll(&mut self, delta: Vec2) {
        self.lines.push(format!("scroll {}", delta.y));
    }
}

impl SystemDelegate for Journal {
    fn on_low_memory(&mut self) {
        self.lines.push("low memory".into());
    }
    fn on_focus_changed(&mut self, focused: bool) {
        self.lines.push(format!("focus {focused}"));
    }
    fn on_input_mode_changed(&mut self, mode: InputMode) {
        self.lines.push(format!("mode {mode}"));
    }
}

impl UpdateDelegate for Journal {
    fn on_update(&mut self, ctx: &mut FrameCtx<'_>) -> bool {
        self.deltas.push(ctx.dt());
        match &mut self.frames_left {
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
            None => true,
        }
    }
}

struct Harness {
    window: Window,
    render: RenderSystem,
    probe: HeadlessWindowProbe,
    time: ManualTimeSource,
    journal: Rc<RefCell<Journal>>,
}

fn harness(config: WindowConfig) -> Harness {
    let time = ManualTimeSource::new();
    let backend = HeadlessWindowBackend::new();
    let probe = backend.probe();
    let mut window = Window::with_time_source(Box::new(backend), config, Arc::new(time.clone()));
    window.create(window.config().spec()).expect("window");

    let mut render = RenderSystem::new(Box::new(HeadlessDevice::new()), RenderSystemConfig::default());
    render.create(RenderOptions::default()).expect("render");

    let journal = Rc::new(RefCell::new(Journal::default()));
    window.set_mouse_delegate(journal.clone());
    window.set_system_delegate(journal.clone());
    window.set_update_delegate(journal.clone());
    Harness { window, render, probe, time, journal }
}

fn quiet() -> WindowConfig {
    WindowConfig { unfocused_idle_sleep_ms: 0, ..WindowConfig::default() }
}

#[test]
fn events_from_another_thread_dispatch_on_the_next_frame() {
    let mut h = harness(quiet());
    let sender = h.window.sender();
    std::thread::spawn(move || {
        for x in 1..=3 {
            sender.queue_mouse_event(MouseEventKind::Move, Vec2::new(x as f32, 0.0), MouseButton::Left);
        }
        sender.queue_mouse_event(MouseEventKind::Down, Vec2::new(3.0, 0.0), MouseButton::Right);
        sender.queue_mouse_event(MouseEventKind::Scroll, Vec2::new(0.0, 1.0), MouseButton::Left);
        sender.queue_mouse_event(MouseEventKind::Scroll, Vec2::new(0.0, 2.0), MouseButton::Left);
    })
    .join()
    .expect("producer thread");

    assert!(h.journal.borrow().lines.is_empty(), "queuing never dispatches");
    assert!(h.window.update_one_frame(&mut h.render));
    assert_eq!(h.journal.borrow().lines, vec!["move 3 0", "down Right 3 0", "scroll 3"]);
    assert!(h.window.input().buttons_down.contains(&MouseButton::Right));
    assert_eq!(h.window.cursor_position(), Some(Vec2::new(3.0, 0.0)));
}

#[test]
fn backend_events_join_the_queue() {
    let mut h = harness(quiet());
    h.probe.inject(QueuedEvent::Key { kind: KeyEventKind::Down, key: Key::A, character: Some('a') });
    h.window.update_one_frame(&mut h.render);
    assert!(h.window.is_key_down(Key::A));

    h.probe.inject(QueuedEvent::System(SystemEvent::FocusChanged(false)));
    h.window.update_one_frame(&mut h.render);
    assert!(!h.window.is_key_down(Key::A), "focus loss releases held keys");
    assert_eq!(h.window.state(), WindowState::FocusLost);
}

#[test]
fn frame_delta_is_clamped() {
    let mut h = harness(WindowConfig { max_frame_delta: 0.2, ..quiet() });
    h.time.advance_secs(2.0);
    h.window.update_one_frame(&mut h.render);
    h.time.advance_secs(0.05);
    h.window.update_one_frame(&mut h.render);

    let deltas = h.journal.borrow().deltas.clone();
    assert_eq!(deltas.len(), 2);
    approx::assert_relative_eq!(deltas[0], 0.2);
    approx::assert_relative_eq!(deltas[1], 0.05, epsilon = 1e-4);
}

#[test]
fn inverted_frame_delta_bounds_from_config_still_run() {
    let cfg = EngineConfig::from_toml_str(
        "[window]\nmin_frame_delta = 0.5\nmax_frame_delta = 0.2\nunfocused_idle_sleep_ms = 0",
    )
    .expect("valid config");
    let mut h = harness(cfg.window);
    h.time.advance_secs(1.0);
    assert!(h.window.update_one_frame(&mut h.render));
    h.time.advance_secs(0.01);
    assert!(h.window.update_one_frame(&mut h.render));
    assert_eq!(h.journal.borrow().deltas, vec![0.5, 0.5]);
}

#[test]
fn unfocused_frames_see_zero_delta_and_focus_resets_the_clock() {
    let mut h = harness(quiet());
    h.window.sender().queue_system_event(SystemEvent::FocusChanged(false));
    h.time.advance_secs(0.05);
    h.window.update_one_frame(&mut h.render);

    h.window.sender().queue_system_event(SystemEvent::FocusChanged(true));
    h.time.advance_secs(0.05);
    h.window.update_one_frame(&mut h.render);

    let j = h.journal.borrow();
    assert_eq!(j.deltas, vec![0.0, 0.0], "the clock restarts when focus returns");
    assert_eq!(j.lines, vec!["focus false", "focus true"]);
    drop(j);
    assert_eq!(h.window.state(), WindowState::Running);
}

#[test]
fn idle_textures_unload_through_the_main_loop() {
    let mut h = harness(WindowConfig { max_frame_delta: 0.2, ..quiet() });
    h.render.set_idle_texture_unload_time(0.3);
    let tex = h
        .render
        .create_texture(2, 2, PixelFormat::Rgba, TextureType::Managed, Color::WHITE)
        .expect("texture");
    tex.set_dynamic(true);

    for _ in 0..2 {
        h.time.advance_secs(1.0);
        h.window.update_one_frame(&mut h.render);
    }
    assert!(tex.is_loaded());
    h.time.advance_secs(1.0);
    h.window.update_one_frame(&mut h.render);
    assert!(!tex.is_loaded());
}

#[test]
fn low_memory_and_focus_loss_unload_textures() {
    let mut h = harness(WindowConfig { unload_textures_on_focus_loss: true, ..quiet() });
    let tex = h
        .render
        .create_texture(1, 1, PixelFormat::Rgba, TextureType::Managed, Color::WHITE)
        .expect("texture");

    h.window.sender().queue_system_event(SystemEvent::LowMemory);
    h.window.update_one_frame(&mut h.render);
    assert!(!tex.is_loaded());
    assert_eq!(h.journal.borrow().lines, vec!["low memory"]);

    assert!(tex.load());
    h.window.sender().queue_system_event(SystemEvent::FocusChanged(false));
    h.window.update_one_frame(&mut h.render);
    assert!(!tex.is_loaded());
}

#[test]
fn update_delegate_ends_the_loop() {
    let mut h = harness(quiet());
    h.journal.borrow_mut().frames_left = Some(2);
    h.window.enter_main_loop(&mut h.render);

    assert_eq!(h.journal.borrow().deltas.len(), 3);
    assert_eq!(h.window.state(), WindowState::Terminating);
    assert!(!h.window.update_one_frame(&mut h.render));
    assert_eq!(h.probe.frames_presented(), 3, "the last frame is still presented");
}

#[test]
fn quit_request_without_delegate_veto_ends_the_loop() {
    let mut h = harness(quiet());
    h.window.sender().queue_system_event(SystemEvent::QuitRequest { can_cancel: true });
    assert!(!h.window.update_one_frame(&mut h.render));
    assert!(h.journal.borrow().deltas.is_empty(), "no update after the loop ends");
}

#[test]
fn input_mode_follows_the_last_device() {
    let mut h = harness(quiet());
    let tx = h.window.sender();
    tx.queue_touch_event(TouchEventKind::Down, Vec2::new(4.0, 4.0), 0);
    h.window.update_one_frame(&mut h.render);
    assert_eq!(h.window.input_mode(), InputMode::Touch);
    assert_eq!(h.window.active_touches(), 1);
    assert!(!h.window.is_multi_touch());

    tx.queue_mouse_event(MouseEventKind::Move, Vec2::new(1.0, 1.0), MouseButton::Left);
    h.window.update_one_frame(&mut h.render);
    assert_eq!(h.window.input_mode(), InputMode::Mouse);

    let lines = h.journal.borrow().lines.clone();
    assert_eq!(lines, vec!["mode touch", "down Left 4 4", "mode mouse", "move 1 1"]);
}

#[test]
fn queued_touch_moves_emulate_one_mouse_move() {
    let mut h = harness(quiet());
    let tx = h.window.sender();
    tx.queue_touch_event(TouchEventKind::Down, Vec2::new(1.0, 1.0), 0);
    for x in 2..=4 {
        tx.queue_touch_event(TouchEventKind::Move, Vec2::new(x as f32, 1.0), 0);
    }
    h.window.update_one_frame(&mut h.render);

    let lines = h.journal.borrow().lines.clone();
    assert_eq!(lines, vec!["mode touch", "down Left 1 1", "move 4 1"]);
    assert_eq!(h.window.cursor_position(), Some(Vec2::new(4.0, 1.0)));
}
