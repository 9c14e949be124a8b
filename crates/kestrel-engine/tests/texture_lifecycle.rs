use std::cell::RefCell;
use std::rc::Rc;

use kestrel_engine::coords::{Color, TexturedVertex};
use kestrel_engine::device::{DeviceCall, HeadlessDevice, HeadlessProbe};
use kestrel_engine::image::PixelFormat;
use kestrel_engine::render::{
    MemoryResources, RenderOp, RenderOptions, RenderSystem, RenderSystemConfig,
};
use kestrel_engine::texture::{LoadMode, TextureType};

fn created_system() -> (RenderSystem, HeadlessProbe) {
    let device = HeadlessDevice::new();
    let probe = device.probe();
    let mut render = RenderSystem::new(Box::new(device), RenderSystemConfig::default());
    render.create(RenderOptions::default()).expect("headless create");
    (render, probe)
}

fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encode");
    out.into_inner()
}

fn texture_creations(calls: &[DeviceCall]) -> usize {
    calls.iter().filter(|c| matches!(c, DeviceCall::CreateTexture { .. })).count()
}

#[test]
fn load_and_unload_are_idempotent() {
    let (mut render, probe) = created_system();
    let tex = render
        .create_texture(4, 4, PixelFormat::Rgba, TextureType::Immutable, Color::RED)
        .expect("texture");

    assert!(tex.is_loaded());
    assert!(!tex.load(), "second load is a no-op");
    assert_eq!(texture_creations(&probe.calls()), 1);

    assert!(tex.unload());
    assert!(!tex.unload(), "second unload is a no-op");
    assert!(!tex.is_loaded());
    assert_eq!(probe.texture_count(), 0);

    assert!(tex.load());
    assert!(!tex.load());
    assert_eq!(texture_creations(&probe.calls()), 2);
    assert_eq!(tex.get_pixel(1, 1), Color::RED);
}

#[test]
fn dynamic_links_are_symmetric() {
    let (mut render, _probe) = created_system();
    let mut make = || {
        render
            .create_texture(1, 1, PixelFormat::Rgba, TextureType::Managed, Color::WHITE)
            .expect("texture")
    };
    let a = make();
    let b = make();
    let c = make();

    assert!(a.add_dynamic_link(&b));
    assert!(!b.add_dynamic_link(&a), "already linked from the other side");
    assert!(b.is_linked_with(&a));

    assert!(b.remove_dynamic_link(&a));
    assert!(!a.is_linked_with(&b));
    assert!(a.dynamic_links().is_empty());

    a.add_dynamic_link(&c);
    drop(c);
    assert!(a.dynamic_links().is_empty(), "dropping a texture severs its links");
}

#[test]
fn reset_then_draw_reloads_and_keeps_metadata() {
    let (mut render, probe) = created_system();
    render.set_resources(Rc::new(
        MemoryResources::new().with("tiles.png", png(3, 2, [0, 0, 255, 255])),
    ));
    let tex = render
        .create_texture_from_resource("tiles", TextureType::Immutable, LoadMode::Immediate)
        .expect("texture");
    render.set_texture(Some(&tex));
    let before = probe.take_calls();
    assert_eq!(texture_creations(&before), 1);

    render.reset().expect("reset");
    assert!(!tex.is_loaded(), "handles die with the device");
    assert_eq!(tex.filename().as_deref(), Some("tiles.png"));
    assert_eq!((tex.width(), tex.height()), (3, 2));

    let quad = [
        TexturedVertex::new(0.0, 0.0, 0.0, 0.0),
        TexturedVertex::new(3.0, 0.0, 1.0, 0.0),
        TexturedVertex::new(0.0, 2.0, 0.0, 1.0),
        TexturedVertex::new(3.0, 2.0, 1.0, 1.0),
    ];
    render.render(RenderOp::TriangleStrip, &quad, None);

    assert!(tex.is_loaded());
    assert_eq!((tex.width(), tex.height()), (3, 2));
    let calls = probe.calls();
    let created = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::CreateTexture { .. }))
        .expect("reload after reset");
    let bound = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::BindTexture(Some(_))))
        .expect("rebind after reset");
    let drawn = calls
        .iter()
        .position(|c| matches!(c, DeviceCall::Draw { .. }))
        .expect("draw");
    assert!(created < bound && bound < drawn);
    assert_eq!(tex.get_pixel(2, 1), Color::BLUE);
}

#[test]
fn managed_textures_restore_edits_after_reset() {
    let (mut render, _probe) = created_system();
    let tex = render
        .create_texture(2, 2, PixelFormat::Rgba, TextureType::Managed, Color::BLACK)
        .expect("texture");
    tex.set_pixel(0, 1, Color::GREEN);

    render.reset().expect("reset");
    assert!(tex.load());
    assert_eq!(tex.get_pixel(0, 1), Color::GREEN);
}

#[test]
fn failed_reupload_keeps_the_ram_copy() {
    let (mut render, probe) = created_system();
    let tex = render
        .create_texture(2, 2, PixelFormat::Rgba, TextureType::Managed, Color::BLACK)
        .expect("texture");
    tex.set_pixel(1, 0, Color::BLUE);
    render.reset().expect("reset");

    probe.set_texture_creation_fails(true);
    assert!(!tex.load());
    assert!(!tex.load(), "a second failure still has the copy to retry from");
    assert!(!tex.is_loaded());
    assert_eq!(tex.memory_usage(), PixelFormat::Rgba.buffer_size(2, 2));

    probe.set_texture_creation_fails(false);
    assert!(tex.load());
    assert_eq!(tex.get_pixel(1, 0), Color::BLUE);
    assert_eq!(tex.get_pixel(0, 0), Color::BLACK);
}

#[test]
fn idle_dynamic_textures_unload() {
    let (mut render, _probe) = created_system();
    render.set_resources(Rc::new(MemoryResources::new().with("a.png", png(2, 2, [9, 9, 9, 255]))));
    render.set_idle_texture_unload_time(1.0);

    let lazy = render
        .create_texture_from_resource("a.png", TextureType::Immutable, LoadMode::OnDemand)
        .expect("texture");
    let pinned = render
        .create_texture(1, 1, PixelFormat::Rgba, TextureType::Immutable, Color::WHITE)
        .expect("texture");
    assert!(lazy.is_dynamic());
    assert!(!lazy.is_loaded(), "on-demand textures only read the header");
    assert_eq!((lazy.width(), lazy.height()), (2, 2));

    assert_eq!(lazy.get_pixel(0, 0), Color::rgb(9, 9, 9));
    render.update(0.6);
    render.update(0.6);
    assert!(lazy.is_loaded(), "timer had not passed the threshold when checked");
    render.update(0.1);
    assert!(!lazy.is_loaded());
    assert!(pinned.is_loaded(), "non-dynamic textures never idle out");
}

#[test]
fn using_a_texture_keeps_its_links_alive() {
    let (mut render, _probe) = created_system();
    render.set_idle_texture_unload_time(1.0);
    let mut make = || {
        let t = render
            .create_texture(1, 1, PixelFormat::Rgba, TextureType::Managed, Color::WHITE)
            .expect("texture");
        t.set_dynamic(true);
        t
    };
    let a = make();
    let b = make();
    a.add_dynamic_link(&b);

    render.update(0.9);
    assert!(b.unused_time() > 0.0);
    render.set_texture(Some(&a));
    assert_eq!(b.unused_time(), 0.0);
}

#[test]
fn loading_listener_sees_every_load() {
    let (mut render, _probe) = created_system();
    render.set_resources(Rc::new(MemoryResources::new().with("ui/icon.png", png(1, 1, [1, 2, 3, 255]))));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    render.set_texture_loading_listener(move |info| {
        sink.borrow_mut().push((info.filename.clone(), info.width));
    });

    let icon = render
        .create_texture_from_resource("ui/icon", TextureType::Managed, LoadMode::Immediate)
        .expect("texture");
    icon.unload();
    icon.load();
    render.create_texture(5, 1, PixelFormat::Rgb, TextureType::Immutable, Color::BLACK);

    assert_eq!(
        *seen.borrow(),
        vec![
            (Some("ui/icon.png".to_string()), 1),
            (Some("ui/icon.png".to_string()), 1),
            (None, 5),
        ]
    );
}

#[test]
fn missing_or_corrupt_resources_yield_none() {
    let (mut render, _probe) = created_system();
    render.set_resources(Rc::new(MemoryResources::new().with("broken.png", b"nope".to_vec())));
    assert!(render
        .create_texture_from_resource("absent", TextureType::Immutable, LoadMode::Immediate)
        .is_none());
    assert!(render
        .create_texture_from_resource("broken", TextureType::Immutable, LoadMode::OnDemand)
        .is_none());
    assert_eq!(render.texture_count(), 0);
}

#[test]
fn destroy_unloads_everything_and_create_allows_reload() {
    let (mut render, probe) = created_system();
    let tex = render
        .create_texture(2, 2, PixelFormat::Rgba, TextureType::Immutable, Color::CYAN)
        .expect("texture");
    assert!(render.destroy());
    assert!(!render.destroy());
    assert!(!tex.is_loaded());
    assert_eq!(probe.texture_count(), 0);

    assert_eq!(render.create(RenderOptions::default()).ok(), Some(true));
    assert!(tex.load());
    assert_eq!(tex.get_pixel(0, 0), Color::CYAN);
}

#[test]
fn ram_textures_need_no_device() {
    let mut render =
        RenderSystem::new(Box::new(HeadlessDevice::new()), RenderSystemConfig::default());
    let tex = render
        .create_ram_texture(2, 2, PixelFormat::Rgba, Color::BLUE)
        .expect("ram texture");
    assert!(tex.is_loaded());
    tex.set_pixel(1, 0, Color::YELLOW);
    assert_eq!(tex.get_pixel(1, 0), Color::YELLOW);
    assert_eq!(tex.get_pixel(0, 0), Color::BLUE);
    assert_eq!(tex.get_pixel(5, 5), Color::CLEAR);
    assert_eq!(render.loaded_texture_count(), 1);
}

#[test]
fn immutable_textures_fail_without_a_device() {
    let mut render =
        RenderSystem::new(Box::new(HeadlessDevice::new()), RenderSystemConfig::default());
    assert!(render
        .create_texture(2, 2, PixelFormat::Rgba, TextureType::Immutable, Color::BLUE)
        .is_none());
    assert!(render
        .create_texture(0, 2, PixelFormat::Rgba, TextureType::Ram, Color::BLUE)
        .is_none());
}
