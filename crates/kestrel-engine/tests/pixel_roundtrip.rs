use kestrel_engine::coords::Color;
use kestrel_engine::device::{DeviceCall, HeadlessDevice, HeadlessProbe};
use kestrel_engine::image::{quantize, PixelFormat, PixelRect, PixelView};
use kestrel_engine::render::{RenderOptions, RenderSystem, RenderSystemConfig};
use kestrel_engine::texture::TextureType;

/// Device that stores everything as BGRA, so every other layout goes through conversion.
fn bgra_system() -> (RenderSystem, HeadlessProbe) {
    let device = HeadlessDevice::new().with_native_format(PixelFormat::Bgra);
    let probe = device.probe();
    let mut render = RenderSystem::new(Box::new(device), RenderSystemConfig::default());
    render.create(RenderOptions::default()).expect("headless create");
    (render, probe)
}

fn sample(format: PixelFormat) -> Color {
    match format {
        PixelFormat::Alpha => Color::new(255, 255, 255, 77),
        PixelFormat::Greyscale => Color::rgb(90, 90, 90),
        f if f.has_alpha() => Color::new(10, 200, 30, 128),
        _ => Color::rgb(10, 200, 30),
    }
}

#[test]
fn every_format_survives_a_native_layout_roundtrip() {
    let (mut render, probe) = bgra_system();
    for format in PixelFormat::ALL {
        for ty in [TextureType::Immutable, TextureType::Managed] {
            let tex = render
                .create_texture(3, 3, format, ty, Color::BLACK)
                .unwrap_or_else(|| panic!("{format} {ty:?}"));
            let color = sample(format);
            tex.set_pixel(2, 1, color);
            assert_eq!(tex.get_pixel(2, 1), color, "{format} {ty:?}");
            assert_eq!(tex.get_pixel(0, 0), quantize(format, Color::BLACK), "{format} {ty:?}");
        }
    }

    let stored: Vec<PixelFormat> = probe
        .calls()
        .iter()
        .filter_map(|c| match c {
            DeviceCall::CreateTexture { format, .. } => Some(*format),
            _ => None,
        })
        .collect();
    assert_eq!(stored.len(), PixelFormat::ALL.len() * 2);
    assert!(stored.iter().all(|f| *f == PixelFormat::Bgra));
}

#[test]
fn immutable_textures_read_back_from_the_device() {
    let (mut render, _probe) = bgra_system();
    let tex = render
        .create_texture(2, 2, PixelFormat::Rgb, TextureType::Immutable, Color::WHITE)
        .expect("texture");
    tex.set_pixel(1, 1, Color::new(1, 2, 3, 4));
    assert_eq!(tex.get_pixel(1, 1), Color::rgb(1, 2, 3), "RGB drops alpha");
    assert_eq!(tex.memory_usage(), PixelFormat::Bgra.buffer_size(2, 2));
}

#[test]
fn write_converts_from_the_source_layout() {
    let (mut render, _probe) = bgra_system();
    // 2x1 ARGB source: red, then half-transparent blue.
    let src = [255u8, 255, 0, 0, 128, 0, 0, 255];
    let view = PixelView::new(&src, 2, 1, PixelFormat::Argb);

    for format in PixelFormat::ALL {
        let tex = render
            .create_texture(4, 4, format, TextureType::Managed, Color::CLEAR)
            .expect("texture");
        assert!(tex.write(&view, PixelRect::new(0, 0, 2, 1), 2, 3), "{format}");
        assert_eq!(tex.get_pixel(2, 3), quantize(format, Color::RED), "{format}");
        assert_eq!(tex.get_pixel(3, 3), quantize(format, Color::new(0, 0, 255, 128)), "{format}");
        assert_eq!(tex.get_pixel(1, 3), quantize(format, Color::CLEAR), "{format}");
    }
}

#[test]
fn writes_are_clipped_to_the_texture() {
    let (mut render, _probe) = bgra_system();
    let src = [7u8; 16];
    let view = PixelView::new(&src, 4, 4, PixelFormat::Greyscale);
    let tex = render
        .create_texture(2, 2, PixelFormat::Greyscale, TextureType::Managed, Color::BLACK)
        .expect("texture");

    assert!(tex.write(&view, PixelRect::new(0, 0, 4, 4), 1, 1));
    assert_eq!(tex.get_pixel(1, 1), Color::rgb(7, 7, 7));
    assert_eq!(tex.get_pixel(0, 1), Color::BLACK);
    assert!(!tex.write(&view, PixelRect::new(0, 0, 4, 4), 5, 5), "fully outside");
}

#[test]
fn writes_near_the_coordinate_limits_are_rejected() {
    let (mut render, _probe) = bgra_system();
    let src = [7u8; 4];
    let view = PixelView::new(&src, 4, 1, PixelFormat::Greyscale);
    let tex = render
        .create_texture(4, 4, PixelFormat::Greyscale, TextureType::Managed, Color::BLACK)
        .expect("texture");

    assert!(!tex.write(&view, PixelRect::new(-2, 0, 4, 1), i32::MAX - 1, 0));
    assert!(!tex.write(&view, PixelRect::new(0, 0, 4, 1), 0, i32::MIN));
    assert_eq!(tex.get_pixel(0, 0), Color::BLACK);
}

#[test]
fn fill_and_clear_cover_the_clipped_rect() {
    let (mut render, _probe) = bgra_system();
    let tex = render
        .create_texture(4, 4, PixelFormat::Rgba, TextureType::Managed, Color::WHITE)
        .expect("texture");

    assert!(tex.fill_rect(PixelRect::new(-2, -2, 4, 4), Color::GREEN));
    assert_eq!(tex.get_pixel(1, 1), Color::GREEN);
    assert_eq!(tex.get_pixel(2, 2), Color::WHITE);

    assert!(tex.clear());
    assert_eq!(tex.get_pixel(3, 3), Color::CLEAR);
}

#[test]
fn to_image_returns_the_logical_format() {
    let (mut render, _probe) = bgra_system();
    let tex = render
        .create_texture(2, 1, PixelFormat::Rgb, TextureType::Immutable, Color::rgb(4, 5, 6))
        .expect("texture");
    let img = tex.to_image().expect("snapshot");
    assert_eq!(img.format, PixelFormat::Rgb);
    assert_eq!(img.data, vec![4, 5, 6, 4, 5, 6]);
}
