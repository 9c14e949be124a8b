use kestrel_engine::coords::{Color, Mat4, PlainVertex, Rect, Vec3};
use kestrel_engine::device::{DeviceCall, HeadlessDevice, HeadlessProbe};
use kestrel_engine::image::PixelFormat;
use kestrel_engine::render::{
    BlendMode, ColorMode, RenderOp, RenderOptions, RenderSystem, RenderSystemConfig,
};
use kestrel_engine::shader::ShaderStage;
use kestrel_engine::texture::{TextureFilter, TextureType};

fn created(device: HeadlessDevice) -> (RenderSystem, HeadlessProbe) {
    let probe = device.probe();
    let mut render = RenderSystem::new(Box::new(device), RenderSystemConfig::default());
    render.create(RenderOptions::default()).expect("headless create");
    probe.take_calls();
    (render, probe)
}

fn state_changes(probe: &HeadlessProbe) -> Vec<DeviceCall> {
    probe.take_calls().into_iter().filter(DeviceCall::is_state_change).collect()
}

#[test]
fn redundant_state_never_reaches_the_device() {
    let (mut render, probe) = created(HeadlessDevice::new());

    render.set_blend_mode(BlendMode::default());
    render.set_color_mode(ColorMode::default(), 1.0);
    render.set_texture_filter(TextureFilter::default());
    render.set_depth_buffer(false);
    assert!(state_changes(&probe).is_empty(), "defaults were applied on create");

    render.set_blend_mode(BlendMode::Add);
    render.set_blend_mode(BlendMode::Add);
    render.set_color_mode(ColorMode::Lerp, 0.5);
    render.set_color_mode(ColorMode::Lerp, 0.5);
    render.set_color_mode(ColorMode::Lerp, 0.25);
    assert_eq!(
        state_changes(&probe),
        vec![
            DeviceCall::SetBlendMode(BlendMode::Add),
            DeviceCall::SetColorMode(ColorMode::Lerp, 0.5),
            DeviceCall::SetColorMode(ColorMode::Lerp, 0.25),
        ]
    );
}

#[test]
fn rebinding_the_same_texture_is_free() {
    let (mut render, probe) = created(HeadlessDevice::new());
    let a = render
        .create_texture(1, 1, PixelFormat::Rgba, TextureType::Immutable, Color::RED)
        .expect("texture");
    let b = render
        .create_texture(1, 1, PixelFormat::Rgba, TextureType::Immutable, Color::BLUE)
        .expect("texture");
    probe.take_calls();

    render.set_texture(Some(&a));
    render.set_texture(Some(&a));
    render.set_texture(Some(&b));
    render.set_texture(None);
    render.set_texture(None);

    let binds: Vec<_> = state_changes(&probe)
        .into_iter()
        .filter(|c| matches!(c, DeviceCall::BindTexture(_)))
        .collect();
    assert_eq!(binds.len(), 3);
    assert_eq!(binds.last(), Some(&DeviceCall::BindTexture(None)));
}

#[test]
fn unsupported_modes_fall_back() {
    let device = HeadlessDevice::new()
        .without_blend_mode(BlendMode::Subtract)
        .without_color_mode(ColorMode::AlphaMap);
    let (mut render, probe) = created(device);

    render.set_blend_mode(BlendMode::Add);
    render.set_blend_mode(BlendMode::Subtract);
    render.set_color_mode(ColorMode::AlphaMap, 1.0);

    assert_eq!(render.blend_mode(), Some(BlendMode::Alpha));
    assert_eq!(render.color_mode(), Some((ColorMode::Multiply, 1.0)));
    assert_eq!(
        state_changes(&probe),
        vec![DeviceCall::SetBlendMode(BlendMode::Add), DeviceCall::SetBlendMode(BlendMode::Alpha)]
    );
}

#[test]
fn reset_forgets_the_state_cache() {
    let (mut render, probe) = created(HeadlessDevice::new());
    render.set_blend_mode(BlendMode::Overwrite);
    probe.take_calls();

    render.reset().expect("reset");
    render.set_blend_mode(BlendMode::Overwrite);
    assert!(state_changes(&probe).contains(&DeviceCall::SetBlendMode(BlendMode::Overwrite)));
}

#[test]
fn reset_before_create_is_an_error() {
    let mut render = RenderSystem::new(Box::new(HeadlessDevice::new()), RenderSystemConfig::default());
    assert!(render.reset().is_err());
    assert!(render.present_frame().is_err());
    assert!(!render.destroy());
}

#[test]
fn failed_device_creation_leaves_the_system_uncreated() {
    let mut render =
        RenderSystem::new(Box::new(HeadlessDevice::new().failing_create()), RenderSystemConfig::default());
    assert!(render.create(RenderOptions::default()).is_err());
    assert!(!render.is_created());
}

#[test]
fn shaders_recompile_after_reset() {
    let (mut render, probe) = created(HeadlessDevice::new());
    let vs = render.create_shader(ShaderStage::Vertex);
    assert!(vs.load_source("@vertex fn main() {}"));
    assert!(!vs.load_source("@vertex fn other() {}"), "already loaded");
    assert!(vs.is_loaded());

    render.set_vertex_shader(Some(&vs));
    render.set_vertex_shader(Some(&vs));
    render.reset().expect("reset");
    assert!(!vs.is_loaded());
    assert!(vs.has_source());

    render.set_vertex_shader(Some(&vs));
    assert!(vs.is_loaded());
    let calls = probe.take_calls();
    let compiles = calls.iter().filter(|c| matches!(c, DeviceCall::CreateShader { .. })).count();
    let binds = calls
        .iter()
        .filter(|c| matches!(c, DeviceCall::BindShader(ShaderStage::Vertex, Some(_))))
        .count();
    assert_eq!((compiles, binds), (2, 2));
}

#[test]
fn shaders_bind_only_to_their_stage() {
    let (mut render, probe) = created(HeadlessDevice::new());
    let ps = render.create_shader(ShaderStage::Pixel);
    ps.load_source("@fragment fn main() {}");
    probe.take_calls();

    render.set_vertex_shader(Some(&ps));
    assert!(!state_changes(&probe)
        .iter()
        .any(|c| matches!(c, DeviceCall::BindShader(_, Some(_)))));

    assert!(!render.create_shader(ShaderStage::Pixel).load_source("   "), "empty source fails");
    assert_eq!(render.shader_count(), 1);
}

#[test]
fn transform_stack_restores_the_modelview() {
    let (mut render, _probe) = created(HeadlessDevice::new());
    render.push_transform();
    render.translate(Vec3::new(10.0, 0.0, 0.0));
    render.scale(Vec3::splat(2.0));
    let p = render.modelview_matrix().transform_point3(Vec3::new(1.0, 1.0, 0.0));
    assert_eq!(p, Vec3::new(12.0, 2.0, 0.0));

    assert!(render.pop_transform());
    assert_eq!(render.modelview_matrix(), Mat4::IDENTITY);
    assert!(!render.pop_transform());
}

#[test]
fn draws_skip_empty_input_and_follow_resolution() {
    let (mut render, probe) = created(HeadlessDevice::new());
    render.render::<PlainVertex>(RenderOp::TriangleList, &[], None);
    assert!(probe.take_calls().is_empty());

    render.on_resolution_changed(640, 480);
    assert_eq!(render.viewport(), Some(Rect::new(0.0, 0.0, 640.0, 480.0)));

    render.draw_filled_rect(Rect::new(0.0, 0.0, 5.0, 5.0), Color::GREEN);
    let draws: Vec<_> = probe
        .take_calls()
        .into_iter()
        .filter(|c| matches!(c, DeviceCall::Draw { .. }))
        .collect();
    assert_eq!(draws.len(), 1);
    assert!(matches!(
        draws[0],
        DeviceCall::Draw { op: RenderOp::TriangleStrip, count: 4, color: Some(Color::GREEN), .. }
    ));
}

#[test]
fn draws_too_short_for_a_primitive_are_dropped() {
    let (mut render, probe) = created(HeadlessDevice::new());
    let two = [PlainVertex::new(0.0, 0.0), PlainVertex::new(4.0, 4.0)];

    render.render(RenderOp::TriangleList, &two, None);
    render.render(RenderOp::TriangleFan, &two, Some(Color::RED));
    render.render(RenderOp::TriangleStrip, &two[..1], None);
    assert!(probe.take_calls().is_empty());

    render.render(RenderOp::LineList, &two, None);
    render.render(RenderOp::PointList, &two[..1], None);
    let counts: Vec<_> = probe
        .take_calls()
        .into_iter()
        .filter_map(|c| match c {
            DeviceCall::Draw { op, count, .. } => Some((op, count)),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![(RenderOp::LineList, 2), (RenderOp::PointList, 1)]);
}

#[test]
fn present_counts_frames() {
    let (mut render, probe) = created(HeadlessDevice::new());
    render.present_frame().expect("present");
    render.present_frame().expect("present");
    assert_eq!(probe.frames_presented(), 2);
}
