//! wgpu backend presenting into a winit window.
//!
//! Draw calls are recorded into a per-frame command list and submitted in one
//! encoder on `present`. Vertex bytes of the whole frame share one growing GPU
//! buffer; per-draw uniforms share one buffer addressed by dynamic offsets.

mod pipeline;
mod surface;

use std::collections::HashMap;
use std::sync::{mpsc, Arc};

use bytemuck::{Pod, Zeroable};
use winit::window::Window;

use crate::coords::{Color, Mat4, Rect};
use crate::image::{PixelFormat, PixelRect};
use crate::render::{BlendMode, ColorMode, RenderOp, RenderOptions};
use crate::shader::{ShaderSource, ShaderStage};
use crate::texture::{TextureAddressMode, TextureFilter};

use self::pipeline::{PipelineCache, PipelineKey, SamplerKey, DEPTH_FORMAT};
use super::{
    DeviceError, DisplayMode, GpuDevice, GpuInit, GpuShaderId, GpuTextureId, SurfaceErrorAction,
    TextureDesc, VertexData,
};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DrawUniforms {
    mvp: [[f32; 4]; 4],
    color: [f32; 4],
    mode: [u32; 4],
    params: [f32; 4],
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;

struct DrawCmd {
    key: PipelineKey,
    texture: Option<GpuTextureId>,
    sampler: SamplerKey,
    vertex_offset: u64,
    vertex_count: u32,
    uniform_offset: u32,
    viewport: Option<Rect>,
}

enum FrameCmd {
    Clear { color: Color, depth: bool },
    Draw(DrawCmd),
}

struct Pass<'a> {
    clear: Option<(Color, bool)>,
    draws: Vec<&'a DrawCmd>,
}

/// Commands and data recorded between two presents.
#[derive(Default)]
struct FrameRecorder {
    cmds: Vec<FrameCmd>,
    vertices: Vec<u8>,
    uniforms: Vec<u8>,
    fan_scratch: Vec<u8>,
}

impl FrameRecorder {
    fn clear(&mut self) {
        self.cmds.clear();
        self.vertices.clear();
        self.uniforms.clear();
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Everything that exists only between `create` and `destroy`.
struct GpuContext {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipelines: PipelineCache,

    textures: HashMap<GpuTextureId, GpuTexture>,
    shaders: HashMap<GpuShaderId, wgpu::ShaderModule>,
    samplers: HashMap<SamplerKey, wgpu::Sampler>,
    bind_groups: HashMap<(Option<GpuTextureId>, SamplerKey), wgpu::BindGroup>,
    white: GpuTexture,

    vertex_buffer: wgpu::Buffer,
    vertex_capacity: u64,
    uniform_buffer: wgpu::Buffer,
    uniform_capacity: u64,
    uniform_group: wgpu::BindGroup,
    uniform_align: u64,

    depth_view: Option<wgpu::TextureView>,
}

/// wgpu implementation of [`GpuDevice`].
///
/// Every texture is stored as RGBA8; the render system converts on upload.
pub struct WgpuDevice {
    window: Arc<Window>,
    init: GpuInit,
    ctx: Option<GpuContext>,
    next_handle: u64,

    options: RenderOptions,
    bound_texture: Option<GpuTextureId>,
    sampler: SamplerKey,
    blend: BlendMode,
    color_mode: ColorMode,
    color_factor: f32,
    modelview: Mat4,
    projection: Mat4,
    viewport: Option<Rect>,
    depth: bool,
    vertex_shader: Option<GpuShaderId>,
    pixel_shader: Option<GpuShaderId>,

    frame: FrameRecorder,
}

impl WgpuDevice {
    pub fn new(window: Arc<Window>, init: GpuInit) -> Self {
        Self {
            window,
            init,
            ctx: None,
            next_handle: 0,
            options: RenderOptions::default(),
            bound_texture: None,
            sampler: SamplerKey {
                filter: TextureFilter::default(),
                address: TextureAddressMode::default(),
            },
            blend: BlendMode::Alpha,
            color_mode: ColorMode::Multiply,
            color_factor: 1.0,
            modelview: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            viewport: None,
            depth: false,
            vertex_shader: None,
            pixel_shader: None,
            frame: FrameRecorder::default(),
        }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.ctx.as_ref().map(|c| c.config.format)
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    async fn init_context(
        window: Arc<Window>,
        init: &GpuInit,
        options: &RenderOptions,
    ) -> Result<GpuContext, DeviceError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| DeviceError::Creation(format!("failed to create wgpu surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| DeviceError::Creation(format!("no suitable GPU adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("kestrel device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| DeviceError::Creation(format!("failed to create device/queue: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, init.prefer_srgb)
            .ok_or_else(|| DeviceError::Creation("no supported surface formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: init.present_mode,
            alpha_mode: surface::choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kestrel uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kestrel texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipelines = PipelineCache::new(&device, &[&uniform_layout, &texture_layout], format);
        let white = upload_texture(&device, &queue, 1, 1, &[255; 4], "kestrel white texture");

        let uniform_align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let (vertex_buffer, vertex_capacity) = vertex_buffer(&device, 64 * 1024);
        let (uniform_buffer, uniform_capacity) = uniform_buffer(&device, uniform_align * 64);
        let uniform_group = uniform_group(&device, &uniform_layout, &uniform_buffer);

        let depth_view = options
            .depth_buffer
            .then(|| depth_view(&device, config.width, config.height));

        Ok(GpuContext {
            surface,
            device,
            queue,
            config,
            uniform_layout,
            texture_layout,
            pipelines,
            textures: HashMap::new(),
            shaders: HashMap::new(),
            samplers: HashMap::new(),
            bind_groups: HashMap::new(),
            white,
            vertex_buffer,
            vertex_capacity,
            uniform_buffer,
            uniform_capacity,
            uniform_group,
            uniform_align,
            depth_view,
        })
    }

    fn current_uniforms(&self, color: Option<Color>, textured: bool) -> DrawUniforms {
        let mode = match self.color_mode {
            ColorMode::Multiply => 0,
            ColorMode::AlphaMap => 1,
            ColorMode::Lerp => 2,
        };
        DrawUniforms {
            mvp: (self.projection * self.modelview).to_cols_array_2d(),
            color: color.unwrap_or(Color::WHITE).to_linear(),
            mode: [mode, textured as u32, 0, 0],
            params: [self.color_factor, 0.0, 0.0, 0.0],
        }
    }
}

// ── GPU helpers ──────────────────────────────────────────────────────────

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    rgba: &[u8],
    label: &str,
) -> GpuTexture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        width,
        height,
    }
}

fn vertex_buffer(device: &wgpu::Device, size: u64) -> (wgpu::Buffer, u64) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kestrel vertex buffer"),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    (buffer, size)
}

fn uniform_buffer(device: &wgpu::Device, size: u64) -> (wgpu::Buffer, u64) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("kestrel uniform buffer"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    (buffer, size)
}

fn uniform_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("kestrel uniform group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: wgpu::BufferSize::new(UNIFORM_SIZE),
            }),
        }],
    })
}

fn depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("kestrel depth buffer"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// Grows to the next power of two, never below `min`.
fn grown(needed: u64, min: u64) -> u64 {
    needed.next_power_of_two().max(min)
}

impl GpuContext {
    fn ensure_bind_group(&mut self, texture: Option<GpuTextureId>, key: SamplerKey) {
        if self.bind_groups.contains_key(&(texture, key)) {
            return;
        }
        let sampler = self
            .samplers
            .entry(key)
            .or_insert_with(|| self.device.create_sampler(&pipeline::sampler_descriptor(key)));
        let view = texture
            .and_then(|id| self.textures.get(&id))
            .map_or(&self.white.view, |t| &t.view);

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kestrel texture group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        self.bind_groups.insert((texture, key), group);
    }

    fn upload_frame(&mut self, frame: &FrameRecorder) {
        let vertex_bytes = frame.vertices.len() as u64;
        if vertex_bytes > self.vertex_capacity {
            let (buffer, cap) = vertex_buffer(&self.device, grown(vertex_bytes, 64 * 1024));
            self.vertex_buffer = buffer;
            self.vertex_capacity = cap;
        }
        let uniform_bytes = frame.uniforms.len() as u64;
        if uniform_bytes > self.uniform_capacity {
            let (buffer, cap) =
                uniform_buffer(&self.device, grown(uniform_bytes, self.uniform_align * 64));
            self.uniform_group = uniform_group(&self.device, &self.uniform_layout, &buffer);
            self.uniform_buffer = buffer;
            self.uniform_capacity = cap;
        }
        if !frame.vertices.is_empty() {
            self.queue.write_buffer(&self.vertex_buffer, 0, &frame.vertices);
        }
        if !frame.uniforms.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &frame.uniforms);
        }
    }

    /// Clamps a viewport to the backbuffer; wgpu rejects viewports outside it.
    fn clamp_viewport(&self, rect: Rect) -> Option<Rect> {
        let target = Rect::new(0.0, 0.0, self.config.width as f32, self.config.height as f32);
        rect.intersect(target)
    }

    fn encode(&self, frame: &FrameRecorder, target: &wgpu::TextureView) -> wgpu::CommandBuffer {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kestrel frame encoder"),
            });

        // Each clear opens a new pass; draws join the most recent one.
        let mut passes: Vec<Pass<'_>> = Vec::new();
        for cmd in &frame.cmds {
            match cmd {
                FrameCmd::Clear { color, depth } => passes.push(Pass {
                    clear: Some((*color, *depth)),
                    draws: Vec::new(),
                }),
                FrameCmd::Draw(draw) => match passes.last_mut() {
                    Some(pass) => pass.draws.push(draw),
                    None => passes.push(Pass {
                        clear: None,
                        draws: vec![draw],
                    }),
                },
            }
        }
        if passes.is_empty() {
            passes.push(Pass {
                clear: None,
                draws: Vec::new(),
            });
        }

        for (index, pass) in passes.into_iter().enumerate() {
            // Surface contents are undefined after acquire, so the first pass always clears.
            let load = match pass.clear {
                Some((c, _)) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: c.r_f() as f64,
                    g: c.g_f() as f64,
                    b: c.b_f() as f64,
                    a: c.a_f() as f64,
                }),
                None if index == 0 => wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                None => wgpu::LoadOp::Load,
            };
            let depth_load = match pass.clear {
                Some((_, true)) => wgpu::LoadOp::Clear(1.0),
                _ if index == 0 => wgpu::LoadOp::Clear(1.0),
                _ => wgpu::LoadOp::Load,
            };

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kestrel pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: self.depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: depth_load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in pass.draws {
                let (Some(pipeline), Some(group)) = (
                    self.pipelines.get(&draw.key),
                    self.bind_groups.get(&(draw.texture, draw.sampler)),
                ) else {
                    continue;
                };
                match draw.viewport.and_then(|r| self.clamp_viewport(r)) {
                    Some(r) => rpass.set_viewport(r.x(), r.y(), r.w(), r.h(), 0.0, 1.0),
                    None => rpass.set_viewport(
                        0.0,
                        0.0,
                        self.config.width as f32,
                        self.config.height as f32,
                        0.0,
                        1.0,
                    ),
                }
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, &self.uniform_group, &[draw.uniform_offset]);
                rpass.set_bind_group(1, group, &[]);
                rpass.set_vertex_buffer(0, self.vertex_buffer.slice(draw.vertex_offset..));
                rpass.draw(0..draw.vertex_count, 0..1);
            }
        }

        encoder.finish()
    }
}

impl GpuDevice for WgpuDevice {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create(&mut self, options: &RenderOptions) -> Result<(), DeviceError> {
        let ctx = pollster::block_on(Self::init_context(self.window.clone(), &self.init, options))?;
        log::info!(
            "wgpu device created ({}x{}, {:?}, options: {options})",
            ctx.config.width,
            ctx.config.height,
            ctx.config.format
        );
        self.options = *options;
        self.depth = options.depth_buffer;
        self.ctx = Some(ctx);
        Ok(())
    }

    fn destroy(&mut self) {
        self.frame.clear();
        if self.ctx.take().is_some() {
            log::info!("wgpu device destroyed");
        }
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        let ctx = self.ctx.as_mut().ok_or(DeviceError::NotCreated)?;
        self.frame.clear();
        ctx.textures.clear();
        ctx.shaders.clear();
        ctx.bind_groups.clear();
        ctx.pipelines.clear();
        ctx.surface.configure(&ctx.device, &ctx.config);
        self.bound_texture = None;
        self.vertex_shader = None;
        self.pixel_shader = None;
        Ok(())
    }

    fn native_format(&self, _format: PixelFormat) -> PixelFormat {
        PixelFormat::Rgba
    }

    fn supports_blend_mode(&self, _mode: BlendMode) -> bool {
        true
    }

    fn supports_color_mode(&self, _mode: ColorMode) -> bool {
        true
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<GpuTextureId, DeviceError> {
        if desc.format != PixelFormat::Rgba {
            return Err(DeviceError::Unsupported {
                backend: "wgpu",
                what: format!("texture format {}", desc.format),
            });
        }
        if data.len() != desc.format.buffer_size(desc.width, desc.height) {
            return Err(DeviceError::TextureCreation("pixel data size mismatch".into()));
        }
        let max = self
            .ctx
            .as_ref()
            .ok_or(DeviceError::NotCreated)?
            .device
            .limits()
            .max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(DeviceError::TextureCreation(format!(
                "invalid size {}x{}",
                desc.width, desc.height
            )));
        }

        let id = GpuTextureId(self.next_handle());
        let ctx = self.ctx.as_mut().ok_or(DeviceError::NotCreated)?;
        let tex = upload_texture(
            &ctx.device,
            &ctx.queue,
            desc.width,
            desc.height,
            data,
            "kestrel texture",
        );
        ctx.textures.insert(id, tex);
        Ok(id)
    }

    fn update_texture(
        &mut self,
        id: GpuTextureId,
        rect: PixelRect,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let ctx = self.ctx.as_ref().ok_or(DeviceError::NotCreated)?;
        let tex = ctx
            .textures
            .get(&id)
            .ok_or_else(|| DeviceError::TextureCreation(format!("unknown texture {id:?}")))?;
        if rect.is_empty() {
            return Ok(());
        }
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x as u32,
                    y: rect.y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * rect.w as u32),
                rows_per_image: Some(rect.h as u32),
            },
            wgpu::Extent3d {
                width: rect.w as u32,
                height: rect.h as u32,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_texture(&mut self, id: GpuTextureId) -> Option<Vec<u8>> {
        let ctx = self.ctx.as_ref()?;
        let tex = ctx.textures.get(&id)?;

        let row_bytes = 4 * tex.width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = row_bytes.div_ceil(align) * align;
        let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kestrel texture readback"),
            size: padded_row_bytes as u64 * tex.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("kestrel readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(tex.height),
                },
            },
            wgpu::Extent3d {
                width: tex.width,
                height: tex.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        if let Err(e) = ctx.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        }) {
            log::warn!("texture readback poll failed: {e}");
            return None;
        }
        if !rx.recv().is_ok_and(|res| res.is_ok()) {
            log::warn!("texture readback mapping failed");
            return None;
        }

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity((row_bytes * tex.height) as usize);
        for row in mapped.chunks(padded_row_bytes as usize) {
            out.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        readback.unmap();
        Some(out)
    }

    fn release_texture(&mut self, id: GpuTextureId) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.textures.remove(&id);
            ctx.bind_groups.retain(|(t, _), _| *t != Some(id));
        }
        if self.bound_texture == Some(id) {
            self.bound_texture = None;
        }
    }

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        source: ShaderSource<'_>,
    ) -> Result<GpuShaderId, DeviceError> {
        let ShaderSource::Source(wgsl) = source else {
            return Err(DeviceError::Unsupported {
                backend: "wgpu",
                what: "precompiled shader binaries".into(),
            });
        };
        if wgsl.trim().is_empty() {
            return Err(DeviceError::ShaderCompilation("empty shader source".into()));
        }
        let id = GpuShaderId(self.next_handle());
        let ctx = self.ctx.as_mut().ok_or(DeviceError::NotCreated)?;

        // Validation errors are reported through the device's uncaptured-error handler.
        let module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "kestrel vertex shader",
                    ShaderStage::Pixel => "kestrel pixel shader",
                }),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        ctx.shaders.insert(id, module);
        Ok(id)
    }

    fn release_shader(&mut self, id: GpuShaderId) {
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.shaders.remove(&id);
        }
        if self.vertex_shader == Some(id) {
            self.vertex_shader = None;
        }
        if self.pixel_shader == Some(id) {
            self.pixel_shader = None;
        }
    }

    fn bind_texture(&mut self, id: Option<GpuTextureId>) {
        self.bound_texture = id;
    }

    fn set_texture_filter(&mut self, filter: TextureFilter) {
        self.sampler.filter = filter;
    }

    fn set_texture_address_mode(&mut self, mode: TextureAddressMode) {
        self.sampler.address = mode;
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_color_mode(&mut self, mode: ColorMode, factor: f32) {
        self.color_mode = mode;
        self.color_factor = factor;
    }

    fn set_modelview(&mut self, matrix: &Mat4) {
        self.modelview = *matrix;
    }

    fn set_projection(&mut self, matrix: &Mat4) {
        self.projection = *matrix;
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = Some(rect);
    }

    fn set_depth_buffer(&mut self, enabled: bool) {
        if enabled && !self.options.depth_buffer {
            log::warn!("depth testing requested but the device was created without a depth buffer");
        }
        self.depth = enabled && self.options.depth_buffer;
    }

    fn bind_shader(&mut self, stage: ShaderStage, id: Option<GpuShaderId>) {
        match stage {
            ShaderStage::Vertex => self.vertex_shader = id,
            ShaderStage::Pixel => self.pixel_shader = id,
        }
    }

    fn clear(&mut self, color: Color, depth: bool) {
        self.frame.cmds.push(FrameCmd::Clear { color, depth });
    }

    fn draw(&mut self, op: RenderOp, vertices: VertexData<'_>, color: Option<Color>) {
        let Some(ctx) = self.ctx.as_ref() else {
            return;
        };
        let stride = vertices.format.stride();

        let vertex_offset = self.frame.vertices.len() as u64;
        let vertex_count = if op == RenderOp::TriangleFan {
            self.frame.fan_scratch.clear();
            let n = pipeline::expand_fan(vertices.bytes, stride, &mut self.frame.fan_scratch);
            self.frame.vertices.extend_from_slice(&self.frame.fan_scratch);
            n
        } else {
            self.frame.vertices.extend_from_slice(vertices.bytes);
            vertices.count
        };
        if vertex_count == 0 {
            return;
        }

        let textured = self.bound_texture.is_some() && vertices.format.has_uv();
        let uniforms = self.current_uniforms(color, textured);
        let pad = self.frame.uniforms.len() as u64 % ctx.uniform_align;
        if pad != 0 {
            let fill = (ctx.uniform_align - pad) as usize;
            self.frame.uniforms.resize(self.frame.uniforms.len() + fill, 0);
        }
        let uniform_offset = self.frame.uniforms.len() as u32;
        self.frame.uniforms.extend_from_slice(bytemuck::bytes_of(&uniforms));

        self.frame.cmds.push(FrameCmd::Draw(DrawCmd {
            key: PipelineKey {
                topology: pipeline::topology(op),
                vertex: vertices.format,
                blend: self.blend,
                depth: self.depth,
                vertex_shader: self.vertex_shader,
                pixel_shader: self.pixel_shader,
            },
            texture: if textured { self.bound_texture } else { None },
            sampler: self.sampler,
            vertex_offset,
            vertex_count: vertex_count as u32,
            uniform_offset,
            viewport: self.viewport,
        }));
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        let Some(ctx) = self.ctx.as_mut() else {
            return Err(DeviceError::NotCreated);
        };

        let surface_texture = match ctx.surface.get_current_texture() {
            Ok(t) => t,
            Err(err) => {
                self.frame.clear();
                return match surface::map_surface_error(&ctx.surface, &ctx.device, &ctx.config, err)
                {
                    SurfaceErrorAction::Fatal => Err(DeviceError::SurfaceLost),
                    SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => Ok(()),
                };
            }
        };

        for cmd in &self.frame.cmds {
            if let FrameCmd::Draw(draw) = cmd {
                ctx.pipelines.ensure(&ctx.device, draw.key, &ctx.shaders);
                ctx.ensure_bind_group(draw.texture, draw.sampler);
            }
        }
        ctx.upload_frame(&self.frame);

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let commands = ctx.encode(&self.frame, &view);
        ctx.queue.submit(std::iter::once(commands));
        self.window.pre_present_notify();
        surface_texture.present();

        self.frame.clear();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        if surface::apply_resize(&ctx.surface, &ctx.device, &mut ctx.config, width, height)
            && self.options.depth_buffer
        {
            ctx.depth_view = Some(depth_view(&ctx.device, width, height));
        }
    }

    fn display_modes(&self) -> Vec<DisplayMode> {
        let Some(monitor) = self.window.current_monitor() else {
            return Vec::new();
        };
        let mut modes: Vec<DisplayMode> = monitor
            .video_modes()
            .map(|m| DisplayMode {
                width: m.size().width,
                height: m.size().height,
                refresh_rate: m.refresh_rate_millihertz().div_ceil(1000),
            })
            .collect();
        modes.sort_by_key(|m| (m.width, m.height, m.refresh_rate));
        modes.dedup();
        modes
    }
}
