//! Backend device contract.
//!
//! `GpuDevice` is the flat capability interface every backend implements once.
//! The render system owns exactly one device and talks to it only after diffing
//! against its own state cache, so implementations never need to dedupe calls.
//!
//! - `HeadlessDevice`: in-memory backend that records every call
//! - `WgpuDevice`: wgpu backend presenting into a winit window

mod error;
mod headless;
mod init;
mod wgpu_backend;

pub use error::{DeviceError, SurfaceErrorAction};
pub use headless::{DeviceCall, HeadlessDevice, HeadlessProbe};
pub use init::GpuInit;
pub use wgpu_backend::WgpuDevice;

use crate::coords::{Color, Mat4, Rect, Vertex, VertexFormat};
use crate::image::{PixelFormat, PixelRect};
use crate::render::{BlendMode, ColorMode, RenderOp, RenderOptions};
use crate::shader::{ShaderSource, ShaderStage};
use crate::texture::{TextureAddressMode, TextureFilter};

/// Backend texture handle. Only meaningful to the device that issued it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GpuTextureId(pub u64);

/// Backend shader handle. Only meaningful to the device that issued it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct GpuShaderId(pub u64);

/// Texture creation parameters. `format` is always a native format of the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Raw vertex bytes tagged with their layout.
#[derive(Debug, Copy, Clone)]
pub struct VertexData<'a> {
    pub format: VertexFormat,
    pub bytes: &'a [u8],
    pub count: usize,
}

impl<'a> VertexData<'a> {
    pub fn new<V: Vertex>(vertices: &'a [V]) -> Self {
        Self {
            format: V::FORMAT,
            bytes: bytemuck::cast_slice(vertices),
            count: vertices.len(),
        }
    }
}

/// A fullscreen mode offered by the display.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
}

/// Flat backend interface.
///
/// All calls happen on the render thread. Handle-taking calls ignore handles
/// they do not know (e.g. handles issued before a `reset`).
pub trait GpuDevice {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    fn create(&mut self, options: &RenderOptions) -> Result<(), DeviceError>;
    fn destroy(&mut self);

    /// Simulated or real device loss: every texture and shader handle becomes invalid.
    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Layout the device stores for textures requested in `format`.
    fn native_format(&self, format: PixelFormat) -> PixelFormat;
    fn supports_blend_mode(&self, mode: BlendMode) -> bool;
    fn supports_color_mode(&self, mode: ColorMode) -> bool;

    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8])
        -> Result<GpuTextureId, DeviceError>;
    /// `data` holds exactly `rect` in the texture's native format.
    fn update_texture(
        &mut self,
        id: GpuTextureId,
        rect: PixelRect,
        data: &[u8],
    ) -> Result<(), DeviceError>;
    /// Whole texture in its native format, tightly packed.
    fn read_texture(&mut self, id: GpuTextureId) -> Option<Vec<u8>>;
    fn release_texture(&mut self, id: GpuTextureId);

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        source: ShaderSource<'_>,
    ) -> Result<GpuShaderId, DeviceError>;
    fn release_shader(&mut self, id: GpuShaderId);

    fn bind_texture(&mut self, id: Option<GpuTextureId>);
    fn set_texture_filter(&mut self, filter: TextureFilter);
    fn set_texture_address_mode(&mut self, mode: TextureAddressMode);
    fn set_blend_mode(&mut self, mode: BlendMode);
    fn set_color_mode(&mut self, mode: ColorMode, factor: f32);
    fn set_modelview(&mut self, matrix: &Mat4);
    fn set_projection(&mut self, matrix: &Mat4);
    fn set_viewport(&mut self, rect: Rect);
    fn set_depth_buffer(&mut self, enabled: bool);
    fn bind_shader(&mut self, stage: ShaderStage, id: Option<GpuShaderId>);

    fn clear(&mut self, color: Color, depth: bool);
    fn draw(&mut self, op: RenderOp, vertices: VertexData<'_>, color: Option<Color>);
    fn present(&mut self) -> Result<(), DeviceError>;

    /// Backbuffer size in physical pixels.
    fn resize(&mut self, width: u32, height: u32);
    fn display_modes(&self) -> Vec<DisplayMode>;
}
