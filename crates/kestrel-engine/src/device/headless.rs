use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::coords::{Color, Mat4, Rect, VertexFormat};
use crate::image::{write_rect, PixelFormat, PixelRect, PixelView, PixelViewMut};
use crate::render::{BlendMode, ColorMode, RenderOp, RenderOptions};
use crate::shader::{ShaderSource, ShaderStage};
use crate::texture::{TextureAddressMode, TextureFilter};

use super::{
    DeviceError, DisplayMode, GpuDevice, GpuShaderId, GpuTextureId, TextureDesc, VertexData,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Create(RenderOptions),
    Destroy,
    Reset,
    CreateTexture { id: GpuTextureId, width: u32, height: u32, format: PixelFormat },
    UpdateTexture { id: GpuTextureId, rect: PixelRect },
    ReleaseTexture(GpuTextureId),
    CreateShader { id: GpuShaderId, stage: ShaderStage },
    ReleaseShader(GpuShaderId),
    BindTexture(Option<GpuTextureId>),
    SetTextureFilter(TextureFilter),
    SetTextureAddressMode(TextureAddressMode),
    SetBlendMode(BlendMode),
    SetColorMode(ColorMode, f32),
    SetModelview(Mat4),
    SetProjection(Mat4),
    SetViewport(Rect),
    SetDepthBuffer(bool),
    BindShader(ShaderStage, Option<GpuShaderId>),
    Clear { color: Color, depth: bool },
    Draw { op: RenderOp, format: VertexFormat, count: usize, color: Option<Color> },
    Present,
    Resize(u32, u32),
}

impl DeviceCall {
    /// True for calls that change bound pipeline state (binds and setters).
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            DeviceCall::BindTexture(_)
                | DeviceCall::SetTextureFilter(_)
                | DeviceCall::SetTextureAddressMode(_)
                | DeviceCall::SetBlendMode(_)
                | DeviceCall::SetColorMode(..)
                | DeviceCall::SetViewport(_)
                | DeviceCall::SetDepthBuffer(_)
                | DeviceCall::BindShader(..)
        )
    }
}

#[derive(Debug)]
struct StoredTexture {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    created: bool,
    calls: Vec<DeviceCall>,
    textures: HashMap<u64, StoredTexture>,
    shaders: HashMap<u64, ShaderStage>,
    next_handle: u64,
    scratch: Vec<u8>,
    frames: u64,
    refuse_textures: bool,
}

impl HeadlessState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Inspection handle onto a `HeadlessDevice` that has been moved into a render system.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessProbe {
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.borrow().calls.clone()
    }

    /// Returns and forgets the recorded calls.
    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn is_created(&self) -> bool {
        self.state.borrow().created
    }

    /// Live texture handles.
    pub fn texture_count(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn shader_count(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    /// Capacity of the shared vertex scratch buffer, in bytes.
    pub fn vertex_buffer_capacity(&self) -> usize {
        self.state.borrow().scratch.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.state.borrow().frames
    }

    /// While set, texture creation fails as an exhausted device would.
    pub fn set_texture_creation_fails(&self, fails: bool) {
        self.state.borrow_mut().refuse_textures = fails;
    }
}

/// In-memory backend.
///
/// Stores texture bytes in RAM and records every call for inspection through
/// [`HeadlessProbe`]. Used by tests and by offscreen tooling that needs the
/// resource lifecycle without a GPU.
#[derive(Debug)]
pub struct HeadlessDevice {
    state: Rc<RefCell<HeadlessState>>,
    native: Option<PixelFormat>,
    unsupported_blend: Vec<BlendMode>,
    unsupported_color: Vec<ColorMode>,
    fail_create: bool,
    display_modes: Vec<DisplayMode>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HeadlessState::default())),
            native: None,
            unsupported_blend: Vec::new(),
            unsupported_color: Vec::new(),
            fail_create: false,
            display_modes: vec![DisplayMode { width: 1920, height: 1080, refresh_rate: 60 }],
        }
    }

    /// Stores every texture in `format`, like a backend with a single native layout.
    pub fn with_native_format(mut self, format: PixelFormat) -> Self {
        self.native = Some(format);
        self
    }

    pub fn without_blend_mode(mut self, mode: BlendMode) -> Self {
        self.unsupported_blend.push(mode);
        self
    }

    pub fn without_color_mode(mut self, mode: ColorMode) -> Self {
        self.unsupported_color.push(mode);
        self
    }

    /// Makes `create` fail, as a missing adapter would.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_display_modes(mut self, modes: Vec<DisplayMode>) -> Self {
        self.display_modes = modes;
        self
    }

    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe { state: self.state.clone() }
    }

    fn record(&self, call: DeviceCall) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create(&mut self, options: &RenderOptions) -> Result<(), DeviceError> {
        self.record(DeviceCall::Create(*options));
        if self.fail_create {
            return Err(DeviceError::Creation("headless device configured to fail".into()));
        }
        self.state.borrow_mut().created = true;
        Ok(())
    }

    fn destroy(&mut self) {
        self.record(DeviceCall::Destroy);
        let mut st = self.state.borrow_mut();
        st.created = false;
        st.textures.clear();
        st.shaders.clear();
        st.scratch = Vec::new();
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.record(DeviceCall::Reset);
        let mut st = self.state.borrow_mut();
        if !st.created {
            return Err(DeviceError::NotCreated);
        }
        st.textures.clear();
        st.shaders.clear();
        Ok(())
    }

    fn native_format(&self, format: PixelFormat) -> PixelFormat {
        self.native.unwrap_or(format)
    }

    fn supports_blend_mode(&self, mode: BlendMode) -> bool {
        !self.unsupported_blend.contains(&mode)
    }

    fn supports_color_mode(&self, mode: ColorMode) -> bool {
        !self.unsupported_color.contains(&mode)
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<GpuTextureId, DeviceError> {
        let mut st = self.state.borrow_mut();
        if !st.created {
            return Err(DeviceError::NotCreated);
        }
        if st.refuse_textures {
            return Err(DeviceError::TextureCreation("out of device memory".into()));
        }
        let expected = desc.format.buffer_size(desc.width, desc.height);
        if data.len() != expected {
            return Err(DeviceError::TextureCreation(format!(
                "expected {expected} bytes, got {}",
                data.len()
            )));
        }

        let id = GpuTextureId(st.next_handle());
        st.textures.insert(
            id.0,
            StoredTexture {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                data: data.to_vec(),
            },
        );
        st.calls.push(DeviceCall::CreateTexture {
            id,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        Ok(id)
    }

    fn update_texture(
        &mut self,
        id: GpuTextureId,
        rect: PixelRect,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let mut st = self.state.borrow_mut();
        st.calls.push(DeviceCall::UpdateTexture { id, rect });
        let Some(tex) = st.textures.get_mut(&id.0) else {
            return Err(DeviceError::TextureCreation(format!("unknown texture {id:?}")));
        };

        let src = PixelView::new(data, rect.w.max(0) as u32, rect.h.max(0) as u32, tex.format);
        let mut dst = PixelViewMut::new(&mut tex.data, tex.width, tex.height, tex.format);
        write_rect(&src, PixelRect::new(0, 0, rect.w, rect.h), &mut dst, rect.x, rect.y);
        Ok(())
    }

    fn read_texture(&mut self, id: GpuTextureId) -> Option<Vec<u8>> {
        self.state.borrow().textures.get(&id.0).map(|t| t.data.clone())
    }

    fn release_texture(&mut self, id: GpuTextureId) {
        let mut st = self.state.borrow_mut();
        if st.textures.remove(&id.0).is_some() {
            st.calls.push(DeviceCall::ReleaseTexture(id));
        }
    }

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        source: ShaderSource<'_>,
    ) -> Result<GpuShaderId, DeviceError> {
        let mut st = self.state.borrow_mut();
        if !st.created {
            return Err(DeviceError::NotCreated);
        }
        let empty = match source {
            ShaderSource::Source(s) => s.trim().is_empty(),
            ShaderSource::Binary(b) => b.is_empty(),
        };
        if empty {
            return Err(DeviceError::ShaderCompilation("empty shader".into()));
        }
        let id = GpuShaderId(st.next_handle());
        st.shaders.insert(id.0, stage);
        st.calls.push(DeviceCall::CreateShader { id, stage });
        Ok(id)
    }

    fn release_shader(&mut self, id: GpuShaderId) {
        let mut st = self.state.borrow_mut();
        if st.shaders.remove(&id.0).is_some() {
            st.calls.push(DeviceCall::ReleaseShader(id));
        }
    }

    fn bind_texture(&mut self, id: Option<GpuTextureId>) {
        self.record(DeviceCall::BindTexture(id));
    }

    fn set_texture_filter(&mut self, filter: TextureFilter) {
        self.record(DeviceCall::SetTextureFilter(filter));
    }

    fn set_texture_address_mode(&mut self, mode: TextureAddressMode) {
        self.record(DeviceCall::SetTextureAddressMode(mode));
    }

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.record(DeviceCall::SetBlendMode(mode));
    }

    fn set_color_mode(&mut self, mode: ColorMode, factor: f32) {
        self.record(DeviceCall::SetColorMode(mode, factor));
    }

    fn set_modelview(&mut self, matrix: &Mat4) {
        self.record(DeviceCall::SetModelview(*matrix));
    }

    fn set_projection(&mut self, matrix: &Mat4) {
        self.record(DeviceCall::SetProjection(*matrix));
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.record(DeviceCall::SetViewport(rect));
    }

    fn set_depth_buffer(&mut self, enabled: bool) {
        self.record(DeviceCall::SetDepthBuffer(enabled));
    }

    fn bind_shader(&mut self, stage: ShaderStage, id: Option<GpuShaderId>) {
        self.record(DeviceCall::BindShader(stage, id));
    }

    fn clear(&mut self, color: Color, depth: bool) {
        self.record(DeviceCall::Clear { color, depth });
    }

    fn draw(&mut self, op: RenderOp, vertices: VertexData<'_>, color: Option<Color>) {
        let mut st = self.state.borrow_mut();
        let needed = vertices.bytes.len();
        if st.scratch.len() < needed {
            let new_cap = needed.next_power_of_two().max(1024);
            st.scratch.resize(new_cap, 0);
        }
        st.scratch[..needed].copy_from_slice(vertices.bytes);
        st.calls.push(DeviceCall::Draw {
            op,
            format: vertices.format,
            count: vertices.count,
            color,
        });
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        let mut st = self.state.borrow_mut();
        st.frames += 1;
        st.calls.push(DeviceCall::Present);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.record(DeviceCall::Resize(width, height));
    }

    fn display_modes(&self) -> Vec<DisplayMode> {
        self.display_modes.clone()
    }
}
