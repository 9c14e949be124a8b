use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};

use crate::coords::{Color, PlainVertex, Rect, TexturedVertex, Vertex};
use crate::device::{DisplayMode, GpuDevice, GpuShaderId, GpuTextureId, VertexData};
use crate::image::{self, Image, ImageInfo, PixelFormat};
use crate::shader::{Shader, ShaderStage};
use crate::texture::{
    load_cell, LoadMode, Texture, TextureAddressMode, TextureData, TextureFilter, TextureInfo,
    TextureType,
};

use super::resources::find_texture_filename;
use super::shared::{RenderShared, RenderSystemConfig};
use super::state::RenderState;
use super::{
    BlendMode, ColorMode, FileSystemResources, RenderError, RenderOp, RenderOptions,
    ResourceProvider,
};

/// The render system.
///
/// Owns the backend device and a cache of the state bound on it; setters
/// diff against the cache and skip redundant backend calls. Creates and
/// tracks textures and shaders.
///
/// Everything here runs on one thread (the type is `!Send`). Textures and
/// shaders keep the shared core alive, so they may outlive the system; after
/// `destroy` they are unloaded and reload on next use once the system is
/// created again.
pub struct RenderSystem {
    shared: Rc<RenderShared>,
    state: RenderState,
    options: RenderOptions,
    config: RenderSystemConfig,
    warned_blend: HashSet<BlendMode>,
    warned_color: HashSet<ColorMode>,
}

impl RenderSystem {
    pub fn new(device: Box<dyn GpuDevice>, config: RenderSystemConfig) -> Self {
        let resources: Rc<dyn ResourceProvider> = Rc::new(FileSystemResources::default());
        Self {
            shared: Rc::new(RenderShared::new(device, &config, resources)),
            state: RenderState::default(),
            options: config.options,
            config,
            warned_blend: HashSet::new(),
            warned_color: HashSet::new(),
        }
    }

    pub fn with_resources(self, resources: Rc<dyn ResourceProvider>) -> Self {
        self.set_resources(resources);
        self
    }

    pub fn set_resources(&self, resources: Rc<dyn ResourceProvider>) {
        *self.shared.resources.borrow_mut() = resources;
    }

    pub fn resources(&self) -> Rc<dyn ResourceProvider> {
        self.shared.resources()
    }

    pub fn name(&self) -> &'static str {
        self.shared.device.borrow().name()
    }

    pub fn config(&self) -> &RenderSystemConfig {
        &self.config
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    pub fn is_created(&self) -> bool {
        self.shared.created.get()
    }

    fn device(&self) -> std::cell::RefMut<'_, Box<dyn GpuDevice>> {
        self.shared.device.borrow_mut()
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Creates the device. `Ok(false)` if already created; device failures are fatal.
    pub fn create(&mut self, options: RenderOptions) -> Result<bool, RenderError> {
        if self.is_created() {
            return Ok(false);
        }
        log::info!("creating render system '{}' ({options})", self.name());
        self.device().create(&options)?;
        self.options = options;
        self.shared.created.set(true);
        self.state = RenderState::default();
        self.apply_defaults();
        Ok(true)
    }

    /// Unloads every registered texture and shader, then tears down the device.
    /// False if the system was not created.
    pub fn destroy(&mut self) -> bool {
        if !self.is_created() {
            return false;
        }
        log::info!("destroying render system '{}'", self.name());
        let unloaded = self.unload_textures();
        log::debug!("{unloaded} textures unloaded on destroy");
        {
            let mut device = self.device();
            self.shared.shaders.borrow().release_all(device.as_mut());
            device.destroy();
        }
        self.shared.created.set(false);
        self.state = RenderState::default();
        true
    }

    /// Device loss/restore. Every GPU handle is dropped; textures and shaders
    /// stay registered and reload on next use. The state cache becomes unknown.
    pub fn reset(&mut self) -> Result<(), RenderError> {
        if !self.is_created() {
            return Err(RenderError::NotCreated);
        }
        log::info!("resetting render system '{}'", self.name());
        self.shared.textures.borrow().invalidate_gpu_handles();
        self.shared.shaders.borrow().invalidate_all();
        self.device().reset()?;

        self.state.invalidate();
        let (modelview, projection) = (self.state.modelview, self.state.projection);
        self.device().set_modelview(&modelview);
        self.device().set_projection(&projection);
        Ok(())
    }

    fn apply_defaults(&mut self) {
        self.bind_gpu_texture(None);
        self.set_texture_filter(TextureFilter::default());
        self.set_texture_address_mode(TextureAddressMode::default());
        self.set_blend_mode(BlendMode::default());
        self.set_color_mode(ColorMode::default(), 1.0);
        self.set_depth_buffer(self.options.depth_buffer);
        self.set_identity_transform();
        let projection = self.state.projection;
        self.device().set_projection(&projection);
    }

    // ── state setters ────────────────────────────────────────────────────

    /// Binds `texture`, loading it first if needed. `None` unbinds.
    pub fn set_texture(&mut self, texture: Option<&Texture>) {
        let Some(texture) = texture else {
            self.state.active_texture = None;
            self.bind_gpu_texture(None);
            return;
        };
        if !Rc::ptr_eq(&texture.shared, &self.shared) {
            log::warn!("texture {:?} belongs to another render system", texture.id());
            return;
        }
        self.state.active_texture = Some(Rc::downgrade(&texture.inner));
        self.apply_texture(&texture.inner);
    }

    fn apply_texture(&mut self, cell: &Rc<RefCell<TextureData>>) {
        if !cell.borrow().is_loaded() {
            load_cell(cell, &self.shared, None);
        }
        let (id, gpu, ty, filter, address_mode) = {
            let d = cell.borrow();
            (d.id, d.gpu_handle(), d.ty, d.filter, d.address_mode)
        };
        self.shared.textures.borrow().reset_unused_timer(id, true);

        if gpu.is_none() && ty == TextureType::Ram {
            log::warn!("RAM texture {id:?} cannot be bound for drawing");
        }
        self.bind_gpu_texture(gpu);
        if gpu.is_some() {
            self.set_texture_filter(filter);
            self.set_texture_address_mode(address_mode);
        }
    }

    fn bind_gpu_texture(&mut self, gpu: Option<GpuTextureId>) {
        if self.state.texture.update(gpu) {
            self.device().bind_texture(gpu);
        }
    }

    pub fn set_texture_filter(&mut self, filter: TextureFilter) {
        if self.state.filter.update(filter) {
            self.device().set_texture_filter(filter);
        }
    }

    pub fn set_texture_address_mode(&mut self, mode: TextureAddressMode) {
        if self.state.address_mode.update(mode) {
            self.device().set_texture_address_mode(mode);
        }
    }

    /// Unsupported modes fall back to `BlendMode::Alpha`.
    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        let mode = if self.device().supports_blend_mode(mode) {
            mode
        } else {
            if self.warned_blend.insert(mode) {
                log::warn!("blend mode {mode:?} not supported by '{}'", self.name());
            }
            BlendMode::Alpha
        };
        if self.state.blend_mode.update(mode) {
            self.device().set_blend_mode(mode);
        }
    }

    /// `factor` is only meaningful for `ColorMode::Lerp`. Unsupported modes
    /// fall back to `ColorMode::Multiply`.
    pub fn set_color_mode(&mut self, mode: ColorMode, factor: f32) {
        let mode = if self.device().supports_color_mode(mode) {
            mode
        } else {
            if self.warned_color.insert(mode) {
                log::warn!("color mode {mode:?} not supported by '{}'", self.name());
            }
            ColorMode::Multiply
        };
        if self.state.color_mode.update((mode, factor)) {
            self.device().set_color_mode(mode, factor);
        }
    }

    pub fn blend_mode(&self) -> Option<BlendMode> {
        self.state.blend_mode.get()
    }

    pub fn color_mode(&self) -> Option<(ColorMode, f32)> {
        self.state.color_mode.get()
    }

    pub fn set_viewport(&mut self, rect: Rect) {
        if self.state.viewport.update(rect) {
            self.device().set_viewport(rect);
        }
    }

    pub fn viewport(&self) -> Option<Rect> {
        self.state.viewport.get()
    }

    pub fn set_depth_buffer(&mut self, enabled: bool) {
        if self.state.depth_buffer.update(enabled) {
            self.device().set_depth_buffer(enabled);
        }
    }

    pub fn set_vertex_shader(&mut self, shader: Option<&Shader>) {
        let id = self.shader_handle(shader, ShaderStage::Vertex);
        if self.state.vertex_shader.update(id) {
            self.device().bind_shader(ShaderStage::Vertex, id);
        }
    }

    pub fn set_pixel_shader(&mut self, shader: Option<&Shader>) {
        let id = self.shader_handle(shader, ShaderStage::Pixel);
        if self.state.pixel_shader.update(id) {
            self.device().bind_shader(ShaderStage::Pixel, id);
        }
    }

    fn shader_handle(&self, shader: Option<&Shader>, stage: ShaderStage) -> Option<GpuShaderId> {
        let shader = shader?;
        if !shader.belongs_to(&self.shared) {
            log::warn!("shader {:?} belongs to another render system", shader.id());
            return None;
        }
        if shader.stage() != stage {
            log::warn!("{:?} shader bound as {stage:?} shader", shader.stage());
            return None;
        }
        shader.ensure_compiled()
    }

    // ── transforms ───────────────────────────────────────────────────────

    pub fn modelview_matrix(&self) -> Mat4 {
        self.state.modelview
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.state.projection
    }

    pub fn set_modelview_matrix(&mut self, matrix: Mat4) {
        self.state.modelview = matrix;
        self.device().set_modelview(&matrix);
    }

    pub fn set_projection_matrix(&mut self, matrix: Mat4) {
        self.state.projection = matrix;
        self.device().set_projection(&matrix);
    }

    pub fn set_identity_transform(&mut self) {
        self.set_modelview_matrix(Mat4::IDENTITY);
    }

    /// Post-multiplies the modelview matrix, so calls compose in call order.
    fn compose(&mut self, matrix: Mat4) {
        self.set_modelview_matrix(self.state.modelview * matrix);
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.compose(Mat4::from_translation(offset));
    }

    /// Rotates by `degrees` around `axis`. A zero axis is ignored.
    pub fn rotate(&mut self, degrees: f32, axis: Vec3) {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            log::warn!("rotate: zero-length axis ignored");
            return;
        }
        self.compose(Mat4::from_axis_angle(axis, degrees.to_radians()));
    }

    pub fn scale(&mut self, factor: Vec3) {
        self.compose(Mat4::from_scale(factor));
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.set_modelview_matrix(Mat4::look_at_rh(eye, target, up));
    }

    pub fn set_perspective(&mut self, fov_y_degrees: f32, aspect: f32, near: f32, far: f32) {
        self.set_projection_matrix(Mat4::perspective_rh(
            fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        ));
    }

    /// Pixel-space projection: `rect`'s top-left maps to the top-left of the viewport.
    pub fn set_ortho_projection(&mut self, rect: Rect) {
        self.set_projection_matrix(Mat4::orthographic_rh(
            rect.x(),
            rect.right(),
            rect.bottom(),
            rect.y(),
            -1.0,
            1.0,
        ));
    }

    pub fn push_transform(&mut self) {
        self.state.transform_stack.push(self.state.modelview);
    }

    /// False (and nothing changes) when the stack is empty.
    pub fn pop_transform(&mut self) -> bool {
        match self.state.transform_stack.pop() {
            Some(matrix) => {
                self.set_modelview_matrix(matrix);
                true
            }
            None => {
                log::warn!("pop_transform: transform stack is empty");
                false
            }
        }
    }

    // ── drawing ──────────────────────────────────────────────────────────

    /// Draws `vertices` with the current state. `color` tints every vertex.
    /// Input too short to form one primitive of `op` is a no-op.
    pub fn render<V: Vertex>(&mut self, op: RenderOp, vertices: &[V], color: Option<Color>) {
        if vertices.len() < op.min_vertices() {
            if !vertices.is_empty() {
                log::debug!("render: {} vertices cannot form a {op:?} primitive", vertices.len());
            }
            return;
        }
        if !self.is_created() {
            log::warn!("render called before the render system was created");
            return;
        }
        self.restore_active_texture();
        self.device().draw(op, VertexData::new(vertices), color);
    }

    /// Reloads the bound texture if it was unloaded since it was bound
    /// (idle unload, explicit unload or device reset).
    fn restore_active_texture(&mut self) {
        let Some(cell) = self.state.active_texture() else {
            return;
        };
        if !cell.borrow().is_loaded() {
            self.apply_texture(&cell);
        }
    }

    /// Outline of `rect`.
    pub fn draw_rect(&mut self, rect: Rect, color: Color) {
        let (l, t, r, b) = (rect.x(), rect.y(), rect.right(), rect.bottom());
        let v = [
            PlainVertex::new(l, t),
            PlainVertex::new(r, t),
            PlainVertex::new(r, b),
            PlainVertex::new(l, b),
            PlainVertex::new(l, t),
        ];
        self.render(RenderOp::LineStrip, &v, Some(color));
    }

    pub fn draw_filled_rect(&mut self, rect: Rect, color: Color) {
        let (l, t, r, b) = (rect.x(), rect.y(), rect.right(), rect.bottom());
        let v = [
            PlainVertex::new(l, t),
            PlainVertex::new(r, t),
            PlainVertex::new(l, b),
            PlainVertex::new(r, b),
        ];
        self.render(RenderOp::TriangleStrip, &v, Some(color));
    }

    /// Draws `rect` with the bound texture; `uv` selects the source region in [0, 1].
    pub fn draw_textured_rect(&mut self, rect: Rect, uv: Rect) {
        let (l, t, r, b) = (rect.x(), rect.y(), rect.right(), rect.bottom());
        let (ul, vt, ur, vb) = (uv.x(), uv.y(), uv.right(), uv.bottom());
        let v = [
            TexturedVertex::new(l, t, ul, vt),
            TexturedVertex::new(r, t, ur, vt),
            TexturedVertex::new(l, b, ul, vb),
            TexturedVertex::new(r, b, ur, vb),
        ];
        self.render(RenderOp::TriangleStrip, &v, None);
    }

    pub fn clear(&mut self, color: Color, depth: bool) {
        if self.is_created() {
            self.device().clear(color, depth);
        }
    }

    pub fn present_frame(&mut self) -> Result<(), RenderError> {
        if !self.is_created() {
            return Err(RenderError::NotCreated);
        }
        self.device().present()?;
        Ok(())
    }

    /// Resizes the backbuffer and resets the viewport to cover it.
    pub fn on_resolution_changed(&mut self, width: u32, height: u32) {
        log::info!("render system resolution changed to {width}x{height}");
        self.device().resize(width, height);
        self.set_viewport(Rect::from_size(Vec2::new(width as f32, height as f32)));
    }

    pub fn supported_display_modes(&self) -> Vec<DisplayMode> {
        self.shared.device.borrow().display_modes()
    }

    // ── textures ─────────────────────────────────────────────────────────

    pub fn texture_extensions(&self) -> Vec<String> {
        self.shared.texture_extensions.borrow().clone()
    }

    pub fn set_texture_extensions(&mut self, extensions: Vec<String>) {
        *self.shared.texture_extensions.borrow_mut() = extensions;
    }

    /// Resolves `name` to an existing resource; see [`find_texture_filename`].
    pub fn find_texture_filename(&self, name: &str) -> String {
        let resources = self.shared.resources();
        let extensions = self.shared.texture_extensions.borrow();
        find_texture_filename(resources.as_ref(), &extensions, name)
    }

    /// Creates a texture from an image resource.
    ///
    /// `LoadMode::Immediate` decodes and uploads now; `LoadMode::OnDemand` only
    /// reads the header and makes the texture dynamic, loading on first use.
    /// `None` when the resource is missing or unreadable.
    pub fn create_texture_from_resource(
        &mut self,
        name: &str,
        ty: TextureType,
        mode: LoadMode,
    ) -> Option<Texture> {
        let filename = self.find_texture_filename(name);
        if filename.is_empty() {
            log::warn!("texture '{name}' not found");
            return None;
        }
        let bytes = match self.shared.read_resource(&filename) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("texture '{filename}': {err}");
                return None;
            }
        };

        match mode {
            LoadMode::Immediate => {
                let img = match image::decode(&bytes) {
                    Ok(img) => img,
                    Err(err) => {
                        log::warn!("texture '{filename}': {err}");
                        return None;
                    }
                };
                let info = ImageInfo { width: img.width, height: img.height, format: img.format };
                let texture = Texture::register(&self.shared, TextureData::from_file(filename, info, ty));
                if texture.load_with(img) { Some(texture) } else { None }
            }
            LoadMode::OnDemand => {
                let info = match image::probe(&bytes) {
                    Ok(info) => info,
                    Err(err) => {
                        log::warn!("texture '{filename}': {err}");
                        return None;
                    }
                };
                let mut data = TextureData::from_file(filename, info, ty);
                data.dynamic = true;
                Some(Texture::register(&self.shared, data))
            }
        }
    }

    /// Creates a blank texture filled with `fill`.
    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        ty: TextureType,
        fill: Color,
    ) -> Option<Texture> {
        if width == 0 || height == 0 {
            log::warn!("cannot create a {width}x{height} texture");
            return None;
        }
        let data = TextureData::blank(width, height, format, ty, fill);
        let texture = Texture::register(&self.shared, data);
        if texture.load() { Some(texture) } else { None }
    }

    /// Creates a texture from raw pixels laid out in `format`.
    pub fn create_texture_from_pixels(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        ty: TextureType,
        pixels: &[u8],
    ) -> Option<Texture> {
        let img = match Image::from_raw(width, height, format, pixels.to_vec()) {
            Ok(img) => img,
            Err(err) => {
                log::warn!("{err}");
                return None;
            }
        };
        let data = TextureData::blank(width, height, format, ty, Color::CLEAR);
        let texture = Texture::register(&self.shared, data);
        if texture.load_with(img) { Some(texture) } else { None }
    }

    /// Blank RAM-only texture; usable for pixel work without a device.
    pub fn create_ram_texture(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        fill: Color,
    ) -> Option<Texture> {
        self.create_texture(width, height, format, TextureType::Ram, fill)
    }

    pub fn create_ram_texture_from_resource(&mut self, name: &str) -> Option<Texture> {
        self.create_texture_from_resource(name, TextureType::Ram, LoadMode::Immediate)
    }

    /// Unloads every registered texture. Returns how many were loaded.
    pub fn unload_textures(&mut self) -> usize {
        let textures = self.shared.textures.borrow();
        let mut device = self.device();
        textures.unload_all(device.as_mut())
    }

    /// Advances idle timers of dynamic textures, unloading the ones idle for
    /// longer than [`idle_texture_unload_time`](Self::idle_texture_unload_time).
    pub fn update(&mut self, dt: f32) {
        let threshold = self.shared.idle_unload_time.get();
        let textures = self.shared.textures.borrow();
        let mut device = self.device();
        textures.update_all(dt, threshold, device.as_mut());
    }

    pub fn idle_texture_unload_time(&self) -> f32 {
        self.shared.idle_unload_time.get()
    }

    /// 0 disables idle unloading.
    pub fn set_idle_texture_unload_time(&mut self, seconds: f32) {
        self.shared.idle_unload_time.set(seconds.max(0.0));
    }

    /// Called after every successful texture load.
    pub fn set_texture_loading_listener(&mut self, listener: impl Fn(&TextureInfo) + 'static) {
        *self.shared.loading_listener.borrow_mut() = Some(Rc::new(listener));
    }

    pub fn clear_texture_loading_listener(&mut self) {
        *self.shared.loading_listener.borrow_mut() = None;
    }

    pub fn texture_count(&self) -> usize {
        self.shared.textures.borrow().count()
    }

    pub fn loaded_texture_count(&self) -> usize {
        self.shared.textures.borrow().loaded_count()
    }

    /// Bytes held by textures in RAM and on the GPU.
    pub fn texture_memory_usage(&self) -> usize {
        self.shared.textures.borrow().memory_usage()
    }

    // ── shaders ──────────────────────────────────────────────────────────

    pub fn create_shader(&mut self, stage: ShaderStage) -> Shader {
        Shader::register(&self.shared, stage)
    }

    pub fn create_shader_from_resource(&mut self, stage: ShaderStage, name: &str) -> Option<Shader> {
        let shader = self.create_shader(stage);
        if shader.load_resource(name) { Some(shader) } else { None }
    }

    pub fn shader_count(&self) -> usize {
        self.shared.shaders.borrow().count()
    }
}

impl Drop for RenderSystem {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for RenderSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSystem")
            .field("name", &self.name())
            .field("created", &self.is_created())
            .field("options", &self.options)
            .field("textures", &self.texture_count())
            .finish()
    }
}
