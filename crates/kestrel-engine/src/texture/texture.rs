use std::cell::RefCell;
use std::rc::Rc;

use crate::coords::Color;
use crate::device::{DeviceError, GpuDevice, GpuTextureId, TextureDesc};
use crate::image::{
    self, convert, quantize, write_rect, Image, ImageError, ImageInfo, PixelFormat, PixelRect,
    PixelView,
};
use crate::render::RenderShared;

use super::{TextureAddressMode, TextureFilter, TextureId, TextureType};

#[derive(thiserror::Error, Debug)]
pub(crate) enum LoadError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("texture has no pixels ({0}x{1})")]
    Empty(u32, u32),
}

/// Backend storage of a loaded GPU texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct GpuStorage {
    pub id: GpuTextureId,
    /// Layout the device actually stores.
    pub format: PixelFormat,
}

/// Snapshot of a texture's metadata, handed to the loading listener.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    pub id: TextureId,
    pub filename: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub ty: TextureType,
    pub dynamic: bool,
}

/// Metadata and storage of one texture. Shared between the owning
/// [`Texture`] handle and the manager's weak registry.
#[derive(Debug)]
pub(crate) struct TextureData {
    pub(crate) id: TextureId,
    pub(crate) filename: Option<String>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// Logical format; pixel accessors behave as if storage used it.
    pub(crate) format: PixelFormat,
    pub(crate) ty: TextureType,
    pub(crate) filter: TextureFilter,
    pub(crate) address_mode: TextureAddressMode,
    pub(crate) dynamic: bool,
    pub(crate) unused_time: f32,
    fill: Color,
    ram: Option<Image>,
    gpu: Option<GpuStorage>,
}

impl TextureData {
    pub(crate) fn blank(
        width: u32,
        height: u32,
        format: PixelFormat,
        ty: TextureType,
        fill: Color,
    ) -> Self {
        Self {
            id: TextureId::next(),
            filename: None,
            width,
            height,
            format,
            ty,
            filter: TextureFilter::default(),
            address_mode: TextureAddressMode::default(),
            dynamic: false,
            unused_time: 0.0,
            fill,
            ram: None,
            gpu: None,
        }
    }

    pub(crate) fn from_file(filename: String, info: ImageInfo, ty: TextureType) -> Self {
        Self {
            filename: Some(filename),
            ..Self::blank(info.width, info.height, info.format, ty, Color::CLEAR)
        }
    }

    pub(crate) fn info(&self) -> TextureInfo {
        TextureInfo {
            id: self.id,
            filename: self.filename.clone(),
            width: self.width,
            height: self.height,
            format: self.format,
            ty: self.ty,
            dynamic: self.dynamic,
        }
    }

    pub(crate) fn is_loaded(&self) -> bool {
        match self.ty {
            TextureType::Ram => self.ram.is_some(),
            TextureType::Immutable | TextureType::Managed => self.gpu.is_some(),
        }
    }

    pub(crate) fn gpu_handle(&self) -> Option<GpuTextureId> {
        self.gpu.map(|g| g.id)
    }

    pub(crate) fn memory_usage(&self) -> usize {
        let ram = self.ram.as_ref().map_or(0, Image::byte_size);
        let gpu = self
            .gpu
            .map_or(0, |g| g.format.buffer_size(self.width, self.height));
        ram + gpu
    }

    /// Installs `image` as the texture's contents, uploading if the type lives on the GPU.
    ///
    /// On failure the image comes back with the error so the caller can keep it.
    fn materialize(
        &mut self,
        image: Image,
        device: &mut dyn GpuDevice,
    ) -> Result<(), (LoadError, Image)> {
        if image.width == 0 || image.height == 0 {
            return Err((LoadError::Empty(image.width, image.height), image));
        }
        self.width = image.width;
        self.height = image.height;
        let image = image.converted(self.format);

        if self.ty.on_gpu() {
            match self.upload(&image, device) {
                Ok(gpu) => self.gpu = Some(gpu),
                Err(err) => return Err((err.into(), image)),
            }
        }
        if self.ty.keeps_ram_copy() {
            self.ram = Some(image);
        }
        Ok(())
    }

    fn upload(&self, image: &Image, device: &mut dyn GpuDevice) -> Result<GpuStorage, DeviceError> {
        let native = device.native_format(self.format);
        let desc = TextureDesc { width: self.width, height: self.height, format: native };
        let id = if native == self.format {
            device.create_texture(&desc, &image.data)?
        } else {
            device.create_texture(&desc, &convert(&image.view(), native))?
        };
        Ok(GpuStorage { id, format: native })
    }

    /// Releases storage. Returns whether the texture was loaded.
    pub(crate) fn unload(&mut self, device: &mut dyn GpuDevice) -> bool {
        let was_loaded = self.is_loaded();
        if let Some(gpu) = self.gpu.take() {
            device.release_texture(gpu.id);
        }
        self.ram = None;
        if was_loaded {
            log::debug!("texture {} unloaded", self.label());
        }
        was_loaded
    }

    /// Device reset: the handle died with the device. A RAM copy, if any, survives.
    pub(crate) fn invalidate_gpu_handle(&mut self) {
        self.gpu = None;
    }

    /// Idle bookkeeping for dynamic textures.
    ///
    /// The threshold is checked before the timer advances, so a texture unloads
    /// on the first update that finds it already past `threshold`.
    pub(crate) fn update(&mut self, dt: f32, threshold: f32, device: &mut dyn GpuDevice) {
        if !self.dynamic || !self.is_loaded() || threshold <= 0.0 {
            return;
        }
        if self.unused_time > threshold {
            self.unload(device);
        }
        self.unused_time += dt;
    }

    fn label(&self) -> String {
        match &self.filename {
            Some(name) => format!("'{name}'"),
            None => format!("#{} ({}x{})", self.id.get(), self.width, self.height),
        }
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    // ── pixel access (texture is loaded) ─────────────────────────────────

    /// Whole contents in the logical format.
    fn snapshot(&self, device: &mut dyn GpuDevice) -> Option<Image> {
        if let Some(ram) = &self.ram {
            return Some(ram.clone());
        }
        let gpu = self.gpu?;
        let bytes = device.read_texture(gpu.id)?;
        let native = Image::from_raw(self.width, self.height, gpu.format, bytes).ok()?;
        Some(native.converted(self.format))
    }

    fn get_pixel(&self, x: i32, y: i32, device: &mut dyn GpuDevice) -> Color {
        if !self.in_bounds(x, y) {
            return Color::CLEAR;
        }
        if let Some(ram) = &self.ram {
            return ram.get_pixel(x, y);
        }
        let Some(gpu) = self.gpu else {
            return Color::CLEAR;
        };
        device
            .read_texture(gpu.id)
            .map(|bytes| {
                let view = PixelView::new(&bytes, self.width, self.height, gpu.format);
                quantize(self.format, image::read_pixel(&view, x, y))
            })
            .unwrap_or(Color::CLEAR)
    }

    fn get_interpolated_pixel(&self, fx: f32, fy: f32, device: &mut dyn GpuDevice) -> Color {
        match &self.ram {
            Some(ram) => ram.get_interpolated_pixel(fx, fy),
            None => self
                .snapshot(device)
                .map_or(Color::CLEAR, |img| img.get_interpolated_pixel(fx, fy)),
        }
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Color, device: &mut dyn GpuDevice) {
        if !self.in_bounds(x, y) {
            return;
        }
        let color = quantize(self.format, color);
        if let Some(ram) = &mut self.ram {
            ram.set_pixel(x, y, color);
        }
        if let Some(gpu) = self.gpu {
            let mut px = [0u8; 4];
            image::encode_pixel(gpu.format, color, &mut px);
            let rect = PixelRect::new(x, y, 1, 1);
            if let Err(err) = device.update_texture(gpu.id, rect, &px[..gpu.format.bpp()]) {
                log::warn!("texture {}: pixel upload failed: {err}", self.label());
            }
        }
    }

    /// Writes a staging image (logical format, already clipped) at (`dx`, `dy`).
    fn write_staging(&mut self, staging: &Image, dx: i32, dy: i32, device: &mut dyn GpuDevice) {
        let whole = PixelRect::of_size(staging.width, staging.height);
        if let Some(ram) = &mut self.ram {
            write_rect(&staging.view(), whole, &mut ram.view_mut(), dx, dy);
        }
        if let Some(gpu) = self.gpu {
            let rect = PixelRect::new(dx, dy, whole.w, whole.h);
            let result = if gpu.format == staging.format {
                device.update_texture(gpu.id, rect, &staging.data)
            } else {
                device.update_texture(gpu.id, rect, &convert(&staging.view(), gpu.format))
            };
            if let Err(err) = result {
                log::warn!("texture {}: upload failed: {err}", self.label());
            }
        }
    }

    /// Copies `src_rect` of `src` to (`dx`, `dy`), converting through the logical format.
    fn write(
        &mut self,
        src: &PixelView<'_>,
        src_rect: PixelRect,
        dx: i32,
        dy: i32,
        device: &mut dyn GpuDevice,
    ) -> bool {
        let Some((sr, dx, dy)) = image::correct_copy_rects(
            src_rect, src.width, src.height, dx, dy, self.width, self.height,
        ) else {
            return false;
        };
        let mut staging = Image::filled(sr.w as u32, sr.h as u32, self.format, Color::CLEAR);
        if !write_rect(src, sr, &mut staging.view_mut(), 0, 0) {
            return false;
        }
        self.write_staging(&staging, dx, dy, device);
        true
    }

    fn fill_rect(&mut self, rect: PixelRect, color: Color, device: &mut dyn GpuDevice) -> bool {
        let Some(r) = image::correct_rect(rect, self.width, self.height) else {
            return false;
        };
        let staging = Image::filled(r.w as u32, r.h as u32, self.format, color);
        self.write_staging(&staging, r.x, r.y, device);
        true
    }

    fn blit(
        &mut self,
        src: &PixelView<'_>,
        src_rect: PixelRect,
        dx: i32,
        dy: i32,
        alpha: u8,
        device: &mut dyn GpuDevice,
    ) -> bool {
        let Some((sr, dx, dy)) = image::correct_copy_rects(
            src_rect, src.width, src.height, dx, dy, self.width, self.height,
        ) else {
            return false;
        };
        let Some(current) = self.snapshot(device) else {
            return false;
        };
        let mut staging = Image::filled(sr.w as u32, sr.h as u32, self.format, Color::CLEAR);
        let dst_rect = PixelRect::new(dx, dy, sr.w, sr.h);
        write_rect(&current.view(), dst_rect, &mut staging.view_mut(), 0, 0);
        image::blit(src, sr, &mut staging.view_mut(), 0, 0, alpha);
        self.write_staging(&staging, dx, dy, device);
        true
    }
}

/// Loads the texture behind `cell`.
///
/// `preloaded` skips the resource read when the caller already decoded the
/// file. A surviving RAM copy takes precedence over both the file and the fill
/// color, and is kept when the upload fails. Returns false when already loaded
/// or on failure.
pub(crate) fn load_cell(
    cell: &RefCell<TextureData>,
    shared: &RenderShared,
    preloaded: Option<Image>,
) -> bool {
    if cell.borrow().is_loaded() {
        return false;
    }

    let result = {
        let mut data = cell.borrow_mut();
        let from_ram = data.ram.is_some();
        source_image(&mut data, shared, preloaded).and_then(|img| {
            let mut device = shared.device.borrow_mut();
            data.materialize(img, device.as_mut()).map_err(|(err, img)| {
                if from_ram {
                    data.ram = Some(img);
                }
                err
            })
        })
    };

    let data = cell.borrow();
    match result {
        Ok(()) => {
            log::debug!("texture {} loaded ({:?})", data.label(), data.ty);
            let info = data.info();
            drop(data);
            shared.notify_texture_loaded(&info);
            true
        }
        Err(err) => {
            log::warn!("texture {}: load failed: {err}", data.label());
            false
        }
    }
}

fn source_image(
    data: &mut TextureData,
    shared: &RenderShared,
    preloaded: Option<Image>,
) -> Result<Image, LoadError> {
    if let Some(ram) = data.ram.take() {
        return Ok(ram);
    }
    if let Some(img) = preloaded {
        return Ok(img);
    }
    match &data.filename {
        Some(name) => {
            let bytes = shared.read_resource(name).map_err(ImageError::from)?;
            Ok(image::decode(&bytes)?)
        }
        None => Ok(Image::filled(data.width, data.height, data.format, data.fill)),
    }
}

/// A texture resource.
///
/// Owned exclusively by whoever created it; dropping it unregisters it from the
/// render system, severs its dynamic links and releases its storage. Textures
/// are `!Send`: they are created, used and dropped on the render thread.
///
/// Pixel accessors load the texture on demand and reset its idle timer (and
/// the timers of its dynamically linked textures).
pub struct Texture {
    pub(crate) inner: Rc<RefCell<TextureData>>,
    pub(crate) shared: Rc<RenderShared>,
    id: TextureId,
}

impl Texture {
    /// Registers `data` with the shared core and wraps it in an owning handle.
    pub(crate) fn register(shared: &Rc<RenderShared>, data: TextureData) -> Self {
        let id = data.id;
        let inner = Rc::new(RefCell::new(data));
        shared.textures.borrow_mut().register(id, &inner);
        Self { inner, shared: Rc::clone(shared), id }
    }

    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn info(&self) -> TextureInfo {
        self.inner.borrow().info()
    }

    pub fn filename(&self) -> Option<String> {
        self.inner.borrow().filename.clone()
    }

    pub fn width(&self) -> u32 {
        self.inner.borrow().width
    }

    pub fn height(&self) -> u32 {
        self.inner.borrow().height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.borrow().format
    }

    pub fn bpp(&self) -> usize {
        self.format().bpp()
    }

    /// Size of the pixel data in the logical format.
    pub fn byte_size(&self) -> usize {
        let d = self.inner.borrow();
        d.format.buffer_size(d.width, d.height)
    }

    /// Bytes currently held in RAM and on the GPU.
    pub fn memory_usage(&self) -> usize {
        self.inner.borrow().memory_usage()
    }

    pub fn ty(&self) -> TextureType {
        self.inner.borrow().ty
    }

    pub fn filter(&self) -> TextureFilter {
        self.inner.borrow().filter
    }

    pub fn set_filter(&self, filter: TextureFilter) {
        self.inner.borrow_mut().filter = filter;
    }

    pub fn address_mode(&self) -> TextureAddressMode {
        self.inner.borrow().address_mode
    }

    pub fn set_address_mode(&self, mode: TextureAddressMode) {
        self.inner.borrow_mut().address_mode = mode;
    }

    pub fn is_dynamic(&self) -> bool {
        self.inner.borrow().dynamic
    }

    pub fn set_dynamic(&self, dynamic: bool) {
        self.inner.borrow_mut().dynamic = dynamic;
    }

    /// Seconds since the texture was last used.
    pub fn unused_time(&self) -> f32 {
        self.inner.borrow().unused_time
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.borrow().is_loaded()
    }

    /// Loads the texture. False if it already was loaded or loading failed.
    pub fn load(&self) -> bool {
        load_cell(&self.inner, &self.shared, None)
    }

    pub(crate) fn load_with(&self, image: Image) -> bool {
        load_cell(&self.inner, &self.shared, Some(image))
    }

    /// Releases GPU and RAM storage, keeping metadata. Safe to call repeatedly.
    pub fn unload(&self) -> bool {
        let mut device = self.shared.device.borrow_mut();
        self.inner.borrow_mut().unload(device.as_mut())
    }

    /// Advances the idle timer; see [`RenderSystem::update`](crate::render::RenderSystem::update).
    pub fn update(&self, dt: f32) {
        let threshold = self.shared.idle_unload_time.get();
        let mut device = self.shared.device.borrow_mut();
        self.inner.borrow_mut().update(dt, threshold, device.as_mut());
    }

    /// Zeroes the idle timer; `recursive` also zeroes the timers of linked textures.
    pub fn reset_unused_timer(&self, recursive: bool) {
        self.shared.textures.borrow().reset_unused_timer(self.id, recursive);
    }

    // ── dynamic links ────────────────────────────────────────────────────

    fn same_system(&self, other: &Texture) -> bool {
        let same = Rc::ptr_eq(&self.shared, &other.shared);
        if !same {
            log::warn!("cannot link textures owned by different render systems");
        }
        same
    }

    /// Links both textures so using either keeps the other alive.
    pub fn add_dynamic_link(&self, other: &Texture) -> bool {
        self.same_system(other) && self.shared.textures.borrow_mut().link(self.id, other.id)
    }

    pub fn remove_dynamic_link(&self, other: &Texture) -> bool {
        self.same_system(other) && self.shared.textures.borrow_mut().unlink(self.id, other.id)
    }

    pub fn is_linked_with(&self, other: &Texture) -> bool {
        self.shared.textures.borrow().is_linked(self.id, other.id)
    }

    pub fn dynamic_links(&self) -> Vec<TextureId> {
        self.shared.textures.borrow().links_of(self.id)
    }

    // ── pixel access ─────────────────────────────────────────────────────

    /// Loads if needed and resets idle timers. False when the texture cannot load.
    fn touch(&self) -> bool {
        if !self.is_loaded() && !self.load() {
            return false;
        }
        self.reset_unused_timer(true);
        true
    }

    fn with_data<R>(&self, f: impl FnOnce(&mut TextureData, &mut dyn GpuDevice) -> R) -> R {
        let mut device = self.shared.device.borrow_mut();
        f(&mut *self.inner.borrow_mut(), device.as_mut())
    }

    /// Out of bounds, or a texture that fails to load, reads as `Color::CLEAR`.
    pub fn get_pixel(&self, x: i32, y: i32) -> Color {
        if !self.touch() {
            return Color::CLEAR;
        }
        self.with_data(|d, dev| d.get_pixel(x, y, dev))
    }

    pub fn set_pixel(&self, x: i32, y: i32, color: Color) {
        if self.touch() {
            self.with_data(|d, dev| d.set_pixel(x, y, color, dev));
        }
    }

    /// Bilinear sample at fractional pixel coordinates.
    pub fn get_interpolated_pixel(&self, fx: f32, fy: f32) -> Color {
        if !self.touch() {
            return Color::CLEAR;
        }
        self.with_data(|d, dev| d.get_interpolated_pixel(fx, fy, dev))
    }

    pub fn fill_rect(&self, rect: PixelRect, color: Color) -> bool {
        self.touch() && self.with_data(|d, dev| d.fill_rect(rect, color, dev))
    }

    /// Fills the whole texture with `Color::CLEAR`.
    pub fn clear(&self) -> bool {
        let rect = PixelRect::of_size(self.width(), self.height());
        self.fill_rect(rect, Color::CLEAR)
    }

    /// Copies `src_rect` of a raw pixel buffer to (`dx`, `dy`), converting formats.
    pub fn write(&self, src: &PixelView<'_>, src_rect: PixelRect, dx: i32, dy: i32) -> bool {
        self.touch() && self.with_data(|d, dev| d.write(src, src_rect, dx, dy, dev))
    }

    /// Copies `src_rect` of `source` to (`dx`, `dy`).
    pub fn write_texture(&self, source: &Texture, src_rect: PixelRect, dx: i32, dy: i32) -> bool {
        let Some(img) = source.to_image() else {
            return false;
        };
        self.write(&img.view(), src_rect, dx, dy)
    }

    /// Alpha-blends `src_rect` of a raw pixel buffer over (`dx`, `dy`).
    pub fn blit(
        &self,
        src: &PixelView<'_>,
        src_rect: PixelRect,
        dx: i32,
        dy: i32,
        alpha: u8,
    ) -> bool {
        self.touch() && self.with_data(|d, dev| d.blit(src, src_rect, dx, dy, alpha, dev))
    }

    pub fn blit_texture(
        &self,
        source: &Texture,
        src_rect: PixelRect,
        dx: i32,
        dy: i32,
        alpha: u8,
    ) -> bool {
        let Some(img) = source.to_image() else {
            return false;
        };
        self.blit(&img.view(), src_rect, dx, dy, alpha)
    }

    /// Copy of the contents in the logical format.
    pub fn to_image(&self) -> Option<Image> {
        if !self.touch() {
            return None;
        }
        self.with_data(|d, dev| d.snapshot(dev))
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("data", &self.inner.borrow())
            .finish()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Ok(mut textures) = self.shared.textures.try_borrow_mut() {
            textures.unregister(self.id);
        }
        if let (Ok(mut data), Ok(mut device)) =
            (self.inner.try_borrow_mut(), self.shared.device.try_borrow_mut())
        {
            data.unload(device.as_mut());
        }
    }
}
