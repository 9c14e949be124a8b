use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::coords::{Mat4, Rect};
use crate::device::{GpuShaderId, GpuTextureId};
use crate::texture::{TextureAddressMode, TextureData, TextureFilter};

use super::{BlendMode, ColorMode};

/// Last value pushed to the device. Unknown until the first push.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Tracked<T> {
    value: Option<T>,
}

impl<T> Default for Tracked<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: Copy + PartialEq> Tracked<T> {
    #[inline]
    pub(crate) fn get(&self) -> Option<T> {
        self.value
    }

    /// Records `value`. True when it differs from the cached value, i.e. the
    /// caller must issue the backend call.
    #[inline]
    pub(crate) fn update(&mut self, value: T) -> bool {
        if self.value == Some(value) {
            return false;
        }
        self.value = Some(value);
        true
    }

    #[inline]
    pub(crate) fn invalidate(&mut self) {
        self.value = None;
    }
}

/// Mirror of what is bound on the device.
///
/// Setters on the render system diff against these cells and only talk to
/// the device on change. Matrices are not diffed; they are pushed on every
/// mutation.
#[derive(Debug)]
pub(crate) struct RenderState {
    pub texture: Tracked<Option<GpuTextureId>>,
    /// Texture the user bound last, so draws can reload it after an unload or reset.
    pub active_texture: Option<Weak<RefCell<TextureData>>>,
    pub filter: Tracked<TextureFilter>,
    pub address_mode: Tracked<TextureAddressMode>,
    pub blend_mode: Tracked<BlendMode>,
    pub color_mode: Tracked<(ColorMode, f32)>,
    pub viewport: Tracked<Rect>,
    pub depth_buffer: Tracked<bool>,
    pub vertex_shader: Tracked<Option<GpuShaderId>>,
    pub pixel_shader: Tracked<Option<GpuShaderId>>,
    pub modelview: Mat4,
    pub projection: Mat4,
    pub transform_stack: Vec<Mat4>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            texture: Tracked::default(),
            active_texture: None,
            filter: Tracked::default(),
            address_mode: Tracked::default(),
            blend_mode: Tracked::default(),
            color_mode: Tracked::default(),
            viewport: Tracked::default(),
            depth_buffer: Tracked::default(),
            vertex_shader: Tracked::default(),
            pixel_shader: Tracked::default(),
            modelview: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            transform_stack: Vec::new(),
        }
    }
}

impl RenderState {
    /// Device state is unknown (after create or reset). Matrices and the
    /// active texture are kept so they can be re-applied.
    pub(crate) fn invalidate(&mut self) {
        self.texture.invalidate();
        self.filter.invalidate();
        self.address_mode.invalidate();
        self.blend_mode.invalidate();
        self.color_mode.invalidate();
        self.viewport.invalidate();
        self.depth_buffer.invalidate();
        self.vertex_shader.invalidate();
        self.pixel_shader.invalidate();
    }

    pub(crate) fn active_texture(&self) -> Option<Rc<RefCell<TextureData>>> {
        self.active_texture.as_ref().and_then(Weak::upgrade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_reports_changes_only() {
        let mut t = Tracked::<BlendMode>::default();
        assert_eq!(t.get(), None);
        assert!(t.update(BlendMode::Add));
        assert!(!t.update(BlendMode::Add));
        assert!(t.update(BlendMode::Alpha));
        t.invalidate();
        assert!(t.update(BlendMode::Alpha), "unknown state always pushes");
    }

    #[test]
    fn invalidate_keeps_matrices() {
        let mut s = RenderState::default();
        s.modelview = Mat4::from_scale(glam::Vec3::splat(2.0));
        s.blend_mode.update(BlendMode::Add);
        s.invalidate();
        assert_eq!(s.blend_mode.get(), None);
        assert_eq!(s.modelview, Mat4::from_scale(glam::Vec3::splat(2.0)));
    }
}
