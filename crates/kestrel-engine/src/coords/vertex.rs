use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use super::Color;

/// Layout tag carried alongside raw vertex bytes so backends can pick a pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Plain,
    Colored,
    Textured,
    ColoredTextured,
}

impl VertexFormat {
    #[inline]
    pub fn stride(self) -> usize {
        match self {
            VertexFormat::Plain => std::mem::size_of::<PlainVertex>(),
            VertexFormat::Colored => std::mem::size_of::<ColoredVertex>(),
            VertexFormat::Textured => std::mem::size_of::<TexturedVertex>(),
            VertexFormat::ColoredTextured => std::mem::size_of::<ColoredTexturedVertex>(),
        }
    }

    #[inline]
    pub fn has_color(self) -> bool {
        matches!(self, VertexFormat::Colored | VertexFormat::ColoredTextured)
    }

    #[inline]
    pub fn has_uv(self) -> bool {
        matches!(self, VertexFormat::Textured | VertexFormat::ColoredTextured)
    }
}

/// Implemented by every vertex record accepted by `RenderSystem::render`.
pub trait Vertex: Pod {
    const FORMAT: VertexFormat;
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct PlainVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl PlainVertex {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    #[inline]
    pub fn position(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

impl From<Vec2> for PlainVertex {
    fn from(p: Vec2) -> Self {
        Self::new(p.x, p.y)
    }
}

impl From<Vec3> for PlainVertex {
    fn from(p: Vec3) -> Self {
        Self { x: p.x, y: p.y, z: p.z }
    }
}

/// `color` holds RGBA bytes in memory order (see [`Color::to_packed_rgba`]).
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct ColoredVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub color: u32,
}

impl ColoredVertex {
    #[inline]
    pub const fn new(x: f32, y: f32, color: Color) -> Self {
        Self { x, y, z: 0.0, color: color.to_packed_rgba() }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u: f32,
    pub v: f32,
}

impl TexturedVertex {
    #[inline]
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self { x, y, z: 0.0, u, v }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct ColoredTexturedVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub color: u32,
    pub u: f32,
    pub v: f32,
}

impl ColoredTexturedVertex {
    #[inline]
    pub const fn new(x: f32, y: f32, color: Color, u: f32, v: f32) -> Self {
        Self { x, y, z: 0.0, color: color.to_packed_rgba(), u, v }
    }
}

impl Vertex for PlainVertex {
    const FORMAT: VertexFormat = VertexFormat::Plain;
}

impl Vertex for ColoredVertex {
    const FORMAT: VertexFormat = VertexFormat::Colored;
}

impl Vertex for TexturedVertex {
    const FORMAT: VertexFormat = VertexFormat::Textured;
}

impl Vertex for ColoredTexturedVertex {
    const FORMAT: VertexFormat = VertexFormat::ColoredTextured;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_match_field_layout() {
        assert_eq!(VertexFormat::Plain.stride(), 12);
        assert_eq!(VertexFormat::Colored.stride(), 16);
        assert_eq!(VertexFormat::Textured.stride(), 20);
        assert_eq!(VertexFormat::ColoredTextured.stride(), 24);
    }

    #[test]
    fn colored_vertex_packs_rgba_bytes() {
        let v = ColoredVertex::new(1.0, 2.0, Color::new(1, 2, 3, 4));
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(&bytes[12..16], &[1, 2, 3, 4]);
    }
}
