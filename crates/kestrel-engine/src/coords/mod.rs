//! Value types shared by every draw call.
//!
//! Canonical CPU space:
//! - Pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Vectors and matrices come from `glam` and are re-exported here.

mod color;
mod rect;
mod vertex;

pub use color::Color;
pub use rect::Rect;
pub use vertex::{
    ColoredTexturedVertex, ColoredVertex, PlainVertex, TexturedVertex, Vertex, VertexFormat,
};

pub use glam::{Mat4, Vec2, Vec3};
