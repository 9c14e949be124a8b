use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive topology of a draw call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderOp {
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineList,
    LineStrip,
    PointList,
}

impl RenderOp {
    /// Smallest vertex count that produces at least one primitive.
    #[inline]
    pub fn min_vertices(self) -> usize {
        match self {
            RenderOp::TriangleList | RenderOp::TriangleStrip | RenderOp::TriangleFan => 3,
            RenderOp::LineList | RenderOp::LineStrip => 2,
            RenderOp::PointList => 1,
        }
    }
}

/// Framebuffer blending.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Alpha,
    Add,
    Subtract,
    /// Source replaces destination, alpha included.
    Overwrite,
}

/// How the vertex/uniform color combines with the texture sample.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMode {
    #[default]
    Multiply,
    /// Texture provides alpha only; color comes from the vertex.
    AlphaMap,
    /// Texture color is interpolated towards the vertex color by the mode factor.
    Lerp,
}

/// Options applied when the render system creates its device.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub depth_buffer: bool,
}

impl fmt::Display for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.depth_buffer {
            f.write_str("depth-buffer")
        } else {
            f.write_str("none")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_display() {
        assert_eq!(RenderOptions::default().to_string(), "none");
        assert_eq!(RenderOptions { depth_buffer: true }.to_string(), "depth-buffer");
    }

    #[test]
    fn minimum_vertex_counts() {
        assert_eq!(RenderOp::TriangleFan.min_vertices(), 3);
        assert_eq!(RenderOp::LineStrip.min_vertices(), 2);
        assert_eq!(RenderOp::PointList.min_vertices(), 1);
    }
}
