//! Render system.
//!
//! `RenderSystem` owns the backend device, caches the state bound on it and
//! tracks every texture and shader it creates.
//!
//! Convention:
//! - 2D geometry is in pixels (top-left origin, +Y down) under `set_ortho_projection`.
//! - Transforms post-multiply: `translate` then `rotate` rotates around the translated origin.

mod ops;
mod resources;
mod shared;
mod state;
mod system;

pub use ops::{BlendMode, ColorMode, RenderOp, RenderOptions};
pub use resources::{find_texture_filename, FileSystemResources, MemoryResources, ResourceProvider};
pub use shared::RenderSystemConfig;
pub use system::RenderSystem;

pub(crate) use shared::RenderShared;

use crate::device::DeviceError;

/// Render-system failures. Per-resource failures are not errors here; they
/// surface as `None`/`false` plus a log line.
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("render system is not created")]
    NotCreated,
}
