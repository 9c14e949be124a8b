//! Kestrel engine crate.
//!
//! Render system, texture lifecycle and window event pipeline over a
//! swappable backend device (`wgpu`, or headless for tests and tooling).
//!
//! Threading: the render system, textures, shaders and windows are `!Send`
//! and live on one logic thread. Only [`window::EventSender`] crosses threads.

pub mod config;
pub mod coords;
pub mod device;
pub mod image;
pub mod input;
pub mod logging;
pub mod render;
pub mod shader;
pub mod texture;
pub mod time;
pub mod window;

pub use config::{ConfigError, EngineConfig};
pub use render::{RenderError, RenderSystem, RenderSystemConfig};
pub use texture::{Texture, TextureType};
pub use window::{Window, WindowConfig};
