//! Platform event translation. One submodule per platform layer.

pub(crate) mod winit;
