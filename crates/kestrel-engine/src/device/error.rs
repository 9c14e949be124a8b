/// Backend device failures.
///
/// Creation failures are fatal and surface from `RenderSystem::create`; the
/// per-resource variants are handled where the resource is loaded.
#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("device creation failed: {0}")]
    Creation(String),

    #[error("device has not been created")]
    NotCreated,

    #[error("texture creation failed: {0}")]
    TextureCreation(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),

    #[error("unsupported by {backend}: {what}")]
    Unsupported { backend: &'static str, what: String },

    #[error("presentation surface lost")]
    SurfaceLost,
}

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}
