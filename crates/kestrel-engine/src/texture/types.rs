use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Storage policy of a texture.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureType {
    /// GPU only. Pixel reads go through a device readback.
    #[default]
    Immutable,
    /// GPU plus a RAM copy used for pixel access and restore after device reset.
    Managed,
    /// RAM only; never uploaded.
    Ram,
}

impl TextureType {
    #[inline]
    pub fn on_gpu(self) -> bool {
        !matches!(self, TextureType::Ram)
    }

    #[inline]
    pub fn keeps_ram_copy(self) -> bool {
        !matches!(self, TextureType::Immutable)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureAddressMode {
    Wrap,
    #[default]
    Clamp,
}

/// When a texture created from a resource is materialised.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum LoadMode {
    /// Decode and upload right away.
    #[default]
    Immediate,
    /// Defer until first use; the texture becomes dynamic (idle-unloadable).
    OnDemand,
}

/// Process-unique texture identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TextureId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}
