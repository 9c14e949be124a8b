//! Texture resources.
//!
//! A [`Texture`] is owned by whoever created it. The render system keeps a
//! weak registry of every live texture in a [`TextureManager`] for bulk
//! operations (unload-all, idle updates, device reset) together with the
//! dynamic-link graph between textures.

mod manager;
#[allow(clippy::module_inception)]
mod texture;
mod types;

pub use manager::TextureManager;
pub use texture::{Texture, TextureInfo};
pub use types::{LoadMode, TextureAddressMode, TextureFilter, TextureId, TextureType};

pub(crate) use texture::{load_cell, TextureData};
