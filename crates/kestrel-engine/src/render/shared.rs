use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::device::GpuDevice;
use crate::shader::ShaderRegistry;
use crate::texture::{TextureInfo, TextureManager};

use super::{RenderOptions, ResourceProvider};

/// Render system settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSystemConfig {
    /// Extensions probed by texture-name resolution, in order, including the dot.
    pub texture_extensions: Vec<String>,
    /// Seconds a dynamic texture may stay unused before it unloads. 0 disables.
    pub idle_texture_unload_time: f32,
    pub options: RenderOptions,
}

impl Default for RenderSystemConfig {
    fn default() -> Self {
        Self {
            texture_extensions: vec![".png".into(), ".jpg".into(), ".jpeg".into()],
            idle_texture_unload_time: 0.0,
            options: RenderOptions::default(),
        }
    }
}

pub(crate) type LoadingListener = Rc<dyn Fn(&TextureInfo)>;

/// State shared between the render system and the resources it creates.
///
/// Textures and shaders hold an `Rc` to this so they can reach the device on
/// load, unload and drop. Everything lives on the render thread; no borrow is
/// held across a user callback.
pub(crate) struct RenderShared {
    pub(crate) device: RefCell<Box<dyn GpuDevice>>,
    pub(crate) textures: RefCell<TextureManager>,
    pub(crate) shaders: RefCell<ShaderRegistry>,
    pub(crate) resources: RefCell<Rc<dyn ResourceProvider>>,
    pub(crate) created: Cell<bool>,
    pub(crate) idle_unload_time: Cell<f32>,
    pub(crate) texture_extensions: RefCell<Vec<String>>,
    pub(crate) loading_listener: RefCell<Option<LoadingListener>>,
}

impl RenderShared {
    pub(crate) fn new(
        device: Box<dyn GpuDevice>,
        config: &RenderSystemConfig,
        resources: Rc<dyn ResourceProvider>,
    ) -> Self {
        Self {
            device: RefCell::new(device),
            textures: RefCell::new(TextureManager::new()),
            shaders: RefCell::new(ShaderRegistry::default()),
            resources: RefCell::new(resources),
            created: Cell::new(false),
            idle_unload_time: Cell::new(config.idle_texture_unload_time),
            texture_extensions: RefCell::new(config.texture_extensions.clone()),
            loading_listener: RefCell::new(None),
        }
    }

    pub(crate) fn resources(&self) -> Rc<dyn ResourceProvider> {
        Rc::clone(&self.resources.borrow())
    }

    pub(crate) fn read_resource(&self, name: &str) -> io::Result<Vec<u8>> {
        self.resources().read(name)
    }

    pub(crate) fn notify_texture_loaded(&self, info: &TextureInfo) {
        let listener = self.loading_listener.borrow().clone();
        if let Some(listener) = listener {
            listener(info);
        }
    }
}
