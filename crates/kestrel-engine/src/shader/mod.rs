//! Shader resources.
//!
//! A [`Shader`] keeps the source (or binary) it was loaded from, so after a
//! device reset it recompiles the next time it is bound.

mod types;

pub use types::{ShaderId, ShaderSource, ShaderStage};

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::device::{DeviceError, GpuDevice, GpuShaderId};
use crate::render::RenderShared;

#[derive(Debug, Clone)]
enum StoredSource {
    Text(String),
    Binary(Vec<u8>),
}

impl StoredSource {
    fn as_source(&self) -> ShaderSource<'_> {
        match self {
            StoredSource::Text(text) => ShaderSource::Source(text),
            StoredSource::Binary(bytes) => ShaderSource::Binary(bytes),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ShaderData {
    stage: ShaderStage,
    name: Option<String>,
    source: Option<StoredSource>,
    gpu: Option<GpuShaderId>,
}

impl ShaderData {
    fn compile(&mut self, device: &mut dyn GpuDevice) -> Result<Option<GpuShaderId>, DeviceError> {
        if self.gpu.is_some() {
            return Ok(self.gpu);
        }
        let Some(source) = &self.source else {
            return Ok(None);
        };
        let id = device.create_shader(self.stage, source.as_source())?;
        self.gpu = Some(id);
        Ok(self.gpu)
    }

    fn release(&mut self, device: &mut dyn GpuDevice) {
        if let Some(id) = self.gpu.take() {
            device.release_shader(id);
        }
    }
}

/// Weak registry of live shaders.
#[derive(Debug, Default)]
pub(crate) struct ShaderRegistry {
    entries: HashMap<ShaderId, Weak<RefCell<ShaderData>>>,
}

impl ShaderRegistry {
    fn live(&self) -> impl Iterator<Item = Rc<RefCell<ShaderData>>> + '_ {
        self.entries.values().filter_map(Weak::upgrade)
    }

    pub(crate) fn count(&self) -> usize {
        self.entries.len()
    }

    /// Releases every backend handle. Sources stay so shaders can recompile.
    pub(crate) fn release_all(&self, device: &mut dyn GpuDevice) {
        for shader in self.live() {
            shader.borrow_mut().release(device);
        }
    }

    pub(crate) fn invalidate_all(&self) {
        for shader in self.live() {
            shader.borrow_mut().gpu = None;
        }
    }
}

/// A vertex or pixel shader.
///
/// Dropping it releases its backend handle. Like textures, shaders are
/// `!Send` and live on the render thread.
pub struct Shader {
    inner: Rc<RefCell<ShaderData>>,
    shared: Rc<RenderShared>,
    id: ShaderId,
}

impl Shader {
    pub(crate) fn register(shared: &Rc<RenderShared>, stage: ShaderStage) -> Self {
        let id = ShaderId::next();
        let inner = Rc::new(RefCell::new(ShaderData { stage, name: None, source: None, gpu: None }));
        shared.shaders.borrow_mut().entries.insert(id, Rc::downgrade(&inner));
        Self { inner, shared: Rc::clone(shared), id }
    }

    #[inline]
    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.inner.borrow().stage
    }

    /// Resource name the shader was loaded from, if any.
    pub fn name(&self) -> Option<String> {
        self.inner.borrow().name.clone()
    }

    /// Whether a backend handle currently exists.
    pub fn is_loaded(&self) -> bool {
        self.inner.borrow().gpu.is_some()
    }

    /// Whether there is something to compile (possibly not compiled yet).
    pub fn has_source(&self) -> bool {
        self.inner.borrow().source.is_some()
    }

    /// Loads a shader resource. Valid UTF-8 is treated as source text,
    /// anything else as a precompiled binary.
    pub fn load_resource(&self, name: &str) -> bool {
        let bytes = match self.shared.read_resource(name) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("shader '{name}': {err}");
                return false;
            }
        };
        let source = match String::from_utf8(bytes) {
            Ok(text) => StoredSource::Text(text),
            Err(err) => StoredSource::Binary(err.into_bytes()),
        };
        self.install(Some(name.to_owned()), source)
    }

    pub fn load_source(&self, source: &str) -> bool {
        self.install(None, StoredSource::Text(source.to_owned()))
    }

    pub fn load_binary(&self, binary: &[u8]) -> bool {
        self.install(None, StoredSource::Binary(binary.to_vec()))
    }

    fn install(&self, name: Option<String>, source: StoredSource) -> bool {
        let mut data = self.inner.borrow_mut();
        if data.source.is_some() {
            log::warn!("shader {:?} already loaded", data.name.as_deref().unwrap_or("<inline>"));
            return false;
        }
        data.name = name;
        data.source = Some(source);
        if !self.shared.created.get() {
            // compiled on first bind
            return true;
        }

        let mut device = self.shared.device.borrow_mut();
        match data.compile(device.as_mut()) {
            Ok(_) => true,
            Err(err) => {
                log::warn!(
                    "shader {:?} failed to compile: {err}",
                    data.name.as_deref().unwrap_or("<inline>")
                );
                data.name = None;
                data.source = None;
                false
            }
        }
    }

    /// Releases the backend handle and forgets the source.
    pub fn unload(&self) -> bool {
        let mut data = self.inner.borrow_mut();
        let had_source = data.source.take().is_some();
        data.name = None;
        let mut device = self.shared.device.borrow_mut();
        data.release(device.as_mut());
        had_source
    }

    /// Backend handle, compiling from the kept source if a reset dropped it.
    pub(crate) fn ensure_compiled(&self) -> Option<GpuShaderId> {
        let mut data = self.inner.borrow_mut();
        let mut device = self.shared.device.borrow_mut();
        match data.compile(device.as_mut()) {
            Ok(id) => id,
            Err(err) => {
                log::warn!("shader recompilation failed: {err}");
                None
            }
        }
    }

    pub(crate) fn belongs_to(&self, shared: &Rc<RenderShared>) -> bool {
        Rc::ptr_eq(&self.shared, shared)
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("data", &self.inner.borrow())
            .finish()
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if let Ok(mut shaders) = self.shared.shaders.try_borrow_mut() {
            shaders.entries.remove(&self.id);
        }
        if let (Ok(mut data), Ok(mut device)) =
            (self.inner.try_borrow_mut(), self.shared.device.try_borrow_mut())
        {
            data.release(device.as_mut());
        }
    }
}
