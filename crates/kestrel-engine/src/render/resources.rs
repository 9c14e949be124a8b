use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Source of texture and shader bytes.
///
/// Names are `/`-separated and relative to whatever root the provider uses.
pub trait ResourceProvider {
    fn exists(&self, name: &str) -> bool;
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// Reads resources from the local filesystem relative to a base directory.
#[derive(Debug, Clone)]
pub struct FileSystemResources {
    base_path: PathBuf,
}

impl FileSystemResources {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self { base_path: base_path.as_ref().to_path_buf() }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl Default for FileSystemResources {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ResourceProvider for FileSystemResources {
    fn exists(&self, name: &str) -> bool {
        !name.is_empty() && self.base_path.join(name).is_file()
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.base_path.join(name))
    }
}

/// In-memory resources, for tests and embedded assets.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), bytes.into());
    }

    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl ResourceProvider for MemoryResources {
    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no resource '{name}'")))
    }
}

/// Resolves a texture name against `resources`.
///
/// Order: the exact name, then `name + ext` for each extension, then the name
/// with its own extension stripped plus each extension. Empty when nothing exists.
pub fn find_texture_filename(
    resources: &dyn ResourceProvider,
    extensions: &[String],
    name: &str,
) -> String {
    if name.is_empty() {
        return String::new();
    }
    if resources.exists(name) {
        return name.to_owned();
    }
    let probe = |base: &str| {
        extensions
            .iter()
            .map(|ext| format!("{base}{ext}"))
            .find(|candidate| resources.exists(candidate))
    };
    if let Some(found) = probe(name) {
        return found;
    }
    strip_extension(name).and_then(probe).unwrap_or_default()
}

/// `dir/file.png` → `dir/file`. `None` when the last path segment has no extension.
fn strip_extension(name: &str) -> Option<&str> {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    let dot = name[file_start..].rfind('.')?;
    (dot > 0).then(|| &name[..file_start + dot])
}
