//! Engine configuration.
//!
//! Every section has a `Default`; missing keys in a TOML file fall back to it.
//!
//! ```toml
//! [render]
//! texture_extensions = [".png", ".jpg"]
//! idle_texture_unload_time = 30.0
//!
//! [window]
//! title = "demo"
//! max_frame_delta = 0.2
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::render::RenderSystemConfig;
use crate::window::WindowConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub render: RenderSystemConfig,
    pub window: WindowConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
