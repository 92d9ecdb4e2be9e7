//! Engine configuration.
//!
//! Loaded once at startup from a `.json` or `.ron` file, or built in code
//! from [`EngineConfig::default`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which native API the wgpu backend should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicsApi {
    /// Vulkan, Metal, DX12 or browser WebGPU, whichever the platform offers.
    #[default]
    Primary,
    Vulkan,
    OpenGl,
}

impl GraphicsApi {
    pub fn backends(self) -> wgpu::Backends {
        match self {
            GraphicsApi::Primary => wgpu::Backends::PRIMARY,
            GraphicsApi::Vulkan => wgpu::Backends::VULKAN,
            GraphicsApi::OpenGl => wgpu::Backends::GL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the default framebuffer, and of render targets declared
    /// without an explicit size.
    pub window_size: [u32; 2],
    /// Name of the asset directory searched for from the working directory.
    pub asset_dir_name: String,
    /// How many ancestor directories the asset search may climb.
    pub search_depth: usize,
    /// Skips the search entirely when set.
    pub asset_root: Option<PathBuf>,
    /// Defaults to `<asset root>/cache`.
    pub cache_dir: Option<PathBuf>,
    pub graphics_api: GraphicsApi,
    pub clear_color: [f64; 4],
    /// `env_logger` filter applied by [`EngineConfig::init_logging`] unless
    /// `RUST_LOG` is set.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: [1280, 720],
            asset_dir_name: "asset".to_string(),
            search_depth: 4,
            asset_root: None,
            cache_dir: None,
            graphics_api: GraphicsApi::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Installs `env_logger` with [`log_filter`](EngineConfig::log_filter).
    pub fn init_logging(&self) {
        crate::diagnostics::init_logger(&self.log_filter);
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}
