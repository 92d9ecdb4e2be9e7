//! frame-ngin
//!
//! A level-driven real-time renderer. A level is described declaratively
//! (textures, programs, materials, meshes, scene nodes), built into an
//! entity registry, uploaded to a graphics backend and rendered as an
//! ordered chain of passes where each program may write textures that later
//! programs sample.
//!
//! High-level modules
//! - `level`: the entity registry, its description format and the builder
//! - `resources`: image, mesh and shader loading
//! - `cache`: metadata-validated disk cache for decoded assets
//! - `scene_graph`: node transforms and traversal
//! - `backend`: the `Device` trait, the wgpu device and a recording device
//! - `render`: the frame loop
//! - `plugin`: per-frame hooks
//! - `config`, `diagnostics`, `file`: configuration, logging and asset paths
//!
//! ```no_run
//! use frame_ngin::{
//!     backend::gpu::WgpuDevice, config::EngineConfig, diagnostics::Logger, file::AssetPaths,
//!     level::builder::LevelBuilder, render::Renderer, resources::AssetLoader,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! config.init_logging();
//! let loader = AssetLoader::new(AssetPaths::discover(&config)?, Logger::default());
//! let device = WgpuDevice::headless(&config)?;
//! let builder = LevelBuilder::new(&loader, "wgsl", config.window_size);
//! let level = builder.build_file("level/simple.json")?;
//!
//! let mut renderer = Renderer::new(device, Logger::default()).with_config(&config);
//! renderer.load_level(level)?;
//! renderer.run_frame(1.0 / 60.0)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod camera;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod file;
pub mod level;
pub mod light;
pub mod plugin;
pub mod render;
pub mod resources;
pub mod scene_graph;
pub mod uniform;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use winit::dpi::PhysicalSize;
