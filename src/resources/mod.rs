//! Loading of external files: images, meshes and shader sources.
//!
//! Images and meshes go through the disk cache: an exact cache hit first,
//! then a relaxed one, then a full decode that is written back to the cache.

use std::path::Path;

use anyhow::{Context, bail};

use crate::{
    cache::{ArtifactCache, CacheArtifact, CacheMetadata},
    diagnostics::Logger,
    file::{self, AssetPaths},
    level::TextureFormat,
};

pub mod mesh;
pub mod texture;

use mesh::MeshData;
use texture::ImageData;

/// Shader stages of one program as read from disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
    pub geometry: Option<String>,
}

#[derive(Debug)]
pub struct AssetLoader {
    paths: AssetPaths,
    images: ArtifactCache<ImageData>,
    meshes: ArtifactCache<MeshData>,
    logger: Logger,
}

impl AssetLoader {
    pub fn new(paths: AssetPaths, logger: Logger) -> Self {
        let cache_logger = logger.with_target("frame_ngin::cache");
        Self {
            images: ArtifactCache::new(paths.cache_dir(), cache_logger.clone()),
            meshes: ArtifactCache::new(paths.cache_dir(), cache_logger),
            paths,
            logger,
        }
    }

    pub fn paths(&self) -> &AssetPaths {
        &self.paths
    }

    pub fn image_cache(&self) -> &ArtifactCache<ImageData> {
        &self.images
    }

    pub fn mesh_cache(&self) -> &ArtifactCache<MeshData> {
        &self.meshes
    }

    fn load_cached<A: CacheArtifact>(
        &self,
        cache: &ArtifactCache<A>,
        file_name: &str,
        params: &A::Params,
        parse: impl FnOnce(&Path) -> anyhow::Result<A>,
    ) -> anyhow::Result<A> {
        let path = self.paths.resolve(file_name);
        let relative = self.paths.relative(&path);
        if !path.is_file() {
            // Only the cache may be shipped.
            if let Some(artifact) = cache.load_relaxed(&relative, params, None) {
                self.logger
                    .debug(format!("{} loaded from cache without its source", relative));
                return Ok(artifact);
            }
            bail!("could not find {}", path.display());
        }

        let metadata = CacheMetadata::from_file(&self.paths, &path)?;
        if let Some(artifact) = cache.load(&metadata, params) {
            self.logger.debug(format!("{} loaded from cache", relative));
            return Ok(artifact);
        }
        if let Some(artifact) = cache.load_relaxed(&relative, params, Some(&metadata)) {
            self.logger
                .debug(format!("{} loaded from cache (relaxed)", relative));
            return Ok(artifact);
        }

        self.logger.info(format!("decoding {}", relative));
        let artifact = parse(&path)?;
        cache.save(&metadata, params, &artifact);
        Ok(artifact)
    }

    /// Loads an image relative to the asset root, converted to `format`.
    pub fn load_image(&self, file_name: &str, format: TextureFormat) -> anyhow::Result<ImageData> {
        self.load_cached(&self.images, file_name, &format, |path| {
            let bytes = file::load_binary(path)?;
            ImageData::from_bytes(&bytes, format, file_name)
        })
    }

    /// Loads six faces (+x, -x, +y, -y, +z, -z) into one cubemap image.
    pub fn load_cubemap(&self, file_names: &[String], format: TextureFormat) -> anyhow::Result<ImageData> {
        if file_names.len() != 6 {
            bail!("a cubemap needs 6 faces, got {}", file_names.len());
        }
        let mut cubemap = ImageData {
            size: [0, 0],
            format,
            pixels: Vec::new(),
        };
        for (i, file_name) in file_names.iter().enumerate() {
            let face = self.load_image(file_name, format)?;
            if i == 0 {
                cubemap.size = face.size;
            } else if face.size != cubemap.size {
                bail!(
                    "cubemap face {} is {:?}, the first face is {:?}",
                    file_name,
                    face.size,
                    cubemap.size
                );
            }
            cubemap.pixels.extend(face.pixels);
        }
        Ok(cubemap)
    }

    pub fn load_obj(&self, file_name: &str) -> anyhow::Result<MeshData> {
        self.load_cached(&self.meshes, file_name, &(), |path| {
            let text = file::load_string(path)?;
            mesh::parse_obj(&text, file_name)
        })
    }

    pub fn load_ply(&self, file_name: &str) -> anyhow::Result<MeshData> {
        self.load_cached(&self.meshes, file_name, &(), |path| {
            let text = file::load_string(path)?;
            mesh::parse_ply(&text, file_name)
        })
    }

    /// Picks the mesh parser from the file extension.
    pub fn load_mesh(&self, file_name: &str) -> anyhow::Result<MeshData> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("obj") => self.load_obj(file_name),
            Some("ply") => self.load_ply(file_name),
            _ => bail!("unsupported mesh file {}", file_name),
        }
    }

    /// Reads `shader/<dir>/<name>.vert`, `.frag` and, if present, `.geom`.
    pub fn load_shader(&self, dir: &str, name: &str) -> anyhow::Result<ShaderSources> {
        let vertex = file::load_string(&self.paths.shader_path(dir, name, "vert"))
            .with_context(|| format!("no vertex shader for {}", name))?;
        let fragment = file::load_string(&self.paths.shader_path(dir, name, "frag"))
            .with_context(|| format!("no fragment shader for {}", name))?;
        let geometry_path = self.paths.shader_path(dir, name, "geom");
        let geometry = if geometry_path.is_file() {
            Some(file::load_string(&geometry_path)?)
        } else {
            None
        };
        Ok(ShaderSources {
            vertex,
            fragment,
            geometry,
        })
    }
}
