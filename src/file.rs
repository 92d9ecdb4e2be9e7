//! Asset directory discovery and file access.
//!
//! Lookups start at the working directory and climb a few ancestors, so the
//! engine finds `asset/` whether it is started from the repository root, a
//! crate directory or a build output folder. Directories that look like build
//! outputs are never accepted as the match.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use crate::config::EngineConfig;

/// Path segments that mark a build output directory.
const BUILD_SEGMENTS: &[&str] = &["target", "build", "out", "Debug", "Release", "x64"];

fn is_build_output(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|segment| segment.to_str())
        .is_some_and(|segment| BUILD_SEGMENTS.contains(&segment))
}

/// Finds `name` in `start` or one of its first `depth` ancestors.
pub fn find_directory_from(start: &Path, name: &str, depth: usize) -> Option<PathBuf> {
    start
        .ancestors()
        .take(depth + 1)
        .filter(|dir| !is_build_output(dir))
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_dir())
}

pub fn find_directory(name: &str, depth: usize) -> anyhow::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    find_directory_from(&cwd, name, depth).with_context(|| {
        format!(
            "no \"{}\" directory within {} levels of {}",
            name,
            depth,
            cwd.display()
        )
    })
}

/// Resolved locations of the asset tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetPaths {
    root: PathBuf,
    cache: PathBuf,
}

impl AssetPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let cache = root.join("cache");
        Self { root, cache }
    }

    pub fn with_cache_dir(mut self, cache: impl Into<PathBuf>) -> Self {
        self.cache = cache.into();
        self
    }

    pub fn discover(config: &EngineConfig) -> anyhow::Result<Self> {
        let root = match &config.asset_root {
            Some(root) => root.clone(),
            None => find_directory(&config.asset_dir_name, config.search_depth)?,
        };
        let paths = Self::new(root);
        Ok(match &config.cache_dir {
            Some(cache) => paths.with_cache_dir(cache),
            None => paths,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache
    }

    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// `asset/shader/<dir>/<name>.<stage>`
    pub fn shader_path(&self, dir: &str, name: &str, stage: &str) -> PathBuf {
        self.root
            .join("shader")
            .join(dir)
            .join(format!("{}.{}", name, stage))
    }

    /// Path of `path` relative to the asset root, with `/` separators.
    ///
    /// `.` and `..` are resolved first. Paths outside the root keep their
    /// leading `..` segments, or stay absolute when they share nothing with
    /// the root, so two different files never get the same key.
    pub fn relative(&self, path: &Path) -> String {
        let root = normalize(&self.root);
        let path = normalize(&self.root.join(path));
        if root.has_root() != path.has_root() {
            return join_components(path.components());
        }
        let root_parts: Vec<Component> = root.components().collect();
        let parts: Vec<Component> = path.components().collect();
        let common = root_parts
            .iter()
            .zip(&parts)
            .take_while(|(a, b)| a == b)
            .count();
        if common == 0 && root.has_root() {
            // Another drive.
            return join_components(path.components());
        }
        let up = root_parts.len() - common;
        std::iter::repeat_n("..".to_string(), up)
            .chain(parts[common..].iter().map(component_str))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Resolves `.` and `..` without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // Nothing is above the file system root.
                Some(Component::RootDir | Component::Prefix(_)) => (),
                Some(Component::ParentDir | Component::CurDir) | None => normalized.push(".."),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

fn component_str(component: &Component) -> String {
    match component {
        Component::RootDir => String::new(),
        other => other.as_os_str().to_string_lossy().into_owned(),
    }
}

fn join_components<'a>(components: impl Iterator<Item = Component<'a>>) -> String {
    components
        .map(|c| component_str(&c))
        .collect::<Vec<_>>()
        .join("/")
}

pub fn load_string(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read {}", absolute(path)))
}

pub fn load_binary(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("could not read {}", absolute(path)))
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
