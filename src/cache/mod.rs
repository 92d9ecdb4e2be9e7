//! Disk cache for decoded assets.
//!
//! Decoding PNGs and parsing OBJ files is slow, so the decoded result is
//! written next to the assets under `cache/<kind>/`. Each entry records the
//! source file it came from (path relative to the asset root, size and
//! modification time) and the parameters it was decoded with. An entry is
//! only returned when those match; anything unreadable is a miss.
//!
//! Entry layout: a bincode encoded [`EntryHeader`] followed by the bincode
//! encoded entry body. The header is checked before the body is decoded, so
//! entries written by an older layout are rejected without touching their
//! payload.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{diagnostics::Logger, file::AssetPaths};

pub mod image;
pub mod mesh;

/// Identity of the source file an entry was produced from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Relative to the asset root, `/` separated.
    pub relative_path: String,
    pub source_size: u64,
    pub source_mtime_ns: u64,
}

impl CacheMetadata {
    pub fn from_file(paths: &AssetPaths, path: &Path) -> anyhow::Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("could not stat {}", path.display()))?;
        Ok(Self {
            relative_path: paths.relative(path),
            source_size: metadata.len(),
            source_mtime_ns: mtime_ns(&metadata)?,
        })
    }
}

fn mtime_ns(metadata: &std::fs::Metadata) -> anyhow::Result<u64> {
    let modified = metadata.modified()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(since_epoch.as_nanos() as u64)
}

/// A decoded asset type that can be cached.
pub trait CacheArtifact: Serialize + DeserializeOwned {
    /// Decode parameters that change the result, e.g. the pixel format.
    type Params: Serialize + DeserializeOwned + PartialEq;

    /// Subdirectory of the cache holding this kind.
    const KIND: &'static str;

    /// Bump whenever the serialized form of `Self` or `Params` changes.
    const CACHE_VERSION: u32;

    /// Short file-name-safe tag, so variants of one source get their own entry.
    fn params_tag(params: &Self::Params) -> String;
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    kind: String,
    cache_version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry<P, A> {
    metadata: CacheMetadata,
    params: P,
    payload: A,
}

/// Cache for one artifact kind.
#[derive(Debug)]
pub struct ArtifactCache<A> {
    dir: PathBuf,
    logger: Logger,
    _artifact: PhantomData<fn() -> A>,
}

impl<A: CacheArtifact> ArtifactCache<A> {
    pub fn new(cache_root: &Path, logger: Logger) -> Self {
        Self {
            dir: cache_root.join(A::KIND),
            logger,
            _artifact: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the entry for `relative_path` decoded with `params`.
    pub fn entry_path(&self, relative_path: &str, params: &A::Params) -> PathBuf {
        self.dir
            .join(format!("{}.{}.bin", escape(relative_path), A::params_tag(params)))
    }

    /// Returns the payload if the entry matches `metadata` and `params` exactly.
    pub fn load(&self, metadata: &CacheMetadata, params: &A::Params) -> Option<A> {
        let path = self.entry_path(&metadata.relative_path, params);
        let entry = self.read(&path)?;
        if entry.metadata != *metadata || entry.params != *params {
            self.logger
                .debug(format!("stale {} cache entry {}", A::KIND, path.display()));
            return None;
        }
        Some(entry.payload)
    }

    /// Looser lookup for when the strict one misses.
    ///
    /// Without `source` (the source file is gone, e.g. a shipped build with
    /// only the cache) any entry for the path and params is accepted. With
    /// `source`, the recorded size must match and the entry file must be at
    /// least as new as the source, which survives checkouts that reset
    /// modification times.
    pub fn load_relaxed(
        &self,
        relative_path: &str,
        params: &A::Params,
        source: Option<&CacheMetadata>,
    ) -> Option<A> {
        let path = self.entry_path(relative_path, params);
        let entry = self.read(&path)?;
        if entry.metadata.relative_path != relative_path || entry.params != *params {
            return None;
        }
        if let Some(source) = source {
            if entry.metadata.source_size != source.source_size {
                return None;
            }
            let entry_mtime = std::fs::metadata(&path)
                .ok()
                .and_then(|m| mtime_ns(&m).ok())?;
            if entry_mtime < source.source_mtime_ns {
                return None;
            }
        }
        Some(entry.payload)
    }

    /// Writes an entry. Failures are logged and otherwise ignored.
    pub fn save(&self, metadata: &CacheMetadata, params: &A::Params, payload: &A) {
        let path = self.entry_path(&metadata.relative_path, params);
        if let Err(e) = self.write(&path, metadata, params, payload) {
            self.logger.warn(format!(
                "could not write {} cache entry {}: {:#}",
                A::KIND,
                path.display(),
                e
            ));
        }
    }

    fn read(&self, path: &Path) -> Option<Entry<A::Params, A>> {
        let bytes = std::fs::read(path).ok()?;
        match decode_entry::<A>(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.logger
                    .debug(format!("ignoring cache entry {}: {:#}", path.display(), e));
                None
            }
        }
    }

    fn write(
        &self,
        path: &Path,
        metadata: &CacheMetadata,
        params: &A::Params,
        payload: &A,
    ) -> anyhow::Result<()> {
        let config = bincode::config::standard();
        let header = EntryHeader {
            kind: A::KIND.to_string(),
            cache_version: A::CACHE_VERSION,
        };
        let mut bytes = bincode::serde::encode_to_vec(&header, config)?;
        let entry = Entry {
            metadata: metadata.clone(),
            params,
            payload,
        };
        bytes.extend(bincode::serde::encode_to_vec(&entry, config)?);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let temp = path.with_extension(format!("{}.{}.tmp", std::process::id(), nanos));
        std::fs::write(&temp, &bytes)?;
        if let Err(e) = std::fs::rename(&temp, path) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn decode_entry<A: CacheArtifact>(bytes: &[u8]) -> anyhow::Result<Entry<A::Params, A>> {
    let config = bincode::config::standard();
    let (header, read): (EntryHeader, _) = bincode::serde::decode_from_slice(bytes, config)?;
    anyhow::ensure!(
        header.kind == A::KIND && header.cache_version == A::CACHE_VERSION,
        "entry is {} v{}, expected {} v{}",
        header.kind,
        header.cache_version,
        A::KIND,
        A::CACHE_VERSION
    );
    let (entry, _) = bincode::serde::decode_from_slice(&bytes[read..], config)?;
    Ok(entry)
}

/// Flattens a relative path into a single file name.
fn escape(relative_path: &str) -> String {
    relative_path
        .replace('%', "%25")
        .replace('/', "%2F")
        .replace('\\', "%5C")
        .replace(':', "%3A")
}
