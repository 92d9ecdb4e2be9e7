//! Error types shared across the engine.
//!
//! Loaders and backends work with `anyhow::Result` internally; the registry,
//! the level builder and the renderer expose these matchable enums so callers
//! can tell a missing entity from a mistyped one, or a bad reference from a
//! missing file.

use std::path::PathBuf;

use thiserror::Error;

use crate::level::{EntityId, EntityKind};

/// Registry errors.
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("no entity with id {0}")]
    NotFound(EntityId),

    #[error("entity {id} is a {found}, expected a {expected}")]
    WrongKind {
        id: EntityId,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("the name \"{0}\" is already registered")]
    DuplicateName(String),

    #[error("entity {id} is still referenced by \"{by}\"")]
    InUse { id: EntityId, by: String },

    #[error("invalid {kind} \"{name}\": {reason}")]
    Invalid {
        kind: EntityKind,
        name: String,
        reason: String,
    },
}

/// Level build errors. A build returning any of these hands back no level.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{kind} \"{name}\" referenced by \"{referenced_by}\" is not declared before it")]
    UnresolvedName {
        kind: EntityKind,
        name: String,
        referenced_by: String,
    },

    #[error("program \"{0}\" has no input scene type")]
    NoSceneType(String),

    #[error("invalid declaration \"{name}\": {reason}")]
    Invalid { name: String, reason: String },

    #[error("could not load asset for \"{name}\"")]
    Asset {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("could not parse level description {path:?}")]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not read level description {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Level(#[from] LevelError),
}

/// Frame loop errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("light slot {slot} requested but only {count} lights are registered")]
    LightSlot { slot: usize, count: usize },

    #[error("no level loaded")]
    NoLevel,

    #[error(transparent)]
    Level(#[from] LevelError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("camera cannot be projected: {0}")]
    Camera(String),

    #[error("device error: {0:#}")]
    Device(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("a plugin named \"{0}\" is already registered")]
    Duplicate(String),

    #[error("no plugin named \"{0}\"")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
}
