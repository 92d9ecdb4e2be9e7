//! Serde schema of level description files.
//!
//! A description lists its sections in build order. Entities refer to each
//! other by name; the builder turns names into ids.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    camera::CameraDesc,
    error::BuildError,
    level::{MeshEnum, PixelElementSize, PixelStructure, SceneType},
    light::LightDesc,
    uniform::UniformDecl,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelProto {
    pub name: String,
    /// Camera node used for rendering. Empty picks the first camera node.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_camera_name: String,
    pub textures: Vec<TextureProto>,
    pub programs: Vec<ProgramProto>,
    pub materials: Vec<MaterialProto>,
    pub meshes: Vec<MeshProto>,
    pub scene_nodes: Vec<SceneNodeProto>,
}

impl LevelProto {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        serde_json::from_str(json).map_err(|source| BuildError::Parse { path: None, source })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BuildError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| BuildError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    pub fn to_json(&self) -> Result<String, BuildError> {
        serde_json::to_string_pretty(self).map_err(|source| BuildError::Parse { path: None, source })
    }
}

/// A texture is loaded from `file_name`, from six `file_names` (cubemap), or
/// created empty with `size`. Without any of them it is an empty render target
/// that follows the window size.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureProto {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
    pub pixel_element_size: PixelElementSize,
    pub pixel_structure: PixelStructure,
    pub cubemap: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramProto {
    pub name: String,
    /// Shader base name; defaults to the program name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub shader: String,
    pub input_texture_names: Vec<String>,
    pub output_texture_names: Vec<String>,
    pub input_scene_type: SceneType,
    /// Scene node drawn by a `SCENE` program. Empty means the default root.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub input_scene_root_name: String,
    pub uniforms: Vec<UniformDecl>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialProto {
    pub name: String,
    pub program_name: String,
    pub texture_names: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshProto {
    pub name: String,
    /// `.obj` or `.ply`, relative to the asset root.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_enum: Option<MeshEnum>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub material_name: String,
    pub clear_depth: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TransformProto {
    #[default]
    Identity,
    /// Column major.
    Matrix { matrix: [f32; 16] },
    Animated {
        translation: [f32; 3],
        rotation_axis: [f32; 3],
        rotation_rate: f32,
        scale: [f32; 3],
    },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneNodeProto {
    pub name: String,
    /// Empty means the default root.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub parent: String,
    pub transform: TransformProto,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mesh_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraDesc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light: Option<LightDesc>,
}
