//! Writes a [`Level`] back out as a description.
//!
//! Entities are emitted in insertion order, so a description built and
//! written back keeps its order. Buffers, the default root and the built-in
//! meshes are implied by the format and not written.

use std::path::Path;

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    error::{BuildError, LevelError},
    level::{
        EntityId, Level, MeshSource, NodeContent, SceneType, TextureSource,
        proto::{LevelProto, MaterialProto, MeshProto, ProgramProto, SceneNodeProto, TextureProto, TransformProto},
    },
    scene_graph::NodeTransform,
};

pub fn to_proto(level: &Level) -> Result<LevelProto, LevelError> {
    let names = |ids: &[EntityId]| -> Result<Vec<String>, LevelError> {
        ids.iter()
            .map(|id| level.name_from_id(*id).map(str::to_string))
            .collect()
    };
    // Null or the default root both serialise as "".
    let optional_name = |id: EntityId| -> Result<String, LevelError> {
        if id.is_null() || id == level.default_root_scene_node_id() {
            Ok(String::new())
        } else {
            level.name_from_id(id).map(str::to_string)
        }
    };

    let mut proto = LevelProto {
        name: level.name().to_string(),
        default_camera_name: optional_name(level.default_camera_id())?,
        ..Default::default()
    };

    for id in level.textures() {
        let texture = level.texture(*id)?;
        let mut entry = TextureProto {
            name: texture.name.clone(),
            pixel_element_size: texture.format.element,
            pixel_structure: texture.format.structure,
            cubemap: texture.cubemap,
            ..Default::default()
        };
        match &texture.source {
            TextureSource::File(file_name) => entry.file_name = file_name.clone(),
            TextureSource::Faces(file_names) => entry.file_names = file_names.clone(),
            TextureSource::Empty { window_sized: false } => entry.size = Some(texture.size),
            TextureSource::Empty { window_sized: true } => (),
        }
        proto.textures.push(entry);
    }

    for id in level.programs() {
        let program = level.program(*id)?;
        let input_scene_root_name = match program.scene_type {
            SceneType::Scene => optional_name(program.scene_root)?,
            _ => String::new(),
        };
        proto.programs.push(ProgramProto {
            name: program.name.clone(),
            shader: if program.shader == program.name {
                String::new()
            } else {
                program.shader.clone()
            },
            input_texture_names: names(&program.inputs)?,
            output_texture_names: names(&program.outputs)?,
            input_scene_type: program.scene_type,
            input_scene_root_name,
            uniforms: program.uniforms.clone(),
        });
    }

    for id in level.materials() {
        let material = level.material(*id)?;
        proto.materials.push(MaterialProto {
            name: material.name.clone(),
            program_name: level.name_from_id(material.program)?.to_string(),
            texture_names: names(&material.textures)?,
        });
    }

    for id in level.static_meshes() {
        let mesh = level.static_mesh(*id)?;
        let (file_name, mesh_enum) = match &mesh.source {
            MeshSource::File(file_name) => (file_name.clone(), None),
            MeshSource::Builtin(which) => (String::new(), Some(*which)),
        };
        proto.meshes.push(MeshProto {
            name: mesh.name.clone(),
            file_name,
            mesh_enum,
            material_name: optional_name(mesh.material)?,
            clear_depth: mesh.clear_depth,
        });
    }

    for id in level.scene_nodes() {
        if *id == level.default_root_scene_node_id() {
            continue;
        }
        let node = level.scene_node(*id)?;
        let mut entry = SceneNodeProto {
            name: node.name.clone(),
            parent: optional_name(node.parent)?,
            transform: transform_proto(&node.transform),
            ..Default::default()
        };
        match &node.content {
            NodeContent::Empty => (),
            NodeContent::Mesh(mesh) => entry.mesh_name = level.name_from_id(*mesh)?.to_string(),
            NodeContent::Camera(camera) => entry.camera = Some(camera.clone()),
            NodeContent::Light(light) => entry.light = Some(light.clone()),
        }
        proto.scene_nodes.push(entry);
    }

    Ok(proto)
}

fn transform_proto(transform: &NodeTransform) -> TransformProto {
    match transform {
        NodeTransform::Fixed(matrix) if *matrix == Matrix4::identity() => TransformProto::Identity,
        NodeTransform::Fixed(matrix) => {
            let columns: [[f32; 4]; 4] = (*matrix).into();
            let mut flat = [0.0; 16];
            for (i, value) in columns.iter().flatten().enumerate() {
                flat[i] = *value;
            }
            TransformProto::Matrix { matrix: flat }
        }
        NodeTransform::Animated {
            translation,
            rotation_axis,
            rotation_rate,
            scale,
        } => TransformProto::Animated {
            translation: (*translation).into(),
            rotation_axis: (*rotation_axis).into(),
            rotation_rate: *rotation_rate,
            scale: (*scale).into(),
        },
    }
}

/// Writes `level` as pretty printed JSON.
pub fn save_level(level: &Level, path: impl AsRef<Path>) -> Result<(), BuildError> {
    let path = path.as_ref();
    let json = to_proto(level)?.to_json()?;
    std::fs::write(path, json).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}
