//! Builds a [`Level`] from a [`LevelProto`].
//!
//! Sections are processed in a fixed order: textures, programs, materials,
//! meshes, scene nodes. A declaration may only name entities from earlier
//! sections or earlier in its own section. The one exception is the scene
//! root of a `SCENE` program, which names a scene node: those references are
//! parked in a side table and resolved once every scene node exists.
//!
//! A build either returns a complete level or an error; no partially built
//! level escapes.

use std::{collections::HashMap, path::Path};

use cgmath::{Matrix4, Vector3};

use crate::{
    diagnostics::Logger,
    error::BuildError,
    level::{
        EntityId, EntityKind, Level, Material, MeshEnum, MeshSource, NodeContent, Program, SceneNode,
        SceneType, StaticMesh, Texture, TextureFormat, TextureSource,
        proto::{LevelProto, MaterialProto, MeshProto, ProgramProto, SceneNodeProto, TextureProto, TransformProto},
    },
    resources::AssetLoader,
    scene_graph::NodeTransform,
    uniform,
};

pub struct LevelBuilder<'a> {
    loader: &'a AssetLoader,
    shader_dir: String,
    window_size: [u32; 2],
    logger: Logger,
}

/// A `SCENE` program waiting for its root node.
struct PendingRoot {
    program: EntityId,
    program_name: String,
    root_name: String,
}

/// Per-build state.
struct BuildState {
    level: Level,
    pending_roots: Vec<PendingRoot>,
    /// Buffers already created for a mesh file, shared by every mesh using it.
    mesh_files: HashMap<String, EntityId>,
}

impl<'a> LevelBuilder<'a> {
    /// `shader_dir` is the subdirectory of `asset/shader/` the target device
    /// reads its sources from.
    pub fn new(loader: &'a AssetLoader, shader_dir: &str, window_size: [u32; 2]) -> Self {
        Self {
            loader,
            shader_dir: shader_dir.to_string(),
            window_size,
            logger: Logger::default(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Reads a description file. Relative paths are taken from the asset root.
    pub fn build_file(&self, path: impl AsRef<Path>) -> Result<Level, BuildError> {
        let path = self.loader.paths().resolve(path);
        let proto = LevelProto::from_file(&path)?;
        self.build(&proto)
    }

    pub fn build(&self, proto: &LevelProto) -> Result<Level, BuildError> {
        let name = if proto.name.is_empty() { "Level" } else { &proto.name };
        let mut state = BuildState {
            level: Level::new(name),
            pending_roots: Vec::new(),
            mesh_files: HashMap::new(),
        };

        for texture in &proto.textures {
            self.add_texture(&mut state, texture)?;
        }
        for program in &proto.programs {
            self.add_program(&mut state, program)?;
        }
        for material in &proto.materials {
            add_material(&mut state, material)?;
        }
        for mesh in &proto.meshes {
            self.add_mesh(&mut state, mesh)?;
        }
        for node in &proto.scene_nodes {
            add_scene_node(&mut state, node)?;
        }
        resolve_pending_roots(&mut state)?;
        select_default_camera(&mut state.level, &proto.default_camera_name)?;

        let level = state.level;
        self.logger.info(format!(
            "built level \"{}\": {} textures, {} programs, {} materials, {} meshes, {} scene nodes",
            level.name(),
            level.textures().len(),
            level.programs().len(),
            level.materials().len(),
            level.static_meshes().len(),
            level.scene_nodes().len(),
        ));
        Ok(level)
    }

    fn add_texture(&self, state: &mut BuildState, proto: &TextureProto) -> Result<EntityId, BuildError> {
        let format = TextureFormat::new(proto.pixel_element_size, proto.pixel_structure);
        let asset_error = |source| BuildError::Asset {
            name: proto.name.clone(),
            source,
        };
        let texture = if !proto.file_names.is_empty() {
            let image = self
                .loader
                .load_cubemap(&proto.file_names, format)
                .map_err(asset_error)?;
            Texture {
                name: proto.name.clone(),
                format,
                size: image.size,
                cubemap: true,
                pixels: image.pixels,
                source: TextureSource::Faces(proto.file_names.clone()),
            }
        } else if !proto.file_name.is_empty() {
            if proto.cubemap {
                return Err(invalid(&proto.name, "a cubemap is loaded from six file_names"));
            }
            let image = self
                .loader
                .load_image(&proto.file_name, format)
                .map_err(asset_error)?;
            Texture {
                name: proto.name.clone(),
                format,
                size: image.size,
                cubemap: false,
                pixels: image.pixels,
                source: TextureSource::File(proto.file_name.clone()),
            }
        } else {
            let mut texture = Texture::empty(&proto.name, format, proto.size.unwrap_or(self.window_size));
            texture.cubemap = proto.cubemap;
            texture.source = TextureSource::Empty {
                window_sized: proto.size.is_none(),
            };
            texture
        };
        Ok(state.level.add_texture(texture)?)
    }

    fn add_program(&self, state: &mut BuildState, proto: &ProgramProto) -> Result<EntityId, BuildError> {
        let level = &state.level;
        let inputs = resolve_all(level, EntityKind::Texture, &proto.input_texture_names, &proto.name)?;
        let outputs = resolve_all(level, EntityKind::Texture, &proto.output_texture_names, &proto.name)?;
        if let Some(shared) = inputs.iter().find(|id| outputs.contains(id)) {
            return Err(invalid(
                &proto.name,
                &format!("reads and writes texture \"{}\"", level.name_from_id(*shared)?),
            ));
        }
        check_outputs(level, &outputs, &proto.name)?;
        for decl in &proto.uniforms {
            if decl.value.is_none() && !uniform::is_builtin(&decl.name) {
                return Err(invalid(
                    &proto.name,
                    &format!("uniform \"{}\" is neither built in nor given a value", decl.name),
                ));
            }
        }

        let scene_root = match proto.input_scene_type {
            SceneType::Quad => level.default_static_mesh_quad_id(),
            SceneType::Cube => level.default_static_mesh_cube_id(),
            SceneType::Scene => EntityId::NULL,
            SceneType::None => return Err(BuildError::NoSceneType(proto.name.clone())),
        };

        let shader = if proto.shader.is_empty() { &proto.name } else { &proto.shader };
        let sources = self
            .loader
            .load_shader(&self.shader_dir, shader)
            .map_err(|source| BuildError::Asset {
                name: proto.name.clone(),
                source,
            })?;

        let id = state.level.add_program(Program {
            name: proto.name.clone(),
            shader: shader.to_string(),
            vertex_source: sources.vertex,
            fragment_source: sources.fragment,
            geometry_source: sources.geometry,
            uniforms: proto.uniforms.clone(),
            inputs,
            outputs,
            scene_type: proto.input_scene_type,
            scene_root,
        })?;
        if proto.input_scene_type == SceneType::Scene {
            state.pending_roots.push(PendingRoot {
                program: id,
                program_name: proto.name.clone(),
                root_name: proto.input_scene_root_name.clone(),
            });
        }
        Ok(id)
    }

    fn add_mesh(&self, state: &mut BuildState, proto: &MeshProto) -> Result<EntityId, BuildError> {
        let level = &mut state.level;
        let material = if proto.material_name.is_empty() {
            EntityId::NULL
        } else {
            resolve(level, EntityKind::Material, &proto.material_name, &proto.name)?
        };

        // Meshes built from an existing mesh share its buffers.
        let (template, source) = match (&proto.mesh_enum, proto.file_name.as_str()) {
            (Some(_), file) if !file.is_empty() => {
                return Err(invalid(&proto.name, "has both a file_name and a mesh_enum"));
            }
            (Some(which), _) => {
                let template = match which {
                    MeshEnum::Quad => level.default_static_mesh_quad_id(),
                    MeshEnum::Cube => level.default_static_mesh_cube_id(),
                };
                (template, MeshSource::Builtin(*which))
            }
            (None, "") => return Err(invalid(&proto.name, "has neither a file_name nor a mesh_enum")),
            (None, file) => match state.mesh_files.get(file) {
                Some(template) => (*template, MeshSource::File(file.to_string())),
                None => {
                    let data = self.loader.load_mesh(file).map_err(|source| BuildError::Asset {
                        name: proto.name.clone(),
                        source,
                    })?;
                    let id = level.add_mesh_data(
                        &proto.name,
                        &data,
                        material,
                        proto.clear_depth,
                        MeshSource::File(file.to_string()),
                    )?;
                    state.mesh_files.insert(file.to_string(), id);
                    return Ok(id);
                }
            },
        };

        let template = level.static_mesh(template)?;
        let mesh = StaticMesh {
            name: proto.name.clone(),
            material,
            clear_depth: proto.clear_depth,
            source,
            ..template.clone()
        };
        Ok(level.add_static_mesh(mesh)?)
    }
}

/// Outputs are written together, so they must be 2D textures of one size
/// that stay the same size when the window is resized.
fn check_outputs(level: &Level, outputs: &[EntityId], program: &str) -> Result<(), BuildError> {
    let mut first: Option<&Texture> = None;
    for &id in outputs {
        let texture = level.texture(id)?;
        if texture.cubemap {
            return Err(invalid(
                program,
                &format!("cubemap \"{}\" cannot be a render target", texture.name),
            ));
        }
        match first {
            None => first = Some(texture),
            Some(other) if other.size != texture.size || other.is_window_sized() != texture.is_window_sized() => {
                return Err(invalid(
                    program,
                    &format!(
                        "outputs \"{}\" and \"{}\" differ in size",
                        other.name, texture.name
                    ),
                ));
            }
            Some(_) => (),
        }
    }
    Ok(())
}

fn add_material(state: &mut BuildState, proto: &MaterialProto) -> Result<EntityId, BuildError> {
    let level = &state.level;
    let program = resolve(level, EntityKind::Program, &proto.program_name, &proto.name)?;
    let textures = resolve_all(level, EntityKind::Texture, &proto.texture_names, &proto.name)?;
    Ok(state.level.add_material(Material {
        name: proto.name.clone(),
        program,
        textures,
    })?)
}

fn add_scene_node(state: &mut BuildState, proto: &SceneNodeProto) -> Result<EntityId, BuildError> {
    let level = &state.level;
    let parent = if proto.parent.is_empty() {
        level.default_root_scene_node_id()
    } else {
        resolve(level, EntityKind::SceneNode, &proto.parent, &proto.name)?
    };

    let declared = [
        !proto.mesh_name.is_empty(),
        proto.camera.is_some(),
        proto.light.is_some(),
    ];
    if declared.iter().filter(|d| **d).count() > 1 {
        return Err(invalid(&proto.name, "a scene node holds at most one of mesh, camera or light"));
    }
    let content = if !proto.mesh_name.is_empty() {
        NodeContent::Mesh(resolve(level, EntityKind::StaticMesh, &proto.mesh_name, &proto.name)?)
    } else if let Some(camera) = &proto.camera {
        camera.validate().map_err(|reason| invalid(&proto.name, &reason))?;
        NodeContent::Camera(camera.clone())
    } else if let Some(light) = &proto.light {
        NodeContent::Light(light.clone())
    } else {
        NodeContent::Empty
    };

    let mut node = SceneNode::new(&proto.name, parent, node_transform(&proto.transform), content);
    node.parent_name = proto.parent.clone();
    Ok(state.level.add_scene_node(node)?)
}

pub(crate) fn node_transform(proto: &TransformProto) -> NodeTransform {
    match proto {
        TransformProto::Identity => NodeTransform::identity(),
        TransformProto::Matrix { matrix } => {
            let mut columns = [[0.0f32; 4]; 4];
            for (i, value) in matrix.iter().enumerate() {
                columns[i / 4][i % 4] = *value;
            }
            NodeTransform::Fixed(Matrix4::from(columns))
        }
        TransformProto::Animated {
            translation,
            rotation_axis,
            rotation_rate,
            scale,
        } => NodeTransform::Animated {
            translation: Vector3::from(*translation),
            rotation_axis: Vector3::from(*rotation_axis),
            rotation_rate: *rotation_rate,
            scale: Vector3::from(*scale),
        },
    }
}

fn resolve_pending_roots(state: &mut BuildState) -> Result<(), BuildError> {
    for pending in std::mem::take(&mut state.pending_roots) {
        let level = &mut state.level;
        let root = if pending.root_name.is_empty() {
            level.default_root_scene_node_id()
        } else {
            resolve(level, EntityKind::SceneNode, &pending.root_name, &pending.program_name)?
        };
        level.update(pending.program, |program: &mut Program| program.scene_root = root)?;
    }
    Ok(())
}

fn select_default_camera(level: &mut Level, name: &str) -> Result<(), BuildError> {
    let camera = if name.is_empty() {
        level
            .scene_nodes()
            .iter()
            .copied()
            .find(|id| {
                level
                    .scene_node(*id)
                    .is_ok_and(|node| matches!(node.content, NodeContent::Camera(_)))
            })
    } else {
        Some(resolve(level, EntityKind::SceneNode, name, level.name())?)
    };
    if let Some(camera) = camera {
        level.set_default_camera_id(camera)?;
    }
    Ok(())
}

/// Id of the `kind` entity called `name`, declared before `referenced_by`.
fn resolve(level: &Level, kind: EntityKind, name: &str, referenced_by: &str) -> Result<EntityId, BuildError> {
    let id = level.id_from_name(name);
    if id.is_null() || level.kind_of(id) != Some(kind) {
        return Err(BuildError::UnresolvedName {
            kind,
            name: name.to_string(),
            referenced_by: referenced_by.to_string(),
        });
    }
    Ok(id)
}

fn resolve_all(
    level: &Level,
    kind: EntityKind,
    names: &[String],
    referenced_by: &str,
) -> Result<Vec<EntityId>, BuildError> {
    names
        .iter()
        .map(|name| resolve(level, kind, name, referenced_by))
        .collect()
}

fn invalid(name: &str, reason: &str) -> BuildError {
    BuildError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
