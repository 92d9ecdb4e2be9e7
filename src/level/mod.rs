//! The level: the registry that owns every engine entity.
//!
//! A [`Level`] hands out [`EntityId`]s, keeps names unique, remembers the
//! insertion order of each entity kind and checks that references between
//! entities resolve. It has no GPU side effects; a [`Device`] uploads a
//! finished level separately.
//!
//! Every level starts with a default root scene node, a unit quad and a unit
//! cube. Post-processing passes draw the quad or the cube; scene nodes
//! declared without a parent hang off the default root.
//!
//! [`Device`]: crate::backend::Device

use std::collections::{HashMap, HashSet};

use crate::{
    error::LevelError,
    resources::mesh::MeshData,
    scene_graph::NodeTransform,
};

pub mod builder;
pub mod entity;
pub mod proto;
pub mod serialize;

pub use entity::*;

pub const DEFAULT_ROOT_NAME: &str = "DefaultRoot";
pub const DEFAULT_QUAD_NAME: &str = "DefaultQuad";
pub const DEFAULT_CUBE_NAME: &str = "DefaultCube";

#[derive(Clone, Debug)]
pub struct Level {
    name: String,
    next_id: u64,
    entities: HashMap<EntityId, Entity>,
    names: HashMap<String, EntityId>,
    /// Insertion order per kind, indexed by `EntityKind::index`.
    order: [Vec<EntityId>; 6],
    builtin_meshes: HashSet<EntityId>,
    default_root: EntityId,
    default_quad: EntityId,
    default_cube: EntityId,
    default_camera: EntityId,
    /// Bumped whenever an entity a device mirrors changes.
    revision: u64,
}

impl Level {
    pub fn new(name: &str) -> Self {
        let mut level = Self {
            name: name.to_string(),
            next_id: 1,
            entities: HashMap::new(),
            names: HashMap::new(),
            order: Default::default(),
            builtin_meshes: HashSet::new(),
            default_root: EntityId::NULL,
            default_quad: EntityId::NULL,
            default_cube: EntityId::NULL,
            default_camera: EntityId::NULL,
            revision: 0,
        };
        level.create_defaults();
        level
    }

    fn create_defaults(&mut self) {
        // The names are reserved and the level is empty, so none of these can fail.
        let root = SceneNode::new(
            DEFAULT_ROOT_NAME,
            EntityId::NULL,
            NodeTransform::identity(),
            NodeContent::Empty,
        );
        self.default_root = self.insert(root.into_entity());
        self.default_quad = self.insert_builtin_mesh(DEFAULT_QUAD_NAME, MeshEnum::Quad, &MeshData::quad());
        self.default_cube = self.insert_builtin_mesh(DEFAULT_CUBE_NAME, MeshEnum::Cube, &MeshData::cube());
    }

    fn insert_builtin_mesh(&mut self, name: &str, which: MeshEnum, data: &MeshData) -> EntityId {
        let [points, normals, texcoords, indices] = data
            .to_buffers(name)
            .map(|buffer| self.insert(buffer.into_entity()));
        let mesh = StaticMesh {
            name: name.to_string(),
            points,
            normals,
            texcoords,
            indices,
            material: EntityId::NULL,
            primitive: data.primitive,
            clear_depth: false,
            source: MeshSource::Builtin(which),
        };
        let id = self.next_id();
        self.names.insert(name.to_string(), id);
        self.entities.insert(id, mesh.into_entity());
        self.builtin_meshes.insert(id);
        id
    }

    fn next_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Registers an already validated entity.
    fn insert(&mut self, entity: Entity) -> EntityId {
        self.touch(entity.kind());
        let id = self.next_id();
        self.names.insert(entity.name().to_string(), id);
        self.order[entity.kind().index()].push(id);
        self.entities.insert(id, entity);
        id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Changes whenever a texture, buffer, program or static mesh is added,
    /// removed or updated. Devices compare it to know when to re-upload.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self, kind: EntityKind) {
        if kind.is_device_resource() {
            self.revision += 1;
        }
    }

    /// Registers `entity` under a fresh id.
    ///
    /// Fails if the name is empty or taken, or if the entity points at ids
    /// that do not exist or have the wrong kind. Scene nodes are appended to
    /// their parent's children.
    pub fn add<T: LevelEntity>(&mut self, entity: T) -> Result<EntityId, LevelError> {
        let name = entity.name().to_string();
        if name.is_empty() {
            return Err(LevelError::Invalid {
                kind: T::KIND,
                name,
                reason: "the name is empty".to_string(),
            });
        }
        if self.names.contains_key(&name) {
            return Err(LevelError::DuplicateName(name));
        }
        let mut entity = entity.into_entity();
        self.check_references(EntityId::NULL, &entity)?;
        if let Entity::SceneNode(node) = &mut entity {
            node.children.clear();
        }
        let parent = match &entity {
            Entity::SceneNode(node) => node.parent,
            _ => EntityId::NULL,
        };
        let id = self.insert(entity);
        if !parent.is_null() {
            self.get_mut::<SceneNode>(parent)?.children.push(id);
        }
        Ok(id)
    }

    /// Checks what `entity` points at. `id` is the entity's own id, null for
    /// entities not registered yet.
    fn check_references(&self, id: EntityId, entity: &Entity) -> Result<(), LevelError> {
        let kind = entity.kind();
        let name = entity.name().to_string();
        let invalid = |reason: String| LevelError::Invalid {
            kind,
            name: name.clone(),
            reason,
        };
        match entity {
            Entity::Texture(texture) => texture.check().map_err(|reason| invalid(reason))?,
            Entity::Program(program) => {
                for &texture in program.inputs.iter().chain(program.outputs.iter()) {
                    self.texture(texture)?;
                }
                if !program.scene_root.is_null() {
                    self.check_scene_root(program.scene_type, program.scene_root)?;
                }
            }
            Entity::Material(material) => {
                self.program(material.program)?;
                for &texture in &material.textures {
                    self.texture(texture)?;
                }
            }
            Entity::StaticMesh(mesh) => {
                for id in [mesh.points, mesh.normals, mesh.texcoords] {
                    self.buffer(id)?;
                }
                let indices = self.buffer(mesh.indices)?;
                if !matches!(indices.data, BufferData::Index(_)) {
                    return Err(invalid("the index buffer does not hold indices".to_string()));
                }
                if mesh.primitive == Primitive::Triangles && indices.len() % 3 != 0 {
                    return Err(invalid(format!(
                        "{} indices is not a whole number of triangles",
                        indices.len()
                    )));
                }
                if !mesh.material.is_null() {
                    self.material(mesh.material)?;
                }
            }
            Entity::SceneNode(node) => {
                if node.parent.is_null() {
                    if id.is_null() || id != self.default_root {
                        return Err(invalid("only the default root has no parent".to_string()));
                    }
                } else {
                    self.scene_node(node.parent)?;
                }
                if let NodeContent::Mesh(mesh) = node.content {
                    self.static_mesh(mesh)?;
                }
                if let NodeContent::Camera(camera) = &node.content {
                    camera.validate().map_err(|reason| invalid(reason))?;
                }
            }
            Entity::Buffer(_) => (),
        }
        Ok(())
    }

    /// Checks that `root` is a valid draw root for `scene_type`.
    pub(crate) fn check_scene_root(&self, scene_type: SceneType, root: EntityId) -> Result<(), LevelError> {
        match scene_type {
            SceneType::Quad | SceneType::Cube => self.static_mesh(root).map(|_| ()),
            SceneType::Scene => self.scene_node(root).map(|_| ()),
            SceneType::None => Err(LevelError::NotFound(root)),
        }
    }

    pub fn add_texture(&mut self, texture: Texture) -> Result<EntityId, LevelError> {
        self.add(texture)
    }

    pub fn add_program(&mut self, program: Program) -> Result<EntityId, LevelError> {
        self.add(program)
    }

    pub fn add_material(&mut self, material: Material) -> Result<EntityId, LevelError> {
        self.add(material)
    }

    pub fn add_static_mesh(&mut self, mesh: StaticMesh) -> Result<EntityId, LevelError> {
        self.add(mesh)
    }

    pub fn add_scene_node(&mut self, node: SceneNode) -> Result<EntityId, LevelError> {
        self.add(node)
    }

    pub fn add_buffer(&mut self, buffer: Buffer) -> Result<EntityId, LevelError> {
        self.add(buffer)
    }

    /// Registers the four buffers of `data` (named `<name>.point`, `.normal`,
    /// `.texcoord`, `.index`) and a static mesh over them.
    pub fn add_mesh_data(
        &mut self,
        name: &str,
        data: &MeshData,
        material: EntityId,
        clear_depth: bool,
        source: MeshSource,
    ) -> Result<EntityId, LevelError> {
        data.check().map_err(|reason| LevelError::Invalid {
            kind: EntityKind::StaticMesh,
            name: name.to_string(),
            reason,
        })?;
        if self.names.contains_key(name) {
            return Err(LevelError::DuplicateName(name.to_string()));
        }
        let [points, normals, texcoords, indices] = data.to_buffers(name);
        let points = self.add(points)?;
        let normals = self.add(normals)?;
        let texcoords = self.add(texcoords)?;
        let indices = self.add(indices)?;
        self.add(StaticMesh {
            name: name.to_string(),
            points,
            normals,
            texcoords,
            indices,
            material,
            primitive: data.primitive,
            clear_depth,
            source,
        })
    }

    pub fn get<T: LevelEntity>(&self, id: EntityId) -> Result<&T, LevelError> {
        let entity = self.entities.get(&id).ok_or(LevelError::NotFound(id))?;
        T::from_entity(entity).ok_or(LevelError::WrongKind {
            id,
            expected: T::KIND,
            found: entity.kind(),
        })
    }

    /// Edits entity `id` through `edit`.
    ///
    /// The edit runs on a copy, which replaces the stored entity only if its
    /// name and its place in the scene graph are unchanged and everything it
    /// references still resolves. Otherwise the level is left as it was.
    pub fn update<T, R>(&mut self, id: EntityId, edit: impl FnOnce(&mut T) -> R) -> Result<R, LevelError>
    where
        T: LevelEntity + Clone,
    {
        let stored = self.get::<T>(id)?;
        let mut copy = stored.clone();
        let result = edit(&mut copy);
        let stored = stored.clone().into_entity();
        let entity = copy.into_entity();
        let invalid = |reason: &str| LevelError::Invalid {
            kind: T::KIND,
            name: stored.name().to_string(),
            reason: reason.to_string(),
        };
        if entity.name() != stored.name() {
            return Err(invalid("names are fixed once registered"));
        }
        if let (Entity::SceneNode(before), Entity::SceneNode(after)) = (&stored, &entity) {
            if before.parent != after.parent || before.children != after.children {
                return Err(invalid("parent and children are managed by the level"));
            }
        }
        self.check_references(id, &entity)?;
        self.entities.insert(id, entity);
        self.touch(T::KIND);
        Ok(result)
    }

    fn get_mut<T: LevelEntity>(&mut self, id: EntityId) -> Result<&mut T, LevelError> {
        let entity = self.entities.get_mut(&id).ok_or(LevelError::NotFound(id))?;
        let found = entity.kind();
        T::from_entity_mut(entity).ok_or(LevelError::WrongKind {
            id,
            expected: T::KIND,
            found,
        })
    }

    pub fn texture(&self, id: EntityId) -> Result<&Texture, LevelError> {
        self.get(id)
    }

    pub fn program(&self, id: EntityId) -> Result<&Program, LevelError> {
        self.get(id)
    }

    pub fn material(&self, id: EntityId) -> Result<&Material, LevelError> {
        self.get(id)
    }

    pub fn static_mesh(&self, id: EntityId) -> Result<&StaticMesh, LevelError> {
        self.get(id)
    }

    pub fn scene_node(&self, id: EntityId) -> Result<&SceneNode, LevelError> {
        self.get(id)
    }

    pub fn buffer(&self, id: EntityId) -> Result<&Buffer, LevelError> {
        self.get(id)
    }

    /// `EntityId::NULL` when no entity has that name.
    pub fn id_from_name(&self, name: &str) -> EntityId {
        self.names.get(name).copied().unwrap_or(EntityId::NULL)
    }

    pub fn name_from_id(&self, id: EntityId) -> Result<&str, LevelError> {
        self.entities
            .get(&id)
            .map(Entity::name)
            .ok_or(LevelError::NotFound(id))
    }

    pub fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        self.entities.get(&id).map(Entity::kind)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn default_root_scene_node_id(&self) -> EntityId {
        self.default_root
    }

    pub fn default_static_mesh_quad_id(&self) -> EntityId {
        self.default_quad
    }

    pub fn default_static_mesh_cube_id(&self) -> EntityId {
        self.default_cube
    }

    pub fn is_builtin(&self, id: EntityId) -> bool {
        id == self.default_root || self.builtin_meshes.contains(&id)
    }

    /// Null when the level has no camera.
    pub fn default_camera_id(&self) -> EntityId {
        self.default_camera
    }

    pub fn set_default_camera_id(&mut self, id: EntityId) -> Result<(), LevelError> {
        let node = self.scene_node(id)?;
        if !matches!(node.content, NodeContent::Camera(_)) {
            return Err(LevelError::Invalid {
                kind: EntityKind::SceneNode,
                name: node.name.clone(),
                reason: "the node holds no camera".to_string(),
            });
        }
        self.default_camera = id;
        Ok(())
    }

    fn ordered(&self, kind: EntityKind) -> &[EntityId] {
        &self.order[kind.index()]
    }

    pub fn textures(&self) -> &[EntityId] {
        self.ordered(EntityKind::Texture)
    }

    pub fn programs(&self) -> &[EntityId] {
        self.ordered(EntityKind::Program)
    }

    pub fn materials(&self) -> &[EntityId] {
        self.ordered(EntityKind::Material)
    }

    /// Declared meshes. The built-in quad and cube are not listed.
    pub fn static_meshes(&self) -> &[EntityId] {
        self.ordered(EntityKind::StaticMesh)
    }

    pub fn builtin_static_meshes(&self) -> [EntityId; 2] {
        [self.default_quad, self.default_cube]
    }

    /// Includes the default root.
    pub fn scene_nodes(&self) -> &[EntityId] {
        self.ordered(EntityKind::SceneNode)
    }

    pub fn buffers(&self) -> &[EntityId] {
        self.ordered(EntityKind::Buffer)
    }

    pub fn parent(&self, id: EntityId) -> Result<EntityId, LevelError> {
        self.scene_node(id).map(|node| node.parent)
    }

    pub fn children(&self, id: EntityId) -> Result<&[EntityId], LevelError> {
        self.scene_node(id).map(|node| node.children.as_slice())
    }

    /// Program that draws `mesh`, through its material. Null for meshes
    /// without a material.
    pub fn material_program(&self, mesh: EntityId) -> Result<EntityId, LevelError> {
        let mesh = self.static_mesh(mesh)?;
        if mesh.material.is_null() {
            return Ok(EntityId::NULL);
        }
        Ok(self.material(mesh.material)?.program)
    }

    /// First entity that references `id`, if any.
    pub fn referenced_by(&self, id: EntityId) -> Option<EntityId> {
        EntityKind::ALL
            .iter()
            .flat_map(|kind| self.ordered(*kind).iter())
            .chain(self.builtin_meshes.iter())
            .copied()
            .find(|other| {
                self.entities
                    .get(other)
                    .is_some_and(|entity| entity.references().contains(&id))
            })
    }

    /// Removes an entity nothing else references.
    ///
    /// Built-in entities cannot be removed. A removed scene node is detached
    /// from its parent.
    pub fn remove(&mut self, id: EntityId) -> Result<Entity, LevelError> {
        let entity = self.entities.get(&id).ok_or(LevelError::NotFound(id))?;
        if self.is_builtin(id) {
            return Err(LevelError::InUse {
                id,
                by: self.name.clone(),
            });
        }
        if let Some(other) = self.referenced_by(id) {
            return Err(LevelError::InUse {
                id,
                by: self.name_from_id(other)?.to_string(),
            });
        }
        let kind = entity.kind();
        let entity = self.entities.remove(&id).ok_or(LevelError::NotFound(id))?;
        self.touch(kind);
        self.names.remove(entity.name());
        self.order[kind.index()].retain(|other| *other != id);
        if let Entity::SceneNode(node) = &entity {
            if let Ok(parent) = self.get_mut::<SceneNode>(node.parent) {
                parent.children.retain(|child| *child != id);
            }
        }
        if self.default_camera == id {
            self.default_camera = EntityId::NULL;
        }
        Ok(entity)
    }

    /// Number of live entities, built-ins included.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::new("Level")
    }
}
