//! Entity kinds stored in a [`Level`](super::Level).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    camera::CameraDesc, light::LightDesc, scene_graph::NodeTransform, uniform::UniformDecl,
};

/// Opaque handle of an entity inside one level. `EntityId::NULL` means "none".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub(crate) u64);

impl EntityId {
    pub const NULL: EntityId = EntityId(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Texture,
    Program,
    Material,
    StaticMesh,
    SceneNode,
    Buffer,
}

impl EntityKind {
    pub(crate) const ALL: [EntityKind; 6] = [
        EntityKind::Texture,
        EntityKind::Program,
        EntityKind::Material,
        EntityKind::StaticMesh,
        EntityKind::SceneNode,
        EntityKind::Buffer,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Kinds a [`Device`](crate::backend::Device) creates a resource for.
    pub fn is_device_resource(self) -> bool {
        matches!(
            self,
            EntityKind::Texture | EntityKind::Program | EntityKind::StaticMesh | EntityKind::Buffer
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Texture => "texture",
            EntityKind::Program => "program",
            EntityKind::Material => "material",
            EntityKind::StaticMesh => "static mesh",
            EntityKind::SceneNode => "scene node",
            EntityKind::Buffer => "buffer",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixelElementSize {
    #[default]
    Byte,
    Short,
    Half,
    Float,
}

impl PixelElementSize {
    pub fn bytes(self) -> usize {
        match self {
            PixelElementSize::Byte => 1,
            PixelElementSize::Short | PixelElementSize::Half => 2,
            PixelElementSize::Float => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixelStructure {
    Grey,
    GreyAlpha,
    Rgb,
    #[default]
    Rgba,
    Bgr,
    Bgra,
}

impl PixelStructure {
    pub fn channels(self) -> usize {
        match self {
            PixelStructure::Grey => 1,
            PixelStructure::GreyAlpha => 2,
            PixelStructure::Rgb | PixelStructure::Bgr => 3,
            PixelStructure::Rgba | PixelStructure::Bgra => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureFormat {
    pub element: PixelElementSize,
    pub structure: PixelStructure,
}

impl TextureFormat {
    pub fn new(element: PixelElementSize, structure: PixelStructure) -> Self {
        Self { element, structure }
    }

    pub fn pixel_bytes(self) -> usize {
        self.element.bytes() * self.structure.channels()
    }
}

/// Where a texture's pixels came from.
#[derive(Clone, Debug, PartialEq)]
pub enum TextureSource {
    /// No pixels, typically a render target. Window sized targets follow the
    /// framebuffer on resize.
    Empty { window_sized: bool },
    File(String),
    /// Six cubemap faces: +x, -x, +y, -y, +z, -z.
    Faces(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Texture {
    pub name: String,
    pub format: TextureFormat,
    pub size: [u32; 2],
    pub cubemap: bool,
    /// Empty, or every face back to back.
    pub pixels: Vec<u8>,
    pub source: TextureSource,
}

impl Texture {
    /// A texture without pixel data.
    pub fn empty(name: &str, format: TextureFormat, size: [u32; 2]) -> Self {
        Self {
            name: name.to_string(),
            format,
            size,
            cubemap: false,
            pixels: Vec::new(),
            source: TextureSource::Empty {
                window_sized: false,
            },
        }
    }

    pub fn face_byte_size(&self) -> usize {
        self.size[0] as usize * self.size[1] as usize * self.format.pixel_bytes()
    }

    pub fn face_count(&self) -> usize {
        if self.cubemap { 6 } else { 1 }
    }

    pub fn is_window_sized(&self) -> bool {
        matches!(self.source, TextureSource::Empty { window_sized: true })
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        if self.size[0] == 0 || self.size[1] == 0 {
            return Err(format!("size {:?} has a zero dimension", self.size));
        }
        let expected = self.face_byte_size() * self.face_count();
        if !self.pixels.is_empty() && self.pixels.len() != expected {
            return Err(format!(
                "{} bytes of pixels, expected {}",
                self.pixels.len(),
                expected
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SceneType {
    Quad,
    Cube,
    Scene,
    #[default]
    None,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub name: String,
    /// Base name of the shader files.
    pub shader: String,
    pub vertex_source: String,
    pub fragment_source: String,
    pub geometry_source: Option<String>,
    pub uniforms: Vec<UniformDecl>,
    pub inputs: Vec<EntityId>,
    pub outputs: Vec<EntityId>,
    pub scene_type: SceneType,
    /// Quad, cube or scene node the draw pass starts from. Null until resolved.
    pub scene_root: EntityId,
}

impl Program {
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.iter().any(|u| u.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub program: EntityId,
    pub textures: Vec<EntityId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Primitive {
    #[default]
    Triangles,
    Points,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeshEnum {
    Quad,
    Cube,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MeshSource {
    Builtin(MeshEnum),
    File(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StaticMesh {
    pub name: String,
    pub points: EntityId,
    pub normals: EntityId,
    pub texcoords: EntityId,
    pub indices: EntityId,
    pub material: EntityId,
    pub primitive: Primitive,
    /// Clear the depth buffer before drawing this mesh.
    pub clear_depth: bool,
    pub source: MeshSource,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum NodeContent {
    #[default]
    Empty,
    Mesh(EntityId),
    Camera(CameraDesc),
    Light(LightDesc),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Null only for the default root.
    pub parent: EntityId,
    /// Parent as declared; empty means the default root.
    pub parent_name: String,
    pub transform: NodeTransform,
    pub content: NodeContent,
    /// Maintained by the level.
    pub children: Vec<EntityId>,
}

impl SceneNode {
    pub fn new(name: &str, parent: EntityId, transform: NodeTransform, content: NodeContent) -> Self {
        Self {
            name: name.to_string(),
            parent,
            parent_name: String::new(),
            transform,
            content,
            children: Vec::new(),
        }
    }

    pub fn mesh(&self) -> EntityId {
        match self.content {
            NodeContent::Mesh(id) => id,
            _ => EntityId::NULL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BufferData {
    Float(Vec<f32>),
    Index(Vec<u32>),
    Bytes(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Buffer {
    pub name: String,
    pub usage: BufferUsage,
    pub data: BufferData,
}

impl Buffer {
    pub fn vertex(name: &str, data: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            usage: BufferUsage::Vertex,
            data: BufferData::Float(data),
        }
    }

    pub fn index(name: &str, data: Vec<u32>) -> Self {
        Self {
            name: name.to_string(),
            usage: BufferUsage::Index,
            data: BufferData::Index(data),
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        match &self.data {
            BufferData::Float(data) => data.len() * std::mem::size_of::<f32>(),
            BufferData::Index(data) => data.len() * std::mem::size_of::<u32>(),
            BufferData::Bytes(data) => data.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            BufferData::Float(data) => bytemuck::cast_slice(data),
            BufferData::Index(data) => bytemuck::cast_slice(data),
            BufferData::Bytes(data) => data,
        }
    }

    /// Number of elements: floats, indices or bytes.
    pub fn len(&self) -> usize {
        match &self.data {
            BufferData::Float(data) => data.len(),
            BufferData::Index(data) => data.len(),
            BufferData::Bytes(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned storage for any entity kind.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Texture(Texture),
    Program(Program),
    Material(Material),
    StaticMesh(StaticMesh),
    SceneNode(SceneNode),
    Buffer(Buffer),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Texture(_) => EntityKind::Texture,
            Entity::Program(_) => EntityKind::Program,
            Entity::Material(_) => EntityKind::Material,
            Entity::StaticMesh(_) => EntityKind::StaticMesh,
            Entity::SceneNode(_) => EntityKind::SceneNode,
            Entity::Buffer(_) => EntityKind::Buffer,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Texture(e) => &e.name,
            Entity::Program(e) => &e.name,
            Entity::Material(e) => &e.name,
            Entity::StaticMesh(e) => &e.name,
            Entity::SceneNode(e) => &e.name,
            Entity::Buffer(e) => &e.name,
        }
    }

    /// Ids this entity points at. Children are not references: they point
    /// back at their parent instead.
    pub fn references(&self) -> Vec<EntityId> {
        let ids = match self {
            Entity::Texture(_) | Entity::Buffer(_) => Vec::new(),
            Entity::Program(p) => p
                .inputs
                .iter()
                .chain(p.outputs.iter())
                .copied()
                .chain([p.scene_root])
                .collect(),
            Entity::Material(m) => m.textures.iter().copied().chain([m.program]).collect(),
            Entity::StaticMesh(m) => vec![m.points, m.normals, m.texcoords, m.indices, m.material],
            Entity::SceneNode(n) => vec![n.parent, n.mesh()],
        };
        ids.into_iter().filter(|id| !id.is_null()).collect()
    }
}

/// Typed access to one entity kind.
pub trait LevelEntity: Sized {
    const KIND: EntityKind;

    fn name(&self) -> &str;
    fn into_entity(self) -> Entity;
    fn from_entity(entity: &Entity) -> Option<&Self>;
    fn from_entity_mut(entity: &mut Entity) -> Option<&mut Self>;
}

macro_rules! level_entity {
    ($ty:ident) => {
        impl LevelEntity for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn name(&self) -> &str {
                &self.name
            }

            fn into_entity(self) -> Entity {
                Entity::$ty(self)
            }

            fn from_entity(entity: &Entity) -> Option<&Self> {
                match entity {
                    Entity::$ty(e) => Some(e),
                    _ => None,
                }
            }

            fn from_entity_mut(entity: &mut Entity) -> Option<&mut Self> {
                match entity {
                    Entity::$ty(e) => Some(e),
                    _ => None,
                }
            }
        }
    };
}

level_entity!(Texture);
level_entity!(Program);
level_entity!(Material);
level_entity!(StaticMesh);
level_entity!(SceneNode);
level_entity!(Buffer);
