//! Graphics backends.
//!
//! The renderer talks to the GPU only through [`Device`]. A device mirrors
//! the level's entities under the same [`EntityId`]s and executes a frame as
//! a sequence of passes, each holding draw calls.
//!
//! Two devices ship with the crate: [`gpu::WgpuDevice`] for real output
//! (Vulkan, Metal, DX12 or OpenGL picked at startup) and
//! [`recording::RecordingDevice`], which records and validates the command
//! stream without touching a GPU.

use crate::{
    level::{Buffer, EntityId, Level, Program, StaticMesh, Texture},
    uniform::UniformBlock,
};

pub mod recording;
pub mod gpu;

/// Where a color attachment writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The default framebuffer: the window surface, or the offscreen
    /// target of a headless device.
    Screen,
    Texture(EntityId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColorAttachment {
    pub target: RenderTarget,
    /// `Some` clears the target before the pass, `None` keeps its contents.
    pub clear: Option<[f64; 4]>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PassDescriptor {
    pub program: EntityId,
    /// One or more attachments, written together.
    pub attachments: Vec<ColorAttachment>,
    pub clear_depth: bool,
}

impl PassDescriptor {
    pub fn targets(&self) -> impl Iterator<Item = RenderTarget> + '_ {
        self.attachments.iter().map(|a| a.target)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub program: EntityId,
    pub mesh: EntityId,
    /// Bound in order, one texture/sampler pair each.
    pub textures: Vec<EntityId>,
    pub uniforms: UniformBlock,
    /// Clear depth before this draw.
    pub clear_depth: bool,
}

/// Capabilities the renderer needs from a graphics API.
///
/// Calls follow a fixed protocol: resources are created before use;
/// `begin_frame`, then any number of `begin_pass` / `draw`* / `end_pass`
/// groups, then `end_frame`. Devices report protocol violations as errors.
pub trait Device {
    fn backend_name(&self) -> &str;

    /// Subdirectory of `asset/shader/` holding sources for this device.
    fn shader_dir(&self) -> &str;

    /// Size of the default framebuffer.
    fn size(&self) -> [u32; 2];

    fn resize(&mut self, size: [u32; 2]) -> anyhow::Result<()>;

    fn create_texture(&mut self, id: EntityId, texture: &Texture) -> anyhow::Result<()>;

    fn create_buffer(&mut self, id: EntityId, buffer: &Buffer) -> anyhow::Result<()>;

    fn create_program(&mut self, id: EntityId, program: &Program) -> anyhow::Result<()>;

    fn create_static_mesh(&mut self, id: EntityId, mesh: &StaticMesh) -> anyhow::Result<()>;

    fn destroy(&mut self, id: EntityId) -> anyhow::Result<()>;

    fn begin_frame(&mut self) -> anyhow::Result<()>;

    fn begin_pass(&mut self, pass: &PassDescriptor) -> anyhow::Result<()>;

    fn draw(&mut self, draw: &DrawCall) -> anyhow::Result<()>;

    fn end_pass(&mut self) -> anyhow::Result<()>;

    fn end_frame(&mut self) -> anyhow::Result<()>;

    /// Creates every entity of `level`, dependencies first.
    fn upload_level(&mut self, level: &Level) -> anyhow::Result<()> {
        for id in level.textures() {
            self.create_texture(*id, level.texture(*id)?)?;
        }
        for id in level.buffers() {
            self.create_buffer(*id, level.buffer(*id)?)?;
        }
        for id in level.programs() {
            self.create_program(*id, level.program(*id)?)?;
        }
        for id in level.builtin_static_meshes().iter().chain(level.static_meshes()) {
            self.create_static_mesh(*id, level.static_mesh(*id)?)?;
        }
        Ok(())
    }

    /// Destroys everything [`upload_level`](Device::upload_level) created,
    /// dependents first. Stops at the first failure.
    fn release_level(&mut self, level: &Level) -> anyhow::Result<()> {
        for id in release_order(level) {
            self.destroy(id)?;
        }
        Ok(())
    }
}

/// Ids [`Device::upload_level`] creates for `level`, in the order they can
/// be destroyed.
pub fn release_order(level: &Level) -> Vec<EntityId> {
    let meshes = level.builtin_static_meshes();
    meshes
        .iter()
        .chain(level.static_meshes())
        .chain(level.programs())
        .chain(level.buffers())
        .chain(level.textures())
        .copied()
        .collect()
}
