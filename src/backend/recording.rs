//! A device that records what it is asked to do.
//!
//! [`RecordingDevice`] keeps every call as a [`Command`] and checks the same
//! things a GPU backend would: ids exist, resources are created once, passes
//! are properly nested, a texture is not sampled while it is being written,
//! the targets of a pass are 2D and share one size.
//! It never fails otherwise, so it doubles as a dry run for levels.

use std::collections::HashMap;

use anyhow::{Context, bail, ensure};

use crate::{
    backend::{Device, DrawCall, PassDescriptor, RenderTarget},
    level::{Buffer, EntityId, Program, StaticMesh, Texture},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Resize([u32; 2]),
    CreateTexture { id: EntityId, name: String, size: [u32; 2] },
    CreateBuffer { id: EntityId, name: String, size: usize },
    CreateProgram { id: EntityId, name: String },
    CreateStaticMesh { id: EntityId, name: String },
    Destroy(EntityId),
    BeginFrame,
    BeginPass(PassDescriptor),
    Draw(DrawCall),
    EndPass,
    EndFrame,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resource {
    Texture,
    Buffer,
    Program,
    StaticMesh,
}

#[derive(Debug)]
pub struct RecordingDevice {
    shader_dir: String,
    size: [u32; 2],
    resources: HashMap<EntityId, Resource>,
    /// Size and cubemap flag of each texture.
    textures: HashMap<EntityId, ([u32; 2], bool)>,
    commands: Vec<Command>,
    in_frame: bool,
    current_pass: Option<PassDescriptor>,
}

impl RecordingDevice {
    pub fn new(size: [u32; 2]) -> Self {
        Self {
            shader_dir: "wgsl".to_string(),
            size,
            resources: HashMap::new(),
            textures: HashMap::new(),
            commands: Vec::new(),
            in_frame: false,
            current_pass: None,
        }
    }

    pub fn with_shader_dir(mut self, shader_dir: &str) -> Self {
        self.shader_dir = shader_dir.to_string();
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn passes(&self) -> Vec<&PassDescriptor> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass(pass) => Some(pass),
                _ => None,
            })
            .collect()
    }

    pub fn draws(&self) -> Vec<&DrawCall> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.resources.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.resources.len()
    }

    fn register(&mut self, id: EntityId, resource: Resource) -> anyhow::Result<()> {
        ensure!(!id.is_null(), "cannot create a resource for the null id");
        ensure!(
            !self.resources.contains_key(&id),
            "resource {} already exists",
            id
        );
        self.resources.insert(id, resource);
        Ok(())
    }

    fn expect(&self, id: EntityId, resource: Resource) -> anyhow::Result<()> {
        let found = self
            .resources
            .get(&id)
            .with_context(|| format!("unknown {:?} {}", resource, id))?;
        ensure!(
            *found == resource,
            "{} is a {:?}, expected a {:?}",
            id,
            found,
            resource
        );
        Ok(())
    }
}

impl Device for RecordingDevice {
    fn backend_name(&self) -> &str {
        "recording"
    }

    fn shader_dir(&self) -> &str {
        &self.shader_dir
    }

    fn size(&self) -> [u32; 2] {
        self.size
    }

    fn resize(&mut self, size: [u32; 2]) -> anyhow::Result<()> {
        ensure!(!self.in_frame, "resize during a frame");
        self.size = size;
        self.commands.push(Command::Resize(size));
        Ok(())
    }

    fn create_texture(&mut self, id: EntityId, texture: &Texture) -> anyhow::Result<()> {
        self.register(id, Resource::Texture)?;
        self.textures.insert(id, (texture.size, texture.cubemap));
        self.commands.push(Command::CreateTexture {
            id,
            name: texture.name.clone(),
            size: texture.size,
        });
        Ok(())
    }

    fn create_buffer(&mut self, id: EntityId, buffer: &Buffer) -> anyhow::Result<()> {
        self.register(id, Resource::Buffer)?;
        self.commands.push(Command::CreateBuffer {
            id,
            name: buffer.name.clone(),
            size: buffer.size_in_bytes(),
        });
        Ok(())
    }

    fn create_program(&mut self, id: EntityId, program: &Program) -> anyhow::Result<()> {
        ensure!(
            !program.vertex_source.trim().is_empty() && !program.fragment_source.trim().is_empty(),
            "program {} has an empty shader stage",
            program.name
        );
        for texture in program.inputs.iter().chain(&program.outputs) {
            self.expect(*texture, Resource::Texture)?;
        }
        self.register(id, Resource::Program)?;
        self.commands.push(Command::CreateProgram {
            id,
            name: program.name.clone(),
        });
        Ok(())
    }

    fn create_static_mesh(&mut self, id: EntityId, mesh: &StaticMesh) -> anyhow::Result<()> {
        for buffer in [mesh.points, mesh.normals, mesh.texcoords, mesh.indices] {
            self.expect(buffer, Resource::Buffer)?;
        }
        self.register(id, Resource::StaticMesh)?;
        self.commands.push(Command::CreateStaticMesh {
            id,
            name: mesh.name.clone(),
        });
        Ok(())
    }

    fn destroy(&mut self, id: EntityId) -> anyhow::Result<()> {
        ensure!(!self.in_frame, "destroy during a frame");
        if self.resources.remove(&id).is_none() {
            bail!("destroying unknown resource {}", id);
        }
        self.textures.remove(&id);
        self.commands.push(Command::Destroy(id));
        Ok(())
    }

    fn begin_frame(&mut self) -> anyhow::Result<()> {
        ensure!(!self.in_frame, "begin_frame inside a frame");
        self.in_frame = true;
        self.commands.push(Command::BeginFrame);
        Ok(())
    }

    fn begin_pass(&mut self, pass: &PassDescriptor) -> anyhow::Result<()> {
        ensure!(self.in_frame, "begin_pass outside a frame");
        ensure!(self.current_pass.is_none(), "begin_pass inside a pass");
        ensure!(!pass.attachments.is_empty(), "a pass needs at least one attachment");
        self.expect(pass.program, Resource::Program)?;
        let mut sizes = Vec::with_capacity(pass.attachments.len());
        for target in pass.targets() {
            match target {
                RenderTarget::Screen => sizes.push(self.size),
                RenderTarget::Texture(id) => {
                    self.expect(id, Resource::Texture)?;
                    let (size, cubemap) = self
                        .textures
                        .get(&id)
                        .copied()
                        .with_context(|| format!("unknown texture {}", id))?;
                    ensure!(!cubemap, "cubemap {} cannot be a render target", id);
                    sizes.push(size);
                }
            }
        }
        ensure!(
            sizes.windows(2).all(|pair| pair[0] == pair[1]),
            "render targets of one pass must have the same size, got {:?}",
            sizes
        );
        self.current_pass = Some(pass.clone());
        self.commands.push(Command::BeginPass(pass.clone()));
        Ok(())
    }

    fn draw(&mut self, draw: &DrawCall) -> anyhow::Result<()> {
        let pass = self.current_pass.as_ref().context("draw outside a pass")?;
        ensure!(
            draw.program == pass.program,
            "draw with program {} inside the pass of {}",
            draw.program,
            pass.program
        );
        for texture in &draw.textures {
            ensure!(
                !pass.targets().any(|t| t == RenderTarget::Texture(*texture)),
                "texture {} is sampled while it is a render target",
                texture
            );
        }
        self.expect(draw.mesh, Resource::StaticMesh)?;
        for texture in &draw.textures {
            self.expect(*texture, Resource::Texture)?;
        }
        self.commands.push(Command::Draw(draw.clone()));
        Ok(())
    }

    fn end_pass(&mut self) -> anyhow::Result<()> {
        ensure!(self.current_pass.take().is_some(), "end_pass without a pass");
        self.commands.push(Command::EndPass);
        Ok(())
    }

    fn end_frame(&mut self) -> anyhow::Result<()> {
        ensure!(self.in_frame, "end_frame outside a frame");
        ensure!(self.current_pass.is_none(), "end_frame inside a pass");
        self.in_frame = false;
        self.commands.push(Command::EndFrame);
        Ok(())
    }
}
