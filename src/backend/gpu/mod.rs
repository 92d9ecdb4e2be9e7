//! wgpu implementation of [`Device`].
//!
//! Passes are recorded lazily: `begin_pass` and `draw` only queue work, the
//! render pass is encoded in `end_pass` once every draw of the pass is known.
//! That keeps the uniform staging buffer to a single upload per pass.

use std::{collections::HashMap, iter, sync::Arc, time::Duration};

use anyhow::{Context, bail, ensure};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    backend::{Device, DrawCall, PassDescriptor, RenderTarget},
    config::EngineConfig,
    level::{Buffer, BufferUsage, EntityId, Program, StaticMesh, Texture},
};

pub(crate) mod context;
mod pipeline;
mod texture;

use context::{GpuContext, Presentation};
use pipeline::{PipelineDesc, TextureSlot, UniformRaw};
use texture::GpuTexture;

/// Bytes of one packed per-draw uniform block.
pub const UNIFORM_SIZE: u64 = std::mem::size_of::<UniformRaw>() as u64;

// WGSL uniform structs are laid out in 16 byte rows.
const _: () = assert!(UNIFORM_SIZE % 16 == 0);

/// Distance between two per-draw uniform slices. Slices are bound with
/// dynamic offsets, so the block size is rounded up to `alignment`.
pub fn uniform_stride(alignment: u32) -> u64 {
    let alignment = u64::from(alignment.max(1));
    UNIFORM_SIZE.div_ceil(alignment) * alignment
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: u32,
}

struct GpuProgram {
    name: String,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
}

struct GpuMesh {
    buffers: [EntityId; 3],
    indices: EntityId,
    topology: wgpu::PrimitiveTopology,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: EntityId,
    color_formats: Vec<wgpu::TextureFormat>,
    textures: Vec<TextureSlot>,
    topology: wgpu::PrimitiveTopology,
}

struct CachedPipeline {
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    surface_texture: Option<wgpu::SurfaceTexture>,
    screen_view: wgpu::TextureView,
}

struct PendingPass {
    desc: PassDescriptor,
    draws: Vec<DrawCall>,
}

pub struct WgpuDevice {
    ctx: GpuContext,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_stride: u64,
    textures: HashMap<EntityId, GpuTexture>,
    buffers: HashMap<EntityId, GpuBuffer>,
    programs: HashMap<EntityId, GpuProgram>,
    meshes: HashMap<EntityId, GpuMesh>,
    pipelines: HashMap<PipelineKey, CachedPipeline>,
    depth: HashMap<[u32; 2], GpuTexture>,
    frame: Option<Frame>,
    pass: Option<PendingPass>,
}

impl WgpuDevice {
    /// Opens a device presenting to `window`.
    pub fn new(config: &EngineConfig, window: Arc<Window>) -> anyhow::Result<Self> {
        let ctx = futures::executor::block_on(GpuContext::new(
            config.graphics_api,
            Some(window),
            config.window_size,
        ))?;
        Ok(Self::from_context(ctx))
    }

    /// Opens a device rendering into an offscreen target of
    /// `config.window_size`. See [`WgpuDevice::read_screen`].
    pub fn headless(config: &EngineConfig) -> anyhow::Result<Self> {
        let ctx = futures::executor::block_on(GpuContext::new(
            config.graphics_api,
            None,
            config.window_size,
        ))?;
        Ok(Self::from_context(ctx))
    }

    fn from_context(ctx: GpuContext) -> Self {
        let uniform_layout = pipeline::uniform_layout(&ctx.device);
        let uniform_stride = uniform_stride(ctx.device.limits().min_uniform_buffer_offset_alignment);
        Self {
            ctx,
            uniform_layout,
            uniform_stride,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            pipelines: HashMap::new(),
            depth: HashMap::new(),
            frame: None,
            pass: None,
        }
    }

    pub fn adapter_backend(&self) -> wgpu::Backend {
        self.ctx.backend
    }

    pub fn request_redraw(&self) {
        self.ctx.request_redraw();
    }

    /// Copies the headless color target back to the CPU.
    pub fn read_screen(&self) -> anyhow::Result<image::RgbaImage> {
        let Presentation::Headless { target } = &self.ctx.presentation else {
            bail!("read_screen needs a headless device");
        };
        ensure!(self.frame.is_none(), "read_screen during a frame");
        let [width, height] = target.size;
        let unpadded = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let output_buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            label: Some("readback"),
            mapped_at_creation: false,
        });
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let pixels = futures::executor::block_on(async {
            let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
            buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
                // The receiver is awaited below.
                let _ = tx.send(result);
            });
            self.ctx
                .device
                .poll(wgpu::PollType::Wait {
                    submission_index: None,
                    timeout: Some(Duration::from_secs(3)),
                })
                .context("waiting for the readback failed")?;
            rx.receive()
                .await
                .context("readback channel closed")?
                .context("could not map the readback buffer")?;
            let data = buffer_slice.get_mapped_range();
            let mut pixels = Vec::with_capacity((unpadded * height) as usize);
            for row in data.chunks_exact(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
            anyhow::Ok(pixels)
        })?;
        output_buffer.unmap();

        image::RgbaImage::from_raw(width, height, pixels).context("readback has the wrong size")
    }

    fn texture(&self, id: EntityId) -> anyhow::Result<&GpuTexture> {
        self.textures
            .get(&id)
            .with_context(|| format!("unknown texture {}", id))
    }

    fn buffer(&self, id: EntityId) -> anyhow::Result<&GpuBuffer> {
        self.buffers
            .get(&id)
            .with_context(|| format!("unknown buffer {}", id))
    }

    fn target_format(&self, target: RenderTarget) -> anyhow::Result<wgpu::TextureFormat> {
        match target {
            RenderTarget::Screen => Ok(self.ctx.screen_format()),
            RenderTarget::Texture(id) => Ok(self.texture(id)?.format),
        }
    }

    fn target_size(&self, target: RenderTarget) -> anyhow::Result<[u32; 2]> {
        match target {
            RenderTarget::Screen => Ok(self.ctx.size),
            RenderTarget::Texture(id) => Ok(self.texture(id)?.size),
        }
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> anyhow::Result<()> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self
            .programs
            .get(&key.program)
            .with_context(|| format!("unknown program {}", key.program))?;
        let texture_layout = pipeline::texture_layout(&self.ctx.device, &key.textures);
        let layout = self
            .ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&program.name),
                bind_group_layouts: &[Some(&self.uniform_layout), Some(&texture_layout)],
                immediate_size: 0,
            });
        let pipeline = pipeline::mk_render_pipeline(
            &self.ctx.device,
            &PipelineDesc {
                label: &program.name,
                layout: &layout,
                vertex: &program.vertex,
                fragment: &program.fragment,
                color_formats: &key.color_formats,
                topology: key.topology,
            },
        );
        log::debug!("created pipeline for {} ({:?})", program.name, key.color_formats);
        self.pipelines.insert(
            key.clone(),
            CachedPipeline {
                pipeline,
                texture_layout,
            },
        );
        Ok(())
    }

    /// Encodes a queued pass. Draws asking for a depth clear start a new
    /// render pass which keeps the color written so far.
    fn encode_pass(&mut self, pending: PendingPass) -> anyhow::Result<()> {
        let PendingPass { desc, draws } = pending;
        let targets: Vec<RenderTarget> = desc.targets().collect();
        for target in &targets {
            if let RenderTarget::Texture(id) = target {
                ensure!(!self.texture(*id)?.cubemap, "cubemap {} cannot be a render target", id);
            }
        }
        let size = self.target_size(targets[0])?;
        for target in &targets[1..] {
            ensure!(
                self.target_size(*target)? == size,
                "render targets of one pass must have the same size"
            );
        }
        let color_formats = targets
            .iter()
            .map(|t| self.target_format(*t))
            .collect::<anyhow::Result<Vec<_>>>()?;

        // Pipelines and bind groups first, so the render pass only borrows.
        let mut keys = Vec::with_capacity(draws.len());
        for draw in &draws {
            let mesh = self
                .meshes
                .get(&draw.mesh)
                .with_context(|| format!("unknown static mesh {}", draw.mesh))?;
            let textures = draw
                .textures
                .iter()
                .map(|id| {
                    self.texture(*id).map(|t| TextureSlot {
                        cubemap: t.cubemap,
                        filterable: t.filterable(),
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let key = PipelineKey {
                program: desc.program,
                color_formats: color_formats.clone(),
                textures,
                topology: mesh.topology,
            };
            self.ensure_pipeline(&key)?;
            keys.push(key);
        }

        if !self.depth.contains_key(&size) {
            let depth = GpuTexture::create_depth_texture(&self.ctx.device, size, "depth_texture");
            self.depth.insert(size, depth);
        }

        let stride = self.uniform_stride;
        let raw: Vec<u8> = draws
            .iter()
            .flat_map(|draw| {
                let mut slice = bytemuck::bytes_of(&UniformRaw::from_block(&draw.uniforms)).to_vec();
                slice.resize(stride as usize, 0);
                slice
            })
            .collect();
        let uniform_buffer = (!raw.is_empty()).then(|| {
            self.ctx
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Uniform Buffer"),
                    contents: &raw,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });
        let uniform_bind_group = uniform_buffer.as_ref().map(|buffer| {
            self.ctx
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: 0,
                            size: wgpu::BufferSize::new(UNIFORM_SIZE),
                        }),
                    }],
                    label: Some("uniform_bind_group"),
                })
        });
        let mut texture_groups = Vec::with_capacity(draws.len());
        for (draw, key) in draws.iter().zip(&keys) {
            let mut entries = Vec::with_capacity(2 * draw.textures.len());
            for (i, id) in draw.textures.iter().enumerate() {
                let texture = self.texture(*id)?;
                entries.push(wgpu::BindGroupEntry {
                    binding: 2 * i as u32,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                });
                entries.push(wgpu::BindGroupEntry {
                    binding: 2 * i as u32 + 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                });
            }
            texture_groups.push(self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.pipelines[key].texture_layout,
                entries: &entries,
                label: Some("texture_bind_group"),
            }));
        }

        // Split at every depth clear after the first draw.
        let mut segments: Vec<std::ops::Range<usize>> = Vec::new();
        let mut start = 0;
        for (i, draw) in draws.iter().enumerate() {
            if i > start && draw.clear_depth {
                segments.push(start..i);
                start = i;
            }
        }
        segments.push(start..draws.len());

        let frame = self.frame.as_mut().context("end_pass outside a frame")?;
        let depth = &self.depth[&size];
        for (n, segment) in segments.into_iter().enumerate() {
            let first = n == 0;
            let views = targets
                .iter()
                .map(|target| match target {
                    RenderTarget::Screen => Ok(&frame.screen_view),
                    RenderTarget::Texture(id) => self
                        .textures
                        .get(id)
                        .map(|t| &t.view)
                        .with_context(|| format!("unknown texture {}", id)),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = views
                .iter()
                .zip(&desc.attachments)
                .map(|(view, attachment)| {
                    let load = match (first, attachment.clear) {
                        (true, Some([r, g, b, a])) => wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        _ => wgpu::LoadOp::Load,
                    };
                    Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load,
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })
                })
                .collect();
            let clear_depth = if first {
                desc.clear_depth || draws.get(segment.start).is_some_and(|d| d.clear_depth)
            } else {
                true
            };
            let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: if clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            for i in segment {
                let draw = &draws[i];
                let mesh = &self.meshes[&draw.mesh];
                let cached = &self.pipelines[&keys[i]];
                let Some(uniforms) = &uniform_bind_group else {
                    break;
                };
                render_pass.set_pipeline(&cached.pipeline);
                render_pass.set_bind_group(0, uniforms, &[(i as u64 * stride) as u32]);
                render_pass.set_bind_group(1, &texture_groups[i], &[]);
                for (slot, id) in mesh.buffers.iter().enumerate() {
                    let buffer = self
                        .buffers
                        .get(id)
                        .with_context(|| format!("unknown buffer {}", id))?;
                    render_pass.set_vertex_buffer(slot as u32, buffer.buffer.slice(..));
                }
                let indices = self
                    .buffers
                    .get(&mesh.indices)
                    .with_context(|| format!("unknown buffer {}", mesh.indices))?;
                render_pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..indices.len, 0, 0..1);
            }
        }
        Ok(())
    }
}

impl Device for WgpuDevice {
    fn backend_name(&self) -> &str {
        "wgpu"
    }

    fn shader_dir(&self) -> &str {
        "wgsl"
    }

    fn size(&self) -> [u32; 2] {
        self.ctx.size
    }

    fn resize(&mut self, size: [u32; 2]) -> anyhow::Result<()> {
        ensure!(self.frame.is_none(), "resize during a frame");
        self.ctx.resize(size);
        self.depth.clear();
        Ok(())
    }

    fn create_texture(&mut self, id: EntityId, texture: &Texture) -> anyhow::Result<()> {
        ensure!(!self.textures.contains_key(&id), "texture {} already exists", id);
        let gpu = GpuTexture::from_level(&self.ctx.device, &self.ctx.queue, texture)?;
        self.textures.insert(id, gpu);
        Ok(())
    }

    fn create_buffer(&mut self, id: EntityId, buffer: &Buffer) -> anyhow::Result<()> {
        ensure!(!self.buffers.contains_key(&id), "buffer {} already exists", id);
        let usage = match buffer.usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        // Zero sized buffers are not allowed, an empty mesh gets one padding word.
        let bytes = buffer.as_bytes();
        let contents: &[u8] = if bytes.is_empty() { &[0; 4] } else { bytes };
        let gpu = self
            .ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&buffer.name),
                contents,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            });
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer: gpu,
                len: buffer.len() as u32,
            },
        );
        Ok(())
    }

    fn create_program(&mut self, id: EntityId, program: &Program) -> anyhow::Result<()> {
        ensure!(!self.programs.contains_key(&id), "program {} already exists", id);
        if program.geometry_source.is_some() {
            bail!("program {}: wgsl has no geometry stage", program.name);
        }
        let module = |stage: &str, source: &str| {
            self.ctx
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&format!("{}.{}", program.shader, stage)),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
        };
        let vertex = module("vert", &program.vertex_source);
        let fragment = module("frag", &program.fragment_source);
        self.programs.insert(
            id,
            GpuProgram {
                name: program.name.clone(),
                vertex,
                fragment,
            },
        );
        Ok(())
    }

    fn create_static_mesh(&mut self, id: EntityId, mesh: &StaticMesh) -> anyhow::Result<()> {
        ensure!(!self.meshes.contains_key(&id), "static mesh {} already exists", id);
        for buffer in [mesh.points, mesh.normals, mesh.texcoords, mesh.indices] {
            self.buffer(buffer)?;
        }
        self.meshes.insert(
            id,
            GpuMesh {
                buffers: [mesh.points, mesh.normals, mesh.texcoords],
                indices: mesh.indices,
                topology: pipeline::topology(mesh.primitive),
            },
        );
        Ok(())
    }

    fn destroy(&mut self, id: EntityId) -> anyhow::Result<()> {
        ensure!(self.frame.is_none(), "destroy during a frame");
        if let Some(texture) = self.textures.remove(&id) {
            texture.texture.destroy();
        } else if let Some(buffer) = self.buffers.remove(&id) {
            buffer.buffer.destroy();
        } else if self.programs.remove(&id).is_some() {
            self.pipelines.retain(|key, _| key.program != id);
        } else if self.meshes.remove(&id).is_none() {
            bail!("destroying unknown resource {}", id);
        }
        Ok(())
    }

    fn begin_frame(&mut self) -> anyhow::Result<()> {
        ensure!(self.frame.is_none(), "begin_frame inside a frame");
        let (surface_texture, screen_view) = match &self.ctx.presentation {
            Presentation::Surface { surface, .. } => {
                let output = match surface.get_current_texture() {
                    wgpu::CurrentSurfaceTexture::Success(texture)
                    | wgpu::CurrentSurfaceTexture::Suboptimal(texture) => texture,
                    other => bail!("could not acquire the next surface texture: {:?}", other),
                };
                let view = output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(output), view)
            }
            Presentation::Headless { target } => (
                None,
                target
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()),
            ),
        };
        let encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        self.frame = Some(Frame {
            encoder,
            surface_texture,
            screen_view,
        });
        Ok(())
    }

    fn begin_pass(&mut self, pass: &PassDescriptor) -> anyhow::Result<()> {
        ensure!(self.frame.is_some(), "begin_pass outside a frame");
        ensure!(self.pass.is_none(), "begin_pass inside a pass");
        ensure!(!pass.attachments.is_empty(), "a pass needs at least one attachment");
        ensure!(
            self.programs.contains_key(&pass.program),
            "unknown program {}",
            pass.program
        );
        self.pass = Some(PendingPass {
            desc: pass.clone(),
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw(&mut self, draw: &DrawCall) -> anyhow::Result<()> {
        let pass = self.pass.as_mut().context("draw outside a pass")?;
        ensure!(
            draw.program == pass.desc.program,
            "draw with program {} inside the pass of {}",
            draw.program,
            pass.desc.program
        );
        for texture in &draw.textures {
            ensure!(
                !pass.desc.targets().any(|t| t == RenderTarget::Texture(*texture)),
                "texture {} is sampled while it is a render target",
                texture
            );
        }
        pass.draws.push(draw.clone());
        Ok(())
    }

    fn end_pass(&mut self) -> anyhow::Result<()> {
        let pending = self.pass.take().context("end_pass without a pass")?;
        self.encode_pass(pending)
    }

    fn end_frame(&mut self) -> anyhow::Result<()> {
        self.pass = None;
        let frame = self.frame.take().context("end_frame outside a frame")?;
        self.ctx.queue.submit(iter::once(frame.encoder.finish()));
        if let Some(output) = frame.surface_texture {
            output.present();
        }
        Ok(())
    }
}
