//! Bind group layouts, the uniform block and render pipeline creation.
//!
//! Every program sees the same interface:
//!
//! - group 0, binding 0: [`UniformRaw`] (dynamic offset, one slice per draw)
//! - group 1, bindings 2n / 2n+1: texture n and its sampler
//! - vertex buffers: 0 position `vec3`, 1 normal `vec3`, 2 texcoord `vec2`
//!
//! WGSL sources declare a matching `struct Uniforms` and use `vs_main` /
//! `fs_main` as entry points.

use cgmath::Matrix4;

use crate::{
    level::Primitive,
    uniform::{self, UniformBlock, UniformValue},
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Number of `vec4` slots for program specific uniforms.
pub const PARAM_SLOTS: usize = 8;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformRaw {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub camera_front: [f32; 4],
    pub camera_right: [f32; 4],
    pub camera_up: [f32; 4],
    pub light_position: [f32; 4],
    pub light_color: [f32; 4],
    /// x: time, y: delta time.
    pub time: [f32; 4],
    /// Non built-in uniforms in declaration order, one or more slots each.
    pub params: [[f32; 4]; PARAM_SLOTS],
}

impl UniformRaw {
    /// Packs a resolved block. Undeclared built-ins stay zero.
    pub fn from_block(block: &UniformBlock) -> Self {
        let mut raw: UniformRaw = bytemuck::Zeroable::zeroed();
        let mut slot = 0;
        for (name, value) in block.iter() {
            match (name, value) {
                (uniform::PROJECTION, UniformValue::Mat4(m)) => {
                    raw.projection = (OPENGL_TO_WGPU_MATRIX * Matrix4::from(*m)).into()
                }
                (uniform::VIEW, UniformValue::Mat4(m)) => raw.view = *m,
                (uniform::MODEL, UniformValue::Mat4(m)) => raw.model = *m,
                (uniform::CAMERA_POSITION, UniformValue::Vec3(v)) => raw.camera_position = extend(*v),
                (uniform::CAMERA_FRONT, UniformValue::Vec3(v)) => raw.camera_front = extend(*v),
                (uniform::CAMERA_RIGHT, UniformValue::Vec3(v)) => raw.camera_right = extend(*v),
                (uniform::CAMERA_UP, UniformValue::Vec3(v)) => raw.camera_up = extend(*v),
                (uniform::LIGHT_POSITION, UniformValue::Vec3(v)) => raw.light_position = extend(*v),
                (uniform::LIGHT_COLOR, UniformValue::Vec3(v)) => raw.light_color = extend(*v),
                (uniform::TIME, UniformValue::Float(t)) => raw.time[0] = *t,
                (uniform::DELTA_TIME, UniformValue::Float(dt)) => raw.time[1] = *dt,
                (_, value) => {
                    for row in param_rows(value) {
                        if slot == PARAM_SLOTS {
                            log::warn!("uniform {} does not fit in the parameter block", name);
                            break;
                        }
                        raw.params[slot] = row;
                        slot += 1;
                    }
                }
            }
        }
        raw
    }
}

fn extend(v: [f32; 3]) -> [f32; 4] {
    [v[0], v[1], v[2], 0.0]
}

fn param_rows(value: &UniformValue) -> Vec<[f32; 4]> {
    match value {
        UniformValue::Int(i) => vec![[*i as f32, 0.0, 0.0, 0.0]],
        UniformValue::Float(f) => vec![[*f, 0.0, 0.0, 0.0]],
        UniformValue::Vec2([x, y]) => vec![[*x, *y, 0.0, 0.0]],
        UniformValue::Vec3(v) => vec![extend(*v)],
        UniformValue::Vec4(v) => vec![*v],
        UniformValue::Mat4(m) => m.to_vec(),
    }
}

pub fn uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<UniformRaw>() as u64),
            },
            count: None,
        }],
        label: Some("uniform_bind_group_layout"),
    })
}

/// Shape of one bound texture, as far as the layout cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSlot {
    pub cubemap: bool,
    pub filterable: bool,
}

/// Texture/sampler pairs for `slots`, in order.
pub fn texture_layout(device: &wgpu::Device, slots: &[TextureSlot]) -> wgpu::BindGroupLayout {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = slots
        .iter()
        .enumerate()
        .flat_map(|(i, slot)| {
            [
                wgpu::BindGroupLayoutEntry {
                    binding: 2 * i as u32,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: if slot.cubemap {
                            wgpu::TextureViewDimension::Cube
                        } else {
                            wgpu::TextureViewDimension::D2
                        },
                        sample_type: wgpu::TextureSampleType::Float {
                            filterable: slot.filterable,
                        },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2 * i as u32 + 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(if slot.filterable {
                        wgpu::SamplerBindingType::Filtering
                    } else {
                        wgpu::SamplerBindingType::NonFiltering
                    }),
                    count: None,
                },
            ]
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &entries,
        label: Some("texture_bind_group_layout"),
    })
}

pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 3] {
    const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    const NORMAL: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
    const TEXCOORD: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x2];
    [
        wgpu::VertexBufferLayout {
            array_stride: 3 * std::mem::size_of::<f32>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION,
        },
        wgpu::VertexBufferLayout {
            array_stride: 3 * std::mem::size_of::<f32>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &NORMAL,
        },
        wgpu::VertexBufferLayout {
            array_stride: 2 * std::mem::size_of::<f32>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &TEXCOORD,
        },
    ]
}

pub fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
    }
}

pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub layout: &'a wgpu::PipelineLayout,
    pub vertex: &'a wgpu::ShaderModule,
    pub fragment: &'a wgpu::ShaderModule,
    pub color_formats: &'a [wgpu::TextureFormat],
    pub topology: wgpu::PrimitiveTopology,
}

pub fn mk_render_pipeline(device: &wgpu::Device, desc: &PipelineDesc) -> wgpu::RenderPipeline {
    let targets: Vec<Option<wgpu::ColorTargetState>> = desc
        .color_formats
        .iter()
        .map(|format| {
            Some(wgpu::ColorTargetState {
                format: *format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })
        })
        .collect();
    let vertex_layouts = vertex_layouts();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.vertex,
            entry_point: Some("vs_main"),
            buffers: &vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: desc.fragment,
            entry_point: Some("fs_main"),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: desc.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Cube programs are usually seen from the inside.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: crate::backend::gpu::texture::GpuTexture::DEPTH_FORMAT,
            depth_write_enabled: Some(true),
            depth_compare: Some(wgpu::CompareFunction::LessEqual),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}
