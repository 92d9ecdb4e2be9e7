//! GPU side of level textures.
//!
//! Level textures come in any [`TextureFormat`]; the GPU only offers a subset
//! of those layouts. Three channel data is widened to four, 16 bit integer
//! data is uploaded as half floats and BGR(A) data with wide elements is
//! swizzled to RGB(A) on upload.

use anyhow::ensure;

use crate::{
    level::{PixelElementSize, PixelStructure, Texture, TextureFormat},
    resources::texture::f32_to_f16_bits,
};

#[derive(Debug)]
pub(crate) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub format: wgpu::TextureFormat,
    pub size: [u32; 2],
    pub cubemap: bool,
}

impl GpuTexture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Creates the GPU texture for a level texture and uploads its pixels.
    pub fn from_level(device: &wgpu::Device, queue: &wgpu::Queue, texture: &Texture) -> anyhow::Result<Self> {
        let format = gpu_format(texture.format);
        let layers = texture.face_count() as u32;
        let size = wgpu::Extent3d {
            width: texture.size[0],
            height: texture.size[1],
            depth_or_array_layers: layers,
        };
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if !texture.cubemap {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
        }
        let gpu = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&texture.name),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });

        if !texture.pixels.is_empty() {
            let pixels = gpu_pixels(texture.format, &texture.pixels);
            let bytes_per_pixel = format.block_copy_size(None).unwrap_or(4);
            ensure!(
                pixels.len() == (bytes_per_pixel * size.width * size.height * layers) as usize,
                "texture {} has {} bytes after conversion",
                texture.name,
                pixels.len()
            );
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &gpu,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                },
                &pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_pixel * size.width),
                    rows_per_image: Some(size.height),
                },
                size,
            );
        }

        let view = gpu.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&texture.name),
            dimension: Some(if texture.cubemap {
                wgpu::TextureViewDimension::Cube
            } else {
                wgpu::TextureViewDimension::D2
            }),
            ..Default::default()
        });
        let sampler = create_sampler(device, is_filterable(format));
        Ok(Self {
            texture: gpu,
            view,
            sampler,
            format,
            size: texture.size,
            cubemap: texture.cubemap,
        })
    }

    /// Color target for the default framebuffer of a headless device.
    pub fn create_color_target(device: &wgpu::Device, size: [u32; 2], format: wgpu::TextureFormat, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size[0].max(1),
                height: size[1].max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_sampler(device, true);
        Self {
            texture,
            view,
            sampler,
            format,
            size,
            cubemap: false,
        }
    }

    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let extent = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
            format: Self::DEPTH_FORMAT,
            size,
            cubemap: false,
        }
    }

    pub fn filterable(&self) -> bool {
        is_filterable(self.format)
    }
}

fn create_sampler(device: &wgpu::Device, filterable: bool) -> wgpu::Sampler {
    let filter = if filterable {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

/// 32 bit float textures cannot be filtered without an optional feature.
pub(crate) fn is_filterable(format: wgpu::TextureFormat) -> bool {
    !matches!(
        format,
        wgpu::TextureFormat::R32Float | wgpu::TextureFormat::Rg32Float | wgpu::TextureFormat::Rgba32Float
    )
}

pub(crate) fn gpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    use wgpu::TextureFormat as F;
    match (format.element, format.structure.channels()) {
        (PixelElementSize::Byte, 1) => F::R8Unorm,
        (PixelElementSize::Byte, 2) => F::Rg8Unorm,
        (PixelElementSize::Byte, _) => match format.structure {
            PixelStructure::Bgr | PixelStructure::Bgra => F::Bgra8Unorm,
            _ => F::Rgba8Unorm,
        },
        (PixelElementSize::Short | PixelElementSize::Half, 1) => F::R16Float,
        (PixelElementSize::Short | PixelElementSize::Half, 2) => F::Rg16Float,
        (PixelElementSize::Short | PixelElementSize::Half, _) => F::Rgba16Float,
        (PixelElementSize::Float, 1) => F::R32Float,
        (PixelElementSize::Float, 2) => F::Rg32Float,
        (PixelElementSize::Float, _) => F::Rgba32Float,
    }
}

/// Converts level pixels into the layout of [`gpu_format`].
pub(crate) fn gpu_pixels(format: TextureFormat, pixels: &[u8]) -> Vec<u8> {
    let channels = format.structure.channels();
    let converted;
    let (pixels, element_bytes, one): (&[u8], usize, Vec<u8>) = match format.element {
        PixelElementSize::Byte => (pixels, 1, vec![u8::MAX]),
        PixelElementSize::Short => {
            let halves: Vec<u16> = pixels
                .chunks_exact(2)
                .map(|c| f32_to_f16_bits(u16::from_ne_bytes([c[0], c[1]]) as f32 / u16::MAX as f32))
                .collect();
            converted = bytemuck::cast_slice(&halves).to_vec();
            (&converted, 2, f32_to_f16_bits(1.0).to_ne_bytes().to_vec())
        }
        PixelElementSize::Half => (pixels, 2, f32_to_f16_bits(1.0).to_ne_bytes().to_vec()),
        PixelElementSize::Float => (pixels, 4, 1.0f32.to_ne_bytes().to_vec()),
    };

    // Byte BGR(A) maps onto Bgra8Unorm directly.
    let swizzle = element_bytes > 1 && matches!(format.structure, PixelStructure::Bgr | PixelStructure::Bgra);
    if channels < 3 || (channels == 4 && !swizzle) {
        return pixels.to_vec();
    }
    let stride = channels * element_bytes;
    let mut out = Vec::with_capacity(pixels.len() / stride * 4 * element_bytes);
    for pixel in pixels.chunks_exact(stride) {
        let channel = |i: usize| &pixel[i * element_bytes..(i + 1) * element_bytes];
        if swizzle {
            out.extend_from_slice(channel(2));
            out.extend_from_slice(channel(1));
            out.extend_from_slice(channel(0));
        } else {
            out.extend_from_slice(&pixel[..3 * element_bytes]);
        }
        if channels == 4 {
            out.extend_from_slice(channel(3));
        } else {
            out.extend_from_slice(&one);
        }
    }
    out
}
