use std::sync::Arc;

use anyhow::Context;
use winit::window::Window;

use crate::{backend::gpu::texture::GpuTexture, config::GraphicsApi};

/// Where the default framebuffer lives.
#[derive(Debug)]
pub(crate) enum Presentation {
    Surface {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    /// Offscreen color target for headless rendering, readable afterwards.
    Headless { target: GpuTexture },
}

/// Adapter, device and queue plus the default framebuffer.
#[derive(Debug)]
pub(crate) struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub presentation: Presentation,
    pub size: [u32; 2],
    pub backend: wgpu::Backend,
}

impl GpuContext {
    pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    pub async fn new(api: GraphicsApi, window: Option<Arc<Window>>, size: [u32; 2]) -> anyhow::Result<Self> {
        log::info!("WGPU setup ({:?})", api);
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: api.backends(),
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let surface = match &window {
            Some(window) => Some(
                instance
                    .create_surface(window.clone())
                    .context("could not create a surface for the window")?,
            ),
            None => None,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .context("no graphics adapter for the requested API")?;
        let backend = adapter.get_info().backend;
        log::info!("using adapter {:?} on {:?}", adapter.get_info().name, backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("frame-ngin device"),
                required_features: wgpu::Features::empty(),
                required_limits: if backend == wgpu::Backend::Gl {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                ..Default::default()
            })
            .await
            .context("could not open the graphics device")?;

        let size = match &window {
            Some(window) => {
                let inner = window.inner_size();
                [inner.width.max(1), inner.height.max(1)]
            }
            None => [size[0].max(1), size[1].max(1)],
        };

        let presentation = match (window, surface) {
            (Some(window), Some(surface)) => {
                let surface_caps = surface.get_capabilities(&adapter);
                // Shaders write linear colors and expect an sRGB surface.
                let surface_format = surface_caps
                    .formats
                    .iter()
                    .copied()
                    .find(|f| f.is_srgb())
                    .or_else(|| surface_caps.formats.first().copied())
                    .context("the surface supports no formats")?;
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format: surface_format,
                    width: size[0],
                    height: size[1],
                    present_mode: surface_caps.present_modes[0],
                    alpha_mode: surface_caps.alpha_modes[0],
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                surface.configure(&device, &config);
                Presentation::Surface {
                    window,
                    surface,
                    config,
                }
            }
            _ => Presentation::Headless {
                target: GpuTexture::create_color_target(&device, size, Self::HEADLESS_FORMAT, "headless target"),
            },
        };

        Ok(Self {
            device,
            queue,
            presentation,
            size,
            backend,
        })
    }

    pub fn screen_format(&self) -> wgpu::TextureFormat {
        match &self.presentation {
            Presentation::Surface { config, .. } => config.format,
            Presentation::Headless { target } => target.format,
        }
    }

    pub fn resize(&mut self, size: [u32; 2]) {
        if size[0] == 0 || size[1] == 0 {
            return;
        }
        self.size = size;
        match &mut self.presentation {
            Presentation::Surface {
                surface, config, ..
            } => {
                config.width = size[0];
                config.height = size[1];
                surface.configure(&self.device, config);
            }
            Presentation::Headless { target } => {
                *target = GpuTexture::create_color_target(&self.device, size, Self::HEADLESS_FORMAT, "headless target");
            }
        }
    }

    pub fn request_redraw(&self) {
        if let Presentation::Surface { window, .. } = &self.presentation {
            window.request_redraw();
        }
    }
}
