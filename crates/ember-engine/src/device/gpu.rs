use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use wgpu::SurfaceError;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::gpu::{
    ClearColor, ContextId, FramebufferDesc, GpuDevice, GpuError, GpuHandle, ProgramDesc, QuadRect,
    TextureDesc,
};

use super::blit::{Blit, OFFSCREEN_FORMAT, quad_vertices};
use super::init::GpuInit;

struct TextureEntry {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct DepthAttachment {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    stencil: bool,
}

struct FramebufferEntry {
    desc: FramebufferDesc,
    depth: Option<DepthAttachment>,
}

struct ProgramEntry {
    _module: wgpu::ShaderModule,
    _textures: Vec<GpuHandle>,
}

/// A frame between `begin_frame` and `end_frame`.
///
/// Holding the surface texture blocks acquisition of the next one, so a frame
/// is always finished promptly.
struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

/// Where draw calls currently land.
struct Target<'a> {
    view: &'a wgpu::TextureView,
    depth: Option<&'a DepthAttachment>,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

/// wgpu-backed context bound to one window.
///
/// Handles are plain integers into per-kind tables; every GPU command of a
/// frame is recorded into one encoder and submitted by `end_frame`.
pub struct WgpuDevice {
    context: ContextId,
    _window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    max_dimension: u32,
    blit: Blit,

    next_name: u32,
    textures: HashMap<GpuHandle, TextureEntry>,
    framebuffers: HashMap<GpuHandle, FramebufferEntry>,
    programs: HashMap<GpuHandle, ProgramEntry>,

    frame: Option<Frame>,
    bound: Option<GpuHandle>,
    viewport: Option<(u32, u32, u32, u32)>,
}

impl WgpuDevice {
    /// Creates a context for `window`. Each call yields a new [`ContextId`].
    pub async fn new(window: Arc<Window>, init: &GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ember device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps, init.prefer_srgb).context("no supported surface formats")?;
        let alpha_mode = init
            .alpha_mode
            .filter(|m| caps.alpha_modes.contains(m))
            .or_else(|| caps.alpha_modes.first().copied())
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let context = ContextId::next();
        let max_dimension = device.limits().max_texture_dimension_2d;
        let blit = Blit::new(&device);
        log::info!(
            "{context:?}: {} ({:?}), surface {format:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            size.width,
            size.height
        );

        Ok(Self {
            context,
            _window: window,
            surface,
            device,
            queue,
            config,
            max_dimension,
            blit,
            next_name: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            frame: None,
            bound: None,
            viewport: None,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn allocate(&mut self) -> GpuHandle {
        let handle = GpuHandle::new(self.next_name);
        self.next_name = self.next_name.wrapping_add(1).max(1);
        handle
    }

    /// Reconfigures after `Lost`/`Outdated`; every surface error skips the frame.
    fn recover_surface(&mut self, err: SurfaceError) -> GpuError {
        match err {
            SurfaceError::Lost | SurfaceError::Outdated => {
                if self.config.width > 0 && self.config.height > 0 {
                    self.surface.configure(&self.device, &self.config);
                }
            }
            SurfaceError::OutOfMemory => log::error!("surface out of memory"),
            SurfaceError::Timeout | SurfaceError::Other => {}
        }
        GpuError::Surface(err.to_string())
    }
}

fn target<'a>(
    bound: Option<GpuHandle>,
    frame_view: &'a wgpu::TextureView,
    surface: &wgpu::SurfaceConfiguration,
    textures: &'a HashMap<GpuHandle, TextureEntry>,
    framebuffers: &'a HashMap<GpuHandle, FramebufferEntry>,
) -> Result<Target<'a>, GpuError> {
    let Some(fb) = bound else {
        return Ok(Target {
            view: frame_view,
            depth: None,
            format: surface.format,
            width: surface.width,
            height: surface.height,
        });
    };
    let entry = framebuffers.get(&fb).ok_or(GpuError::UnknownHandle(fb))?;
    let color = textures
        .get(&entry.desc.color)
        .ok_or_else(|| GpuError::IncompleteFramebuffer(format!("color attachment of {fb} is gone")))?;
    Ok(Target {
        view: &color.view,
        depth: entry.depth.as_ref(),
        format: OFFSCREEN_FORMAT,
        width: entry.desc.width,
        height: entry.desc.height,
    })
}

impl GpuDevice for WgpuDevice {
    fn context_id(&self) -> ContextId {
        self.context
    }

    /// Mip chains are not generated; `mipmaps` textures get a single level.
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<GpuHandle, GpuError> {
        let (width, height) = (desc.width, desc.height);
        if width == 0 || height == 0 || width > self.max_dimension || height > self.max_dimension {
            return Err(GpuError::InvalidSize { width, height });
        }
        if let Some(pixels) = desc.pixels {
            let expected = width as usize * height as usize * 4;
            if pixels.len() != expected {
                return Err(GpuError::PixelDataSize {
                    name: desc.label.to_string(),
                    expected,
                    actual: pixels.len(),
                });
            }
        }

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.render_attachment {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage,
            view_formats: &[],
        });

        if let Some(pixels) = desc.pixels {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.blit.bind_group(&self.device, desc.label, &view);
        let handle = self.allocate();
        self.textures.insert(
            handle,
            TextureEntry {
                _texture: texture,
                view,
                bind_group,
                width,
                height,
            },
        );
        Ok(handle)
    }

    fn delete_texture(&mut self, handle: GpuHandle) {
        self.textures.remove(&handle);
    }

    /// Compiles `vertex` and `fragment` as one WGSL module.
    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<GpuHandle, GpuError> {
        if let Some(missing) = desc.textures.iter().find(|t| !self.textures.contains_key(t)) {
            return Err(GpuError::Link {
                name: desc.label.to_string(),
                reason: format!("texture {missing} is not alive"),
            });
        }
        let source = format!("{}\n{}", desc.vertex, desc.fragment);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let handle = self.allocate();
        self.programs.insert(
            handle,
            ProgramEntry {
                _module: module,
                _textures: desc.textures.to_vec(),
            },
        );
        Ok(handle)
    }

    fn delete_program(&mut self, handle: GpuHandle) {
        self.programs.remove(&handle);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<GpuHandle, GpuError> {
        let Some(color) = self.textures.get(&desc.color) else {
            return Err(GpuError::IncompleteFramebuffer(format!(
                "missing color attachment {}",
                desc.color
            )));
        };
        if color.width != desc.width || color.height != desc.height {
            return Err(GpuError::IncompleteFramebuffer(format!(
                "attachment is {}x{}, framebuffer is {}x{}",
                color.width, color.height, desc.width, desc.height
            )));
        }

        let depth = (desc.depth || desc.stencil).then(|| {
            let format = if desc.stencil {
                wgpu::TextureFormat::Depth24PlusStencil8
            } else {
                wgpu::TextureFormat::Depth32Float
            };
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("ember framebuffer depth"),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            DepthAttachment {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                _texture: texture,
                stencil: desc.stencil,
            }
        });

        let handle = self.allocate();
        self.framebuffers.insert(handle, FramebufferEntry { desc: *desc, depth });
        Ok(handle)
    }

    fn delete_framebuffer(&mut self, handle: GpuHandle) {
        self.framebuffers.remove(&handle);
        if self.bound == Some(handle) {
            self.bound = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<GpuHandle>) -> Result<(), GpuError> {
        if let Some(fb) = framebuffer {
            let entry = self.framebuffers.get(&fb).ok_or(GpuError::UnknownHandle(fb))?;
            match self.textures.get(&entry.desc.color) {
                Some(t) if t.width == entry.desc.width && t.height == entry.desc.height => {}
                _ => {
                    return Err(GpuError::IncompleteFramebuffer(format!(
                        "color attachment of {fb} no longer matches"
                    )));
                }
            }
        }
        self.bound = framebuffer;
        Ok(())
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = Some((x, y, width, height));
    }

    fn clear(&mut self, color: ClearColor) {
        let Some(frame) = self.frame.as_mut() else {
            log::trace!("clear outside a frame ignored");
            return;
        };
        let target = match target(self.bound, &frame.view, &self.config, &self.textures, &self.framebuffers) {
            Ok(target) => target,
            Err(err) => {
                log::warn!("clear skipped: {err}");
                return;
            }
        };

        let depth_stencil_attachment = target.depth.map(|d| wgpu::RenderPassDepthStencilAttachment {
            view: &d.view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: d.stencil.then_some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(0),
                store: wgpu::StoreOp::Store,
            }),
        });

        let _pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ember clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: f64::from(color.r),
                        g: f64::from(color.g),
                        b: f64::from(color.b),
                        a: f64::from(color.a),
                    }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }

    fn draw_textured_quad(&mut self, texture: GpuHandle, rect: QuadRect) -> Result<(), GpuError> {
        let format = match self.bound {
            Some(_) => OFFSCREEN_FORMAT,
            None => self.config.format,
        };
        let pipeline = self.blit.pipeline(&self.device, format).clone();

        let Some(frame) = self.frame.as_mut() else {
            return Err(GpuError::Surface("no frame in progress".into()));
        };
        let source = self.textures.get(&texture).ok_or(GpuError::UnknownHandle(texture))?;
        let target = target(self.bound, &frame.view, &self.config, &self.textures, &self.framebuffers)?;

        let (x, y, w, h) = self.viewport.unwrap_or((0, 0, target.width, target.height));
        let x = x.min(target.width);
        let y = y.min(target.height);
        let w = w.min(target.width - x);
        let h = h.min(target.height - y);
        if w == 0 || h == 0 {
            return Ok(());
        }

        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ember quad vbo"),
            contents: bytemuck::cast_slice(&quad_vertices(rect)),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let mut pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ember quad pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        debug_assert_eq!(target.format, format);
        pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &source.bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(self.blit.index_buffer().slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..Blit::index_count(), 0, 0..1);
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<(), GpuError> {
        if self.frame.take().is_some() {
            log::warn!("previous frame was never ended, discarding it");
        }
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => return Err(self.recover_surface(err)),
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ember frame encoder"),
            });

        self.bound = None;
        self.viewport = None;
        self.frame = Some(Frame {
            surface_texture,
            view,
            encoder,
        });
        Ok(())
    }

    fn end_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        drop(frame.view);
        frame.surface_texture.present();
    }

    /// A zero size only defers configuration.
    fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }
}

fn choose_surface_format(caps: &wgpu::SurfaceCapabilities, prefer_srgb: bool) -> Option<wgpu::TextureFormat> {
    let first = caps.formats.first().copied()?;
    if prefer_srgb {
        let preferred = [wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Rgba8UnormSrgb];
        if let Some(f) = preferred.into_iter().find(|f| caps.formats.contains(f)) {
            return Some(f);
        }
    }
    Some(first)
}
