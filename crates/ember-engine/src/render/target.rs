use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::{ContextHandle, ContextId, FramebufferDesc, GpuDevice, GpuError, GpuHandle, RendererId};
use crate::resource::{GpuResource, Texture, TextureManager};

#[derive(Debug)]
struct TargetState {
    width: u32,
    height: u32,
    offset_x: u32,
    offset_y: u32,
    fullscreen: bool,
    depth: bool,
    stencil: bool,
    framebuffer: Option<ContextHandle>,
    /// Size changed since the framebuffer was allocated.
    stale: bool,
}

/// Off-screen framebuffer with a color texture.
///
/// The texture is registered with the texture manager before the framebuffer
/// is created. A fullscreen target follows the surface size; after a resize it
/// is marked stale and reallocated before it can be bound again.
#[derive(Debug)]
pub struct RenderTarget {
    name: String,
    texture: Arc<Texture>,
    state: Mutex<TargetState>,
}

impl RenderTarget {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        let name = name.into();
        Self {
            texture: Arc::new(Texture::render_target(format!("{name}.color"), width, height)),
            name,
            state: Mutex::new(TargetState {
                width,
                height,
                offset_x: 0,
                offset_y: 0,
                fullscreen: true,
                depth: true,
                stencil: false,
                framebuffer: None,
                stale: false,
            }),
        }
    }

    pub fn with_fullscreen(self, fullscreen: bool) -> Self {
        self.state.lock().fullscreen = fullscreen;
        self
    }

    pub fn with_offset(self, x: u32, y: u32) -> Self {
        {
            let mut state = self.state.lock();
            state.offset_x = x;
            state.offset_y = y;
        }
        self
    }

    pub fn with_depth(self, depth: bool) -> Self {
        self.state.lock().depth = depth;
        self
    }

    pub fn with_stencil(self, stencil: bool) -> Self {
        self.state.lock().stencil = stencil;
        self
    }

    pub fn with_mipmaps(mut self, mipmaps: bool) -> Self {
        let (w, h) = self.size();
        self.texture = Arc::new(
            Texture::render_target(format!("{}.color", self.name), w, h).with_mipmaps(mipmaps),
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    pub fn offset(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.offset_x, state.offset_y)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state.lock().fullscreen
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.state.lock().fullscreen = fullscreen;
    }

    pub fn has_depth(&self) -> bool {
        self.state.lock().depth
    }

    pub fn framebuffer(&self) -> Option<GpuHandle> {
        self.state.lock().framebuffer.map(|fb| fb.handle)
    }

    pub fn is_stale(&self) -> bool {
        self.state.lock().stale
    }

    /// Changes the size. The texture reports the new size immediately; the
    /// framebuffer is reallocated on the next `reallocate` or `bind`.
    pub fn set_size(&self, width: u32, height: u32) -> bool {
        let mut state = self.state.lock();
        if state.width == width && state.height == height {
            return false;
        }
        state.width = width;
        state.height = height;
        state.stale = state.framebuffer.is_some();
        self.texture.set_size(width, height);
        true
    }

    /// Registers the texture and creates the framebuffer. No-op if already created.
    pub fn create(
        &self,
        gpu: &mut dyn GpuDevice,
        textures: &TextureManager,
        owner: RendererId,
    ) -> Result<(), GpuError> {
        match self.framebuffer_in(gpu.context_id()) {
            Some(_) if !self.is_stale() => return Ok(()),
            Some(_) => return self.reallocate(gpu),
            None => {}
        }

        textures.task_add(self.texture.clone(), owner, gpu);
        self.texture.create(gpu)?;
        self.allocate_framebuffer(gpu)
    }

    /// Binds the framebuffer and sets the viewport to the target's rect.
    ///
    /// A stale target is reallocated first.
    pub fn bind(&self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        let context = gpu.context_id();
        let framebuffer = match self.framebuffer_in(context) {
            Some(fb) if !self.is_stale() => fb,
            Some(_) => {
                self.reallocate(gpu)?;
                self.framebuffer_in(context).ok_or(GpuError::NoContext)?
            }
            None => {
                return Err(GpuError::IncompleteFramebuffer(format!(
                    "render target `{}` is not created",
                    self.name
                )));
            }
        };

        gpu.bind_framebuffer(Some(framebuffer))?;
        let state = self.state.lock();
        gpu.set_viewport(state.offset_x, state.offset_y, state.width, state.height);
        Ok(())
    }

    pub fn unbind(&self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        gpu.bind_framebuffer(None)
    }

    /// Re-creates texture and framebuffer at the current size.
    pub fn reallocate(&self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        self.delete_framebuffer(gpu);
        self.texture.reload(gpu)?;
        self.allocate_framebuffer(gpu)
    }

    /// Deletes the framebuffer and unregisters the texture.
    pub fn remove(&self, gpu: &mut dyn GpuDevice, textures: &TextureManager) {
        self.delete_framebuffer(gpu);
        textures.task_remove(&self.texture, gpu);
    }

    /// Rebuilds the framebuffer in a fresh context.
    pub fn reload(
        &self,
        gpu: &mut dyn GpuDevice,
        textures: &TextureManager,
        owner: RendererId,
    ) -> Result<(), GpuError> {
        self.delete_framebuffer(gpu);
        self.create(gpu, textures, owner)
    }

    /// Forgets the framebuffer of a lost context.
    pub fn invalidate(&self, context: ContextId) -> bool {
        let mut state = self.state.lock();
        match state.framebuffer {
            Some(fb) if fb.context == context => {
                state.framebuffer = None;
                state.stale = false;
                true
            }
            _ => false,
        }
    }

    fn framebuffer_in(&self, context: ContextId) -> Option<GpuHandle> {
        self.state.lock().framebuffer.and_then(|fb| fb.in_context(context))
    }

    fn delete_framebuffer(&self, gpu: &mut dyn GpuDevice) {
        let taken = self.state.lock().framebuffer.take();
        if let Some(fb) = taken.and_then(|fb| fb.in_context(gpu.context_id())) {
            gpu.delete_framebuffer(fb);
        }
    }

    fn allocate_framebuffer(&self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        let color = self
            .texture
            .slot()
            .handle_in(gpu.context_id())
            .ok_or_else(|| GpuError::MissingTexture(self.texture.name().to_string()))?;

        let desc = {
            let state = self.state.lock();
            FramebufferDesc {
                color,
                width: state.width,
                height: state.height,
                depth: state.depth,
                stencil: state.stencil,
            }
        };
        let handle = gpu.create_framebuffer(&desc)?;

        let mut state = self.state.lock();
        state.framebuffer = Some(ContextHandle::new(gpu.context_id(), handle));
        state.stale = false;
        Ok(())
    }
}
