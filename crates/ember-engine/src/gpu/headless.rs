use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    ClearColor, ContextId, FramebufferDesc, GpuDevice, GpuError, GpuHandle, ProgramDesc, QuadRect,
    TextureDesc,
};

/// A recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Bind(Option<GpuHandle>),
    Viewport { x: u32, y: u32, width: u32, height: u32 },
    Clear(ClearColor),
    Quad { texture: GpuHandle, rect: QuadRect },
}

/// Shared record of the commands a [`HeadlessDevice`] received.
///
/// Stays readable after the device is handed to a renderer as a boxed trait object.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<DrawCommand>>>);

impl CommandLog {
    pub fn snapshot(&self) -> Vec<DrawCommand> {
        self.0.lock().clone()
    }

    pub fn take(&self) -> Vec<DrawCommand> {
        std::mem::take(&mut *self.0.lock())
    }

    fn push(&self, command: DrawCommand) {
        self.0.lock().push(command);
    }
}

#[derive(Debug, Clone, Copy)]
struct TextureInfo {
    width: u32,
    height: u32,
}

/// In-memory GPU context.
///
/// Object names are allocated from one counter starting at 1 and are never
/// reused within a context, which makes stale-handle bugs observable.
#[derive(Debug)]
pub struct HeadlessDevice {
    context: ContextId,
    next_name: u32,
    max_textures: Option<usize>,

    textures: BTreeMap<GpuHandle, TextureInfo>,
    programs: BTreeMap<GpuHandle, Vec<GpuHandle>>,
    framebuffers: BTreeMap<GpuHandle, FramebufferDesc>,

    bound: Option<GpuHandle>,
    commands: CommandLog,
    frames: u64,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self {
            context: ContextId::next(),
            next_name: 1,
            max_textures: None,
            textures: BTreeMap::new(),
            programs: BTreeMap::new(),
            framebuffers: BTreeMap::new(),
            bound: None,
            commands: CommandLog::default(),
            frames: 0,
        }
    }

    /// Fails texture creation once `limit` textures are alive.
    pub fn with_texture_limit(mut self, limit: usize) -> Self {
        self.max_textures = Some(limit);
        self
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_texture_live(&self, handle: GpuHandle) -> bool {
        self.textures.contains_key(&handle)
    }

    pub fn is_framebuffer_live(&self, handle: GpuHandle) -> bool {
        self.framebuffers.contains_key(&handle)
    }

    pub fn texture_size(&self, handle: GpuHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).map(|t| (t.width, t.height))
    }

    pub fn framebuffer(&self, handle: GpuHandle) -> Option<FramebufferDesc> {
        self.framebuffers.get(&handle).copied()
    }

    /// Texture units a program was linked against.
    pub fn program_textures(&self, handle: GpuHandle) -> Option<&[GpuHandle]> {
        self.programs.get(&handle).map(Vec::as_slice)
    }

    pub fn bound_framebuffer(&self) -> Option<GpuHandle> {
        self.bound
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn commands(&self) -> Vec<DrawCommand> {
        self.commands.snapshot()
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        self.commands.take()
    }

    pub fn command_log(&self) -> CommandLog {
        self.commands.clone()
    }

    fn allocate(&mut self) -> GpuHandle {
        let handle = GpuHandle::new(self.next_name);
        self.next_name = self.next_name.wrapping_add(1).max(1);
        handle
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for HeadlessDevice {
    fn context_id(&self) -> ContextId {
        self.context
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<GpuHandle, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        if let Some(limit) = self.max_textures {
            if self.textures.len() >= limit {
                return Err(GpuError::OutOfTextureUnits { limit });
            }
        }
        if let Some(pixels) = desc.pixels {
            let expected = desc.width as usize * desc.height as usize * 4;
            if pixels.len() != expected {
                return Err(GpuError::PixelDataSize {
                    name: desc.label.to_string(),
                    expected,
                    actual: pixels.len(),
                });
            }
        }

        let handle = self.allocate();
        self.textures.insert(
            handle,
            TextureInfo {
                width: desc.width,
                height: desc.height,
            },
        );
        Ok(handle)
    }

    fn delete_texture(&mut self, handle: GpuHandle) {
        self.textures.remove(&handle);
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<GpuHandle, GpuError> {
        if let Some(missing) = desc.textures.iter().find(|t| !self.textures.contains_key(t)) {
            return Err(GpuError::Link {
                name: desc.label.to_string(),
                reason: format!("texture {missing} is not alive"),
            });
        }
        let handle = self.allocate();
        self.programs.insert(handle, desc.textures.to_vec());
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
        let handle = self.allocate();
        self.framebuffers.insert(handle, *desc);
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
            let desc = self.framebuffers.get(&fb).ok_or(GpuError::UnknownHandle(fb))?;
            match self.textures.get(&desc.color) {
                Some(t) if t.width == desc.width && t.height == desc.height => {}
                _ => {
                    return Err(GpuError::IncompleteFramebuffer(format!(
                        "color attachment of {fb} no longer matches"
                    )));
                }
            }
        }
        self.bound = framebuffer;
        self.commands.push(DrawCommand::Bind(framebuffer));
        Ok(())
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.commands.push(DrawCommand::Viewport { x, y, width, height });
    }

    fn clear(&mut self, color: ClearColor) {
        self.commands.push(DrawCommand::Clear(color));
    }

    fn draw_textured_quad(&mut self, texture: GpuHandle, rect: QuadRect) -> Result<(), GpuError> {
        if !self.textures.contains_key(&texture) {
            return Err(GpuError::UnknownHandle(texture));
        }
        self.commands.push(DrawCommand::Quad { texture, rect });
        Ok(())
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }
}
