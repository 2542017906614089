use super::{ContextId, GpuError, GpuHandle};

/// Texture creation parameters.
///
/// `pixels` is tightly packed RGBA8. `None` allocates uninitialized storage
/// (render-target textures).
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub mipmaps: bool,
    pub render_attachment: bool,
    pub pixels: Option<&'a [u8]>,
}

/// Shader program creation parameters.
///
/// `textures` are bound to consecutive texture units in order, starting at 0.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    pub vertex: &'a str,
    pub fragment: &'a str,
    pub textures: &'a [GpuHandle],
}

/// Off-screen framebuffer parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub color: GpuHandle,
    pub width: u32,
    pub height: u32,
    pub depth: bool,
    pub stencil: bool,
}

/// Linear RGBA clear color.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ClearColor {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Screen-aligned quad in normalized surface coordinates.
///
/// Origin is the top-left corner, +Y down, the full surface spans `0..1`
/// on both axes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QuadRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl QuadRect {
    pub const FULL: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open containment test in normalized coordinates.
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// Converts to a pixel rect `(x, y, w, h)` for a surface of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (w, h) = (width as f32, height as f32);
        let x = (self.x * w).clamp(0.0, w);
        let y = (self.y * h).clamp(0.0, h);
        let x2 = ((self.x + self.width) * w).clamp(0.0, w);
        let y2 = ((self.y + self.height) * h).clamp(0.0, h);
        (x as u32, y as u32, (x2 - x) as u32, (y2 - y) as u32)
    }
}

/// A live GPU context, owned by the render thread.
///
/// Creation methods return a handle that is only valid for [`context_id`](Self::context_id).
/// Delete methods must tolerate unknown handles (no-op) so that destroying an
/// already-destroyed resource is harmless.
pub trait GpuDevice {
    /// Identity of this context.
    fn context_id(&self) -> ContextId;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<GpuHandle, GpuError>;
    fn delete_texture(&mut self, handle: GpuHandle);

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<GpuHandle, GpuError>;
    fn delete_program(&mut self, handle: GpuHandle);

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<GpuHandle, GpuError>;
    fn delete_framebuffer(&mut self, handle: GpuHandle);

    /// Binds an off-screen framebuffer, or the surface when `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<GpuHandle>) -> Result<(), GpuError>;

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Clears the bound framebuffer.
    fn clear(&mut self, color: ClearColor);

    /// Draws `texture` onto a screen-aligned quad of the bound framebuffer.
    fn draw_textured_quad(&mut self, texture: GpuHandle, rect: QuadRect) -> Result<(), GpuError>;

    /// Starts recording a frame. A failure means the frame must be skipped.
    fn begin_frame(&mut self) -> Result<(), GpuError> {
        Ok(())
    }

    /// Submits and presents the recorded frame.
    fn end_frame(&mut self) {}

    /// Reconfigures the presentation surface after a size change.
    fn resize_surface(&mut self, width: u32, height: u32) {
        let _ = (width, height);
    }
}
