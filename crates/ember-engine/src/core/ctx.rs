use crate::gpu::GpuError;
use crate::render::RenderCore;
use crate::time::FrameTime;

/// Per-frame context passed to `RenderDelegate::on_render`.
pub struct FrameCtx<'a> {
    pub core: &'a mut RenderCore,
    pub time: FrameTime,
}

impl<'a> FrameCtx<'a> {
    pub fn new(core: &'a mut RenderCore, time: FrameTime) -> Self {
        Self { core, time }
    }

    /// Renders the current scene into the current render target (or the surface).
    pub fn render(&mut self) -> Result<(), GpuError> {
        self.core.render(self.time.scene_time())
    }
}
