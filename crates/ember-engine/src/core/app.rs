use crate::render::{RenderCore, Viewport};

use super::ctx::FrameCtx;

/// Per-renderer frame logic.
///
/// All callbacks run on the render thread with a live context.
pub trait RenderDelegate {
    /// Builds the initial scenes, render targets and resources.
    ///
    /// Runs once when the first context comes up, and again after a context
    /// loss when scene caching is disabled.
    fn init_scene(&mut self, core: &mut RenderCore) -> anyhow::Result<()> {
        let _ = core;
        Ok(())
    }

    /// Draws one frame. The default renders the current scene to the surface.
    fn on_render(&mut self, ctx: &mut FrameCtx<'_>) -> anyhow::Result<()> {
        ctx.render()?;
        Ok(())
    }

    /// Called after the surface size (or the viewport override) changed.
    fn on_resize(&mut self, core: &mut RenderCore, viewport: Viewport) {
        let _ = (core, viewport);
    }

    /// Primary pointer press at `(x, y)` surface pixels.
    fn on_pointer_down(&mut self, core: &mut RenderCore, x: f32, y: f32) {
        let _ = (core, x, y);
    }
}

/// Delegate that only draws the current scene.
#[derive(Debug, Default, Copy, Clone)]
pub struct DefaultDelegate;

impl RenderDelegate for DefaultDelegate {}
