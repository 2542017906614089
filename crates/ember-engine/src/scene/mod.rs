//! Scene contract consumed by the renderer.
//!
//! Scene-graph math, geometry and shading live outside this crate. A scene only
//! has to be able to draw itself into the bound framebuffer and to rebuild its
//! GPU state after a context loss.

mod color;
mod handle;

pub use color::ColorScene;
pub use handle::{SceneHandle, SceneId};

use crate::gpu::{GpuDevice, GpuError};
use crate::render::RenderTarget;

/// Per-frame timing handed to [`Scene::render`].
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SceneTime {
    /// Nanoseconds since rendering started.
    pub elapsed_nanos: u64,
    /// Seconds since the previous frame.
    pub delta: f64,
}

pub trait Scene: Send {
    /// Forgets cached GPU state (bound program, blend mode, ...).
    ///
    /// Called when the scene becomes current and after a resume.
    fn reset_gl_state(&mut self) {}

    fn update_projection_matrix(&mut self, width: u32, height: u32);

    /// Draws into the framebuffer the renderer has already bound.
    ///
    /// `target` is the off-screen target being rendered to, `None` for the surface.
    fn render(
        &mut self,
        gpu: &mut dyn GpuDevice,
        time: SceneTime,
        target: Option<&RenderTarget>,
    ) -> Result<(), GpuError>;

    /// Re-uploads the scene's own buffers into a fresh context.
    fn reload(&mut self, gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        let _ = gpu;
        Ok(())
    }

    /// Releases CPU-side state. The scene is not rendered again.
    fn destroy_scene(&mut self) {}
}
