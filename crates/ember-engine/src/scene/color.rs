use std::sync::Arc;

use crate::gpu::{ClearColor, GpuDevice, GpuError, QuadRect};
use crate::render::RenderTarget;
use crate::resource::{GpuResource, Texture};

use super::{Scene, SceneTime};

/// Clears to a color and draws textured screen quads on top.
///
/// Quads whose texture has no handle in the current context are skipped.
#[derive(Debug)]
pub struct ColorScene {
    clear: ClearColor,
    quads: Vec<(Arc<Texture>, QuadRect)>,
    viewport: (u32, u32),
}

impl ColorScene {
    pub fn new(clear: ClearColor) -> Self {
        Self {
            clear,
            quads: Vec::new(),
            viewport: (0, 0),
        }
    }

    pub fn with_quad(mut self, texture: Arc<Texture>, rect: QuadRect) -> Self {
        self.quads.push((texture, rect));
        self
    }

    pub fn clear_color(&self) -> ClearColor {
        self.clear
    }

    pub fn set_clear_color(&mut self, clear: ClearColor) {
        self.clear = clear;
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}

impl Scene for ColorScene {
    fn update_projection_matrix(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn render(
        &mut self,
        gpu: &mut dyn GpuDevice,
        _time: SceneTime,
        _target: Option<&RenderTarget>,
    ) -> Result<(), GpuError> {
        gpu.clear(self.clear);
        let context = gpu.context_id();
        for (texture, rect) in &self.quads {
            match texture.slot().handle_in(context) {
                Some(handle) => gpu.draw_textured_quad(handle, *rect)?,
                None => log::trace!("skipping quad, `{}` has no handle", texture.name()),
            }
        }
        Ok(())
    }
}
