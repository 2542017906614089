//! Test doubles shared by the renderer and compositor tests.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::{ClearColor, GpuDevice, GpuError};
use crate::render::RenderTarget;
use crate::scene::{Scene, SceneHandle, SceneTime};

/// Shared, ordered record of scene callbacks.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == event).count()
    }
}

/// Scene that records every callback as `"<label>:<event>"` and clears to `color`.
pub struct ProbeScene {
    label: &'static str,
    color: ClearColor,
    log: EventLog,
}

impl ProbeScene {
    pub fn handle(label: &'static str, log: &EventLog) -> SceneHandle {
        SceneHandle::new(Self {
            label,
            color: ClearColor::BLACK,
            log: log.clone(),
        })
    }

    pub fn colored(label: &'static str, color: ClearColor, log: &EventLog) -> SceneHandle {
        SceneHandle::new(Self {
            label,
            color,
            log: log.clone(),
        })
    }
}

impl Scene for ProbeScene {
    fn reset_gl_state(&mut self) {
        self.log.push(format!("{}:reset", self.label));
    }

    fn update_projection_matrix(&mut self, width: u32, height: u32) {
        self.log.push(format!("{}:projection {width}x{height}", self.label));
    }

    fn render(
        &mut self,
        gpu: &mut dyn GpuDevice,
        _time: SceneTime,
        target: Option<&RenderTarget>,
    ) -> Result<(), GpuError> {
        gpu.clear(self.color);
        let target = target.map_or("surface", RenderTarget::name);
        self.log.push(format!("{}:render {target}", self.label));
        Ok(())
    }

    fn reload(&mut self, _gpu: &mut dyn GpuDevice) -> Result<(), GpuError> {
        self.log.push(format!("{}:reload", self.label));
        Ok(())
    }

    fn destroy_scene(&mut self) {
        self.log.push(format!("{}:destroy", self.label));
    }
}
