use std::sync::Arc;

use parking_lot::Mutex;

use crate::scene::SceneHandle;

use super::Viewport;

/// The pending-scene slot, writable from any thread.
#[derive(Debug, Clone, Default)]
pub struct PendingScene(Arc<Mutex<Option<SceneHandle>>>);

impl PendingScene {
    /// Replaces any scene still waiting for the frame boundary.
    pub fn set(&self, scene: SceneHandle) {
        if let Some(dropped) = self.0.lock().replace(scene) {
            log::trace!("pending {} overwritten before frame boundary", dropped.id());
        }
    }

    pub fn take(&self) -> Option<SceneHandle> {
        self.0.lock().take()
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }
}

/// Current scene (render thread) plus the pending one (any thread).
///
/// The pending scene is only promoted by [`resolve_pending`](Self::resolve_pending)
/// at the start of a frame, never mid-frame.
#[derive(Debug, Default)]
pub struct SceneSwitcher {
    current: Option<SceneHandle>,
    pending: PendingScene,
}

impl SceneSwitcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> PendingScene {
        self.pending.clone()
    }

    pub fn current(&self) -> Option<&SceneHandle> {
        self.current.as_ref()
    }

    pub fn switch_scene(&self, scene: SceneHandle) {
        self.pending.set(scene);
    }

    /// Promotes the pending scene, if any. Returns the promoted scene.
    pub fn resolve_pending(&mut self, viewport: Viewport) -> Option<SceneHandle> {
        let next = self.pending.take()?;
        log::debug!("switching to {}", next.id());
        self.switch_direct(next.clone(), viewport);
        Some(next)
    }

    /// Makes `scene` current immediately. Render thread only.
    pub fn switch_direct(&mut self, scene: SceneHandle, viewport: Viewport) {
        {
            let mut s = scene.lock();
            s.reset_gl_state();
            s.update_projection_matrix(viewport.width, viewport.height);
        }
        self.current = Some(scene);
    }

    /// Drops the current scene without promoting anything.
    pub fn clear_current(&mut self) {
        self.current = None;
    }
}
