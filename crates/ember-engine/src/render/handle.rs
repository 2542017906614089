use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::gpu::{GpuDevice, RendererId};
use crate::resource::{Material, Texture};
use crate::scene::SceneHandle;
use crate::task::{FrameTask, FrameTaskQueue, Initializer, ManagerKind, TaskError, TaskKind, TaskPayload};
use crate::time::FrameScheduler;

use super::{PendingScene, RenderTarget};

/// Thread-safe front of a renderer.
///
/// Every method only enqueues work for the render thread and returns whether
/// it was accepted; `false` means the renderer is torn down (or, for index
/// lookups, that the index is out of range).
#[derive(Clone)]
pub struct RendererHandle {
    id: RendererId,
    tasks: FrameTaskQueue,
    scenes: Arc<Mutex<Vec<SceneHandle>>>,
    pending: PendingScene,
    scheduler: FrameScheduler,
    caching: Arc<AtomicBool>,
}

impl RendererHandle {
    pub(crate) fn new(
        id: RendererId,
        tasks: FrameTaskQueue,
        scenes: Arc<Mutex<Vec<SceneHandle>>>,
        pending: PendingScene,
        scheduler: FrameScheduler,
        caching: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            tasks,
            scenes,
            pending,
            scheduler,
            caching,
        }
    }

    pub fn id(&self) -> RendererId {
        self.id
    }

    fn enqueue(&self, kind: TaskKind, payload: TaskPayload) -> bool {
        self.tasks.enqueue(FrameTask::new(kind, payload))
    }

    // ── textures ──

    pub fn add_texture(&self, texture: Arc<Texture>) -> bool {
        self.enqueue(TaskKind::Add, TaskPayload::Texture(texture))
    }

    pub fn add_textures(&self, textures: Vec<Arc<Texture>>) -> bool {
        self.enqueue(TaskKind::AddAll, TaskPayload::Textures(textures))
    }

    pub fn remove_texture(&self, texture: Arc<Texture>) -> bool {
        self.enqueue(TaskKind::Remove, TaskPayload::Texture(texture))
    }

    pub fn remove_textures(&self, textures: Vec<Arc<Texture>>) -> bool {
        self.enqueue(TaskKind::RemoveAll, TaskPayload::Textures(textures))
    }

    pub fn replace_texture(&self, old: Arc<Texture>, new: Arc<Texture>) -> bool {
        self.enqueue(TaskKind::Replace, TaskPayload::TextureSwap { old, new })
    }

    pub fn reload_textures(&self) -> bool {
        self.enqueue(TaskKind::Reload, TaskPayload::Manager(ManagerKind::Textures))
    }

    pub fn reset_textures(&self) -> bool {
        self.enqueue(TaskKind::Reset, TaskPayload::Manager(ManagerKind::Textures))
    }

    // ── materials ──

    pub fn add_material(&self, material: Arc<Material>) -> bool {
        self.enqueue(TaskKind::Add, TaskPayload::Material(material))
    }

    pub fn add_materials(&self, materials: Vec<Arc<Material>>) -> bool {
        self.enqueue(TaskKind::AddAll, TaskPayload::Materials(materials))
    }

    pub fn remove_material(&self, material: Arc<Material>) -> bool {
        self.enqueue(TaskKind::Remove, TaskPayload::Material(material))
    }

    pub fn remove_materials(&self, materials: Vec<Arc<Material>>) -> bool {
        self.enqueue(TaskKind::RemoveAll, TaskPayload::Materials(materials))
    }

    pub fn replace_material(&self, old: Arc<Material>, new: Arc<Material>) -> bool {
        self.enqueue(TaskKind::Replace, TaskPayload::MaterialSwap { old, new })
    }

    pub fn reload_materials(&self) -> bool {
        self.enqueue(TaskKind::Reload, TaskPayload::Manager(ManagerKind::Materials))
    }

    pub fn reset_materials(&self) -> bool {
        self.enqueue(TaskKind::Reset, TaskPayload::Manager(ManagerKind::Materials))
    }

    // ── scenes ──

    pub fn add_scene(&self, scene: SceneHandle) -> bool {
        self.enqueue(TaskKind::Add, TaskPayload::Scene(scene))
    }

    pub fn add_scene_at(&self, index: usize, scene: SceneHandle) -> bool {
        self.tasks
            .enqueue(FrameTask::new(TaskKind::Add, TaskPayload::Scene(scene)).at(index))
    }

    pub fn add_scenes(&self, scenes: Vec<SceneHandle>) -> bool {
        self.enqueue(TaskKind::AddAll, TaskPayload::Scenes(scenes))
    }

    /// Removing the current scene is refused when the task runs.
    pub fn remove_scene(&self, scene: SceneHandle) -> bool {
        self.enqueue(TaskKind::Remove, TaskPayload::Scene(scene))
    }

    pub fn remove_scenes(&self, scenes: Vec<SceneHandle>) -> bool {
        self.enqueue(TaskKind::RemoveAll, TaskPayload::Scenes(scenes))
    }

    /// Replaces the scene at `index`. Becomes current if the old one was.
    pub fn replace_scene(&self, index: usize, scene: SceneHandle) -> bool {
        self.tasks
            .enqueue(FrameTask::new(TaskKind::Replace, TaskPayload::Scene(scene)).at(index))
    }

    pub fn replace_scene_with(&self, old: SceneHandle, new: SceneHandle) -> bool {
        self.enqueue(TaskKind::Replace, TaskPayload::Scenes(vec![old, new]))
    }

    /// Schedules `scene` to become current at the next frame boundary.
    ///
    /// Only the last call before a frame takes effect.
    pub fn switch_scene(&self, scene: SceneHandle) -> bool {
        if self.tasks.is_closed() {
            return false;
        }
        self.pending.set(scene);
        true
    }

    /// Like [`switch_scene`](Self::switch_scene), by position in the scene list.
    pub fn switch_scene_at(&self, index: usize) -> bool {
        let scene = self.scenes.lock().get(index).cloned();
        match scene {
            Some(scene) => self.switch_scene(scene),
            None => {
                log::warn!("{}: no scene at index {index}", self.id);
                false
            }
        }
    }

    /// Snapshot of the scene list as of the last drained task.
    pub fn scenes(&self) -> Vec<SceneHandle> {
        self.scenes.lock().clone()
    }

    // ── render targets ──

    pub fn add_render_target(&self, target: Arc<RenderTarget>) -> bool {
        self.enqueue(TaskKind::Add, TaskPayload::RenderTarget(target))
    }

    pub fn remove_render_target(&self, target: Arc<RenderTarget>) -> bool {
        self.enqueue(TaskKind::Remove, TaskPayload::RenderTarget(target))
    }

    // ── misc ──

    /// Runs `f` once on the render thread with the live device.
    pub fn initialize<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut dyn GpuDevice) -> Result<(), TaskError> + Send + 'static,
    {
        self.enqueue(TaskKind::Initialize, TaskPayload::Initializer(Initializer::new(f)))
    }

    pub fn set_frame_rate(&self, frame_rate: f64) -> bool {
        !self.tasks.is_closed() && self.scheduler.set_frame_rate(frame_rate)
    }

    /// Takes effect at the next context recovery.
    pub fn set_scene_caching_enabled(&self, enabled: bool) -> bool {
        self.caching.store(enabled, Ordering::Release);
        !self.tasks.is_closed()
    }
}

impl std::fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererHandle")
            .field("id", &self.id)
            .field("pending_tasks", &self.tasks.len())
            .finish()
    }
}
