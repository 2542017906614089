use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::core::{DefaultDelegate, FrameCtx, RenderDelegate};
use crate::gpu::{GpuDevice, GpuError, RendererId};
use crate::resource::{ManagedResource, ResourceHub, ResourceManager};
use crate::scene::{SceneHandle, SceneTime};
use crate::task::{FrameTask, FrameTaskQueue, ManagerKind, TaskError, TaskKind, TaskPayload, panic_message};
use crate::time::{FpsListener, FpsMeter, FrameClock, FrameScheduler};

use super::{ContextState, RenderTarget, RendererConfig, RendererHandle, SceneSwitcher, Viewport};

/// Renderer state shared with delegates: context, scenes, render targets and
/// the task queue.
pub struct RenderCore {
    id: RendererId,
    hub: ResourceHub,
    tasks: FrameTaskQueue,

    device: Option<Box<dyn GpuDevice>>,
    state: ContextState,
    scene_initialized: bool,

    scenes: Arc<Mutex<Vec<SceneHandle>>>,
    switcher: SceneSwitcher,
    render_targets: Vec<Arc<RenderTarget>>,
    current_target: Option<Arc<RenderTarget>>,
    surface: Viewport,

    clock: FrameClock,
    fps: FpsMeter,
    fps_listener: Option<Box<dyn FpsListener>>,
    scheduler: FrameScheduler,
    caching: Arc<AtomicBool>,
    config: RendererConfig,
}

impl RenderCore {
    fn new(hub: ResourceHub, config: RendererConfig) -> Self {
        Self {
            id: RendererId::next(),
            hub,
            tasks: FrameTaskQueue::new(),
            device: None,
            state: ContextState::Uninitialized,
            scene_initialized: false,
            scenes: Arc::new(Mutex::new(Vec::new())),
            switcher: SceneSwitcher::new(),
            render_targets: Vec::new(),
            current_target: None,
            surface: Viewport::default(),
            clock: FrameClock::new(),
            fps: FpsMeter::new(),
            fps_listener: None,
            scheduler: FrameScheduler::new(config.frame_rate),
            caching: Arc::new(AtomicBool::new(config.scene_caching)),
            config,
        }
    }

    pub fn id(&self) -> RendererId {
        self.id
    }

    pub fn hub(&self) -> &ResourceHub {
        &self.hub
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn is_scene_initialized(&self) -> bool {
        self.scene_initialized
    }

    pub fn is_scene_caching_enabled(&self) -> bool {
        self.caching.load(Ordering::Acquire)
    }

    pub fn handle(&self) -> RendererHandle {
        RendererHandle::new(
            self.id,
            self.tasks.clone(),
            self.scenes.clone(),
            self.switcher.pending(),
            self.scheduler.clone(),
            self.caching.clone(),
        )
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// The live device, if any.
    pub fn device(&mut self) -> Option<&mut dyn GpuDevice> {
        self.device.as_deref_mut().map(|d| d as &mut dyn GpuDevice)
    }

    // ── viewport ──

    pub fn surface_size(&self) -> Viewport {
        self.surface
    }

    /// Surface size, or the configured override.
    pub fn viewport(&self) -> Viewport {
        match self.config.viewport_override {
            Some((w, h)) => Viewport::new(w, h),
            None => self.surface,
        }
    }

    pub fn set_viewport_override(&mut self, viewport: Option<(u32, u32)>) {
        self.config.viewport_override = viewport;
        let vp = self.viewport();
        if let Some(scene) = self.switcher.current() {
            scene.lock().update_projection_matrix(vp.width, vp.height);
        }
    }

    pub fn last_measured_fps(&self) -> Option<f64> {
        self.fps.last_measured()
    }

    // ── scenes ──

    pub fn scenes(&self) -> Vec<SceneHandle> {
        self.scenes.lock().clone()
    }

    pub fn current_scene(&self) -> Option<SceneHandle> {
        self.switcher.current().cloned()
    }

    /// Adds a scene now. The first scene added becomes current.
    pub fn add_scene(&mut self, scene: SceneHandle) {
        self.insert_scene(scene, None);
    }

    /// Makes `scene` current immediately, bypassing the pending slot.
    pub fn switch_scene_direct(&mut self, scene: SceneHandle) {
        let vp = self.viewport();
        self.switcher.switch_direct(scene, vp);
    }

    fn insert_scene(&mut self, scene: SceneHandle, index: Option<usize>) {
        {
            let mut scenes = self.scenes.lock();
            if scenes.contains(&scene) {
                log::debug!("{} already added", scene.id());
                return;
            }
            match index {
                Some(i) if i < scenes.len() => scenes.insert(i, scene.clone()),
                _ => scenes.push(scene.clone()),
            }
        }
        if self.switcher.current().is_none() {
            self.switch_scene_direct(scene);
        }
    }

    fn remove_scene(&mut self, scene: &SceneHandle) -> Result<(), TaskError> {
        if self.switcher.current() == Some(scene) {
            return Err(TaskError::CurrentScene);
        }
        self.scenes.lock().retain(|s| s != scene);
        Ok(())
    }

    fn replace_scene_at(&mut self, index: usize, scene: SceneHandle) -> Result<(), TaskError> {
        let old = {
            let mut scenes = self.scenes.lock();
            let len = scenes.len();
            let slot = scenes.get_mut(index).ok_or(TaskError::SceneIndex { index, len })?;
            std::mem::replace(slot, scene.clone())
        };
        if self.switcher.current() == Some(&old) {
            self.switch_scene_direct(scene);
        }
        Ok(())
    }

    fn replace_scene(&mut self, old: &SceneHandle, new: SceneHandle) -> Result<(), TaskError> {
        let index = self.scenes.lock().iter().position(|s| s == old);
        match index {
            Some(i) => self.replace_scene_at(i, new),
            None => {
                self.insert_scene(new, None);
                Ok(())
            }
        }
    }

    fn clear_scenes(&mut self) {
        let scenes = std::mem::take(&mut *self.scenes.lock());
        for scene in scenes {
            scene.lock().destroy_scene();
        }
        self.switcher.clear_current();
    }

    // ── render targets ──

    pub fn render_targets(&self) -> &[Arc<RenderTarget>] {
        &self.render_targets
    }

    pub fn render_target(&self) -> Option<&Arc<RenderTarget>> {
        self.current_target.as_ref()
    }

    /// Target used by the next [`render`](Self::render); `None` is the surface.
    pub fn set_render_target(&mut self, target: Option<Arc<RenderTarget>>) {
        self.current_target = target;
    }

    /// Creates and tracks `target` now. A target whose creation fails is still
    /// tracked and retried on the next reload.
    pub fn add_render_target(&mut self, target: Arc<RenderTarget>) -> Result<(), GpuError> {
        if self.render_targets.iter().any(|t| Arc::ptr_eq(t, &target)) {
            return Ok(());
        }
        self.render_targets.push(target.clone());
        let gpu = self.device.as_deref_mut().ok_or(GpuError::NoContext)?;
        target.create(gpu, self.hub.textures(), self.id)
    }

    pub fn remove_render_target(&mut self, target: &Arc<RenderTarget>) {
        self.render_targets.retain(|t| !Arc::ptr_eq(t, target));
        if self.current_target.as_ref().is_some_and(|t| Arc::ptr_eq(t, target)) {
            self.current_target = None;
        }
        if let Some(gpu) = self.device.as_deref_mut() {
            target.remove(gpu, self.hub.textures());
        }
    }

    // ── drawing ──

    /// Renders the current scene into the current target.
    pub fn render(&mut self, time: SceneTime) -> Result<(), GpuError> {
        let Some(scene) = self.switcher.current().cloned() else {
            return Ok(());
        };
        let vp = self.viewport();
        let gpu = self.device.as_deref_mut().ok_or(GpuError::NoContext)?;

        match &self.current_target {
            Some(target) => target.bind(gpu)?,
            None => {
                gpu.bind_framebuffer(None)?;
                gpu.set_viewport(0, 0, vp.width, vp.height);
            }
        }
        gpu.clear(self.config.clear_color);

        let rendered = scene.lock().render(gpu, time, self.current_target.as_deref());
        if let Some(target) = &self.current_target {
            target.unbind(gpu)?;
        }
        rendered
    }

    // ── tasks ──

    /// Drains the task queue. Failures are logged per task.
    pub fn perform_frame_tasks(&mut self) -> usize {
        let tasks = self.tasks.clone();
        tasks.drain(|task| self.run_task(task))
    }

    fn run_task(&mut self, task: FrameTask) {
        let kind = task.kind();
        log::trace!("running {kind:?} task: {:?}", task.payload());
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(task))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::error!("{kind:?} task failed: {err}"),
            Err(panic) => log::error!("{kind:?} task panicked: {}", panic_message(panic.as_ref())),
        }
    }

    fn dispatch(&mut self, task: FrameTask) -> Result<(), TaskError> {
        let (kind, payload, index) = task.into_parts();
        match kind {
            TaskKind::Add => self.handle_add(payload, index),
            TaskKind::AddAll => self.handle_add_all(payload),
            TaskKind::Remove => self.handle_remove(payload),
            TaskKind::RemoveAll => self.handle_remove_all(payload),
            TaskKind::Replace => self.handle_replace(payload, index),
            TaskKind::Reload => self.handle_reload(payload),
            TaskKind::Reset => self.handle_reset(payload),
            TaskKind::Initialize => self.handle_initialize(payload),
        }
    }

    fn gpu(&mut self) -> Result<&mut dyn GpuDevice, TaskError> {
        Ok(self.device.as_deref_mut().ok_or(GpuError::NoContext)?)
    }

    fn handle_add(&mut self, payload: TaskPayload, index: Option<usize>) -> Result<(), TaskError> {
        let (id, hub) = (self.id, self.hub.clone());
        match payload {
            TaskPayload::Texture(t) => hub.textures().task_add(t, id, self.gpu()?),
            TaskPayload::Material(m) => hub.materials().task_add(m, id, self.gpu()?),
            TaskPayload::Scene(s) => self.insert_scene(s, index),
            TaskPayload::RenderTarget(t) => self.add_render_target(t)?,
            other => ignored(TaskKind::Add, &other),
        }
        Ok(())
    }

    fn handle_add_all(&mut self, payload: TaskPayload) -> Result<(), TaskError> {
        let (id, hub) = (self.id, self.hub.clone());
        match payload {
            TaskPayload::Textures(v) => add_each(hub.textures(), v, id, self.gpu()?),
            TaskPayload::Materials(v) => add_each(hub.materials(), v, id, self.gpu()?),
            TaskPayload::Scenes(v) => v.into_iter().for_each(|s| self.insert_scene(s, None)),
            other => ignored(TaskKind::AddAll, &other),
        }
        Ok(())
    }

    fn handle_remove(&mut self, payload: TaskPayload) -> Result<(), TaskError> {
        let hub = self.hub.clone();
        match payload {
            TaskPayload::Texture(t) => hub.textures().task_remove(&t, self.gpu()?),
            TaskPayload::Material(m) => hub.materials().task_remove(&m, self.gpu()?),
            TaskPayload::Scene(s) => self.remove_scene(&s)?,
            TaskPayload::RenderTarget(t) => self.remove_render_target(&t),
            other => ignored(TaskKind::Remove, &other),
        }
        Ok(())
    }

    fn handle_remove_all(&mut self, payload: TaskPayload) -> Result<(), TaskError> {
        let hub = self.hub.clone();
        match payload {
            TaskPayload::Textures(v) => {
                let gpu = self.gpu()?;
                v.iter().for_each(|t| hub.textures().task_remove(t, gpu));
            }
            TaskPayload::Materials(v) => {
                let gpu = self.gpu()?;
                v.iter().for_each(|m| hub.materials().task_remove(m, gpu));
            }
            TaskPayload::Scenes(v) => {
                for scene in &v {
                    if let Err(err) = self.remove_scene(scene) {
                        log::warn!("{}: {err}", scene.id());
                    }
                }
            }
            other => ignored(TaskKind::RemoveAll, &other),
        }
        Ok(())
    }

    fn handle_replace(&mut self, payload: TaskPayload, index: Option<usize>) -> Result<(), TaskError> {
        let (id, hub) = (self.id, self.hub.clone());
        match (payload, index) {
            (TaskPayload::TextureSwap { old, new }, _) => hub.textures().task_replace(&old, new, id, self.gpu()?),
            (TaskPayload::MaterialSwap { old, new }, _) => hub.materials().task_replace(&old, new, id, self.gpu()?),
            (TaskPayload::Scene(s), Some(i)) => self.replace_scene_at(i, s)?,
            (TaskPayload::Scenes(mut v), _) if v.len() == 2 => {
                let new = v.pop().ok_or_else(|| TaskError::Failed("missing scene".into()))?;
                let old = v.pop().ok_or_else(|| TaskError::Failed("missing scene".into()))?;
                self.replace_scene(&old, new)?;
            }
            (other, _) => ignored(TaskKind::Replace, &other),
        }
        Ok(())
    }

    /// Reloads the resources this renderer owns. Queued by promotion after
    /// another renderer's reset, so it only runs against this renderer's live context.
    fn handle_reload(&mut self, payload: TaskPayload) -> Result<(), TaskError> {
        let (id, hub) = (self.id, self.hub.clone());
        if !self.state.is_live() {
            log::debug!("{id}: reload skipped, context not live");
            return Ok(());
        }
        match payload {
            TaskPayload::Manager(ManagerKind::Textures) => {
                let n = hub.textures().task_reload(id, self.gpu()?);
                log::debug!("{id}: reloaded {n} textures");
            }
            TaskPayload::Manager(ManagerKind::Materials) => {
                let n = hub.materials().task_reload(id, self.gpu()?);
                log::debug!("{id}: reloaded {n} materials");
            }
            other => ignored(TaskKind::Reload, &other),
        }
        Ok(())
    }

    fn handle_reset(&mut self, payload: TaskPayload) -> Result<(), TaskError> {
        let (id, hub) = (self.id, self.hub.clone());
        match payload {
            TaskPayload::Manager(ManagerKind::Textures) => {
                hub.textures().task_clear(id, Some(self.gpu()?));
            }
            TaskPayload::Manager(ManagerKind::Materials) => {
                hub.materials().task_clear(id, Some(self.gpu()?));
            }
            other => ignored(TaskKind::Reset, &other),
        }
        Ok(())
    }

    fn handle_initialize(&mut self, payload: TaskPayload) -> Result<(), TaskError> {
        match payload {
            TaskPayload::Initializer(init) => init.run(self.gpu()?),
            other => {
                ignored(TaskKind::Initialize, &other);
                Ok(())
            }
        }
    }

    // ── context recovery ──

    /// Reloads everything in place after a context loss.
    fn restore_cached(&mut self) {
        let (id, hub) = (self.id, self.hub.clone());
        let surface = self.surface;
        let vp = self.viewport();
        let Some(gpu) = self.device.as_deref_mut() else {
            return;
        };

        for target in &self.render_targets {
            if target.is_fullscreen() {
                target.set_size(surface.width, surface.height);
            }
        }

        let textures = hub.textures().task_reload(id, gpu);
        let materials = hub.materials().task_reload(id, gpu);

        for scene in self.scenes.lock().iter() {
            if let Err(err) = scene.lock().reload(gpu) {
                log::error!("failed to reload {}: {err}", scene.id());
            }
        }
        for target in &self.render_targets {
            if let Err(err) = target.reload(gpu, hub.textures(), id) {
                log::error!("failed to reload render target `{}`: {err}", target.name());
            }
        }

        if let Some(current) = self.switcher.current().cloned() {
            self.switcher.switch_direct(current, vp);
        }
        log::info!(
            "{id}: context restored ({textures} textures, {materials} materials, {} render targets)",
            self.render_targets.len()
        );
    }

    /// Drops this renderer's resources, scenes and targets after a context loss.
    fn clear_for_rebuild(&mut self) {
        let (id, hub) = (self.id, self.hub.clone());
        hub.materials().task_clear(id, self.device());
        hub.textures().task_clear(id, self.device());
        self.clear_scenes();
        self.render_targets.clear();
        self.current_target = None;
        log::info!("{id}: scene caching disabled, rebuilding from scratch");
    }

    fn invalidate_context(&mut self) {
        let Some(context) = self.device.as_ref().map(|d| d.context_id()) else {
            return;
        };
        let textures = self.hub.textures().invalidate_context(context);
        let materials = self.hub.materials().invalidate_context(context);
        for target in &self.render_targets {
            target.invalidate(context);
        }
        log::debug!(
            "{}: invalidated {textures} textures, {materials} materials",
            self.id
        );
    }

    fn teardown(&mut self) {
        if self.state == ContextState::TornDown {
            return;
        }
        self.scheduler.stop();
        self.tasks.close();
        self.clear_scenes();

        if let Some(gpu) = self.device.as_deref_mut() {
            for target in &self.render_targets {
                target.remove(gpu, self.hub.textures());
            }
        }
        self.render_targets.clear();
        self.current_target = None;

        let (id, hub) = (self.id, self.hub.clone());
        let promoted = hub.materials().task_reset(id, self.device());
        if let Some(next) = hub.textures().task_reset(id, self.device()).or(promoted) {
            log::info!("{id}: torn down, context handed to {next}");
        }

        self.device = None;
        self.state = ContextState::TornDown;
        log::debug!("{id}: torn down");
    }
}

impl Drop for RenderCore {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn add_each<T: ManagedResource>(
    manager: &ResourceManager<T>,
    resources: Vec<Arc<T>>,
    renderer: RendererId,
    gpu: &mut dyn GpuDevice,
) {
    for resource in resources {
        manager.task_add(resource, renderer, gpu);
    }
}

fn ignored(kind: TaskKind, payload: &TaskPayload) {
    log::debug!("{kind:?} task ignores payload {payload:?}");
}

/// A renderer: the context state machine driven by platform callbacks, plus
/// the delegate that decides what each frame draws.
pub struct Renderer<D: RenderDelegate = DefaultDelegate> {
    core: RenderCore,
    delegate: D,
}

impl Renderer<DefaultDelegate> {
    pub fn with_default_delegate(hub: ResourceHub, config: RendererConfig) -> Self {
        Self::new(hub, config, DefaultDelegate)
    }
}

impl<D: RenderDelegate> Renderer<D> {
    pub fn new(hub: ResourceHub, config: RendererConfig, delegate: D) -> Self {
        Self {
            core: RenderCore::new(hub, config),
            delegate,
        }
    }

    pub fn id(&self) -> RendererId {
        self.core.id
    }

    pub fn state(&self) -> ContextState {
        self.core.state
    }

    pub fn handle(&self) -> RendererHandle {
        self.core.handle()
    }

    pub fn core(&self) -> &RenderCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut RenderCore {
        &mut self.core
    }

    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    pub fn delegate_mut(&mut self) -> &mut D {
        &mut self.delegate
    }

    /// Installs the platform hook the frame scheduler calls once per tick.
    pub fn set_render_request(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.core.scheduler.set_hook(hook);
    }

    pub fn set_fps_listener(&mut self, listener: impl FpsListener + 'static) {
        self.core.fps_listener = Some(Box::new(listener));
    }

    // ── platform callbacks ──

    /// A new context is available.
    ///
    /// First time: register, drain the backlog, build the scene. After a loss:
    /// reload in place or rebuild, depending on scene caching.
    pub fn on_surface_created(&mut self, device: Box<dyn GpuDevice>, width: u32, height: u32) {
        let id = self.core.id;
        match self.core.state {
            ContextState::TornDown => {
                log::warn!("{id}: surface created after teardown, ignored");
                return;
            }
            ContextState::Live => {
                log::warn!("{id}: surface created while live, dropping the old context");
                self.on_surface_destroyed();
            }
            ContextState::Uninitialized | ContextState::Lost => {}
        }

        let recovering = self.core.state == ContextState::Lost;
        self.core.device = Some(device);
        self.core.state = ContextState::Live;
        self.core.surface = Viewport::new(width, height);

        let hub = self.core.hub.clone();
        hub.textures().register_renderer(id, self.core.tasks.clone());
        hub.materials().register_renderer(id, self.core.tasks.clone());
        log::info!("{id}: context live ({width}x{height})");

        if !self.core.scene_initialized {
            self.core.perform_frame_tasks();
            self.init_scene();
        } else if recovering {
            if self.core.is_scene_caching_enabled() {
                self.core.restore_cached();
            } else {
                self.core.clear_for_rebuild();
                self.init_scene();
            }
        }

        self.core.clock.restart();
        self.core.fps.reset();
        self.core.scheduler.start();
    }

    pub fn on_surface_size_changed(&mut self, width: u32, height: u32) {
        self.core.surface = Viewport::new(width, height);
        let core = &mut self.core;

        for target in &core.render_targets {
            if target.is_fullscreen() {
                target.set_size(width, height);
            }
        }
        if let Some(gpu) = core.device.as_deref_mut() {
            gpu.resize_surface(width, height);
            for target in core.render_targets.iter().filter(|t| t.is_stale()) {
                if let Err(err) = target.reallocate(gpu) {
                    log::error!("failed to resize render target `{}`: {err}", target.name());
                }
            }
        }

        let vp = core.viewport();
        if let Some(scene) = core.switcher.current() {
            scene.lock().update_projection_matrix(vp.width, vp.height);
        }
        self.delegate.on_resize(&mut self.core, vp);
    }

    /// The context is gone. Handles are forgotten; registries are kept.
    pub fn on_surface_destroyed(&mut self) {
        if self.core.state != ContextState::Live {
            return;
        }
        self.core.scheduler.stop();
        self.core.invalidate_context();
        self.core.device = None;
        self.core.state = ContextState::Lost;
        log::info!("{}: context lost", self.core.id);
    }

    /// Drains tasks, resolves the pending scene and renders one frame.
    ///
    /// Never fails: every error is logged and the frame continues or is skipped.
    pub fn on_render_frame(&mut self) {
        if !self.core.state.is_live() {
            log::trace!("{}: frame skipped, no live context", self.core.id);
            return;
        }

        self.core.perform_frame_tasks();
        let vp = self.core.viewport();
        self.core.switcher.resolve_pending(vp);

        let Some(gpu) = self.core.device.as_deref_mut() else {
            return;
        };
        if let Err(err) = gpu.begin_frame() {
            log::warn!("{}: frame skipped: {err}", self.core.id);
            return;
        }

        let time = self.core.clock.tick();
        let mut ctx = FrameCtx::new(&mut self.core, time);
        let delegate = &mut self.delegate;
        match panic::catch_unwind(AssertUnwindSafe(|| delegate.on_render(&mut ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::error!("render failed: {err:#}"),
            Err(panic) => log::error!("render panicked: {}", panic_message(panic.as_ref())),
        }

        if let Some(gpu) = self.core.device.as_deref_mut() {
            gpu.end_frame();
        }

        if let Some(fps) = self.core.fps.frame_rendered() {
            log::debug!("{}: {fps:.1} fps", self.core.id);
            if let Some(listener) = self.core.fps_listener.as_mut() {
                listener.on_fps_update(fps);
            }
        }
    }

    pub fn on_pause(&mut self) {
        self.core.scheduler.stop();
    }

    pub fn on_resume(&mut self) {
        if !self.core.state.is_live() {
            return;
        }
        if let Some(scene) = self.core.switcher.current() {
            scene.lock().reset_gl_state();
        }
        self.core.clock.reset();
        self.core.scheduler.start();
    }

    pub fn on_pointer_down(&mut self, x: f32, y: f32) {
        self.delegate.on_pointer_down(&mut self.core, x, y);
    }

    /// Tears the renderer down. The next renderer on the stack, if any, is promoted.
    pub fn destroy(&mut self) {
        self.core.teardown();
    }

    fn init_scene(&mut self) {
        let id = self.core.id;
        if let Err(err) = self.delegate.init_scene(&mut self.core) {
            log::error!("{id}: scene initialization failed: {err:#}");
        }
        self.core.scene_initialized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{ContextId, HeadlessDevice};
    use crate::resource::{GpuResource, Material, Texture};
    use crate::testing::{EventLog, ProbeScene};

    fn live(hub: &ResourceHub) -> Renderer {
        let mut renderer = Renderer::with_default_delegate(hub.clone(), RendererConfig::default());
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        renderer
    }

    fn image(name: &str) -> Arc<Texture> {
        Arc::new(Texture::from_pixels(name, 2, 2, vec![255; 16]))
    }

    /// Adds one probe scene per init, counting the inits.
    struct Rebuilding {
        inits: usize,
        log: EventLog,
    }

    impl RenderDelegate for Rebuilding {
        fn init_scene(&mut self, core: &mut RenderCore) -> anyhow::Result<()> {
            self.inits += 1;
            core.add_scene(ProbeScene::handle("scene", &self.log));
            Ok(())
        }
    }

    fn rebuilding(caching: bool, log: &EventLog) -> Renderer<Rebuilding> {
        let config = RendererConfig {
            scene_caching: caching,
            ..RendererConfig::default()
        };
        let delegate = Rebuilding {
            inits: 0,
            log: log.clone(),
        };
        Renderer::new(ResourceHub::new(), config, delegate)
    }

    #[test]
    fn backlog_runs_when_context_comes_up() {
        let hub = ResourceHub::new();
        let mut renderer = Renderer::with_default_delegate(hub.clone(), RendererConfig::default());
        let tex = image("albedo");
        assert!(renderer.handle().add_texture(tex.clone()));
        assert_eq!(tex.handle(), None);

        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        assert!(tex.handle().is_some());
        assert_eq!(tex.owner(), Some(renderer.id()));
        assert_eq!(renderer.core().pending_tasks(), 0);
    }

    #[test]
    fn cached_resources_reload_after_context_loss() {
        let hub = ResourceHub::new();
        let mut renderer = live(&hub);
        let tex = image("albedo");
        let mat = Arc::new(Material::new("lit", "vs", "fs").with_texture(tex.clone()));
        let handle = renderer.handle();
        assert!(handle.add_texture(tex.clone()));
        assert!(handle.add_material(mat.clone()));
        renderer.on_render_frame();
        assert!(mat.handle().is_some());

        renderer.on_surface_destroyed();
        assert_eq!(renderer.state(), ContextState::Lost);
        assert_eq!(tex.handle(), None);
        assert_eq!(mat.handle(), None);
        assert_eq!(hub.textures().len(), 1);

        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        assert_eq!(renderer.state(), ContextState::Live);
        assert!(tex.handle().is_some());
        assert!(mat.handle().is_some());
        assert_eq!(mat.last_error(), None);
    }

    #[test]
    fn destroying_the_active_renderer_promotes_the_next() {
        let hub = ResourceHub::new();
        let mut first = live(&hub);
        let shared = image("shared");
        first.handle().add_texture(shared.clone());
        first.on_render_frame();

        let mut second = live(&hub);
        let own = image("own");
        let second_handle = second.handle();
        second_handle.add_texture(own.clone());
        second.on_render_frame();
        assert_eq!(hub.textures().active(), Some(second.id()));

        second.destroy();
        assert_eq!(second.state(), ContextState::TornDown);
        assert_eq!(hub.textures().active(), Some(first.id()));
        assert_eq!(hub.textures().registry().len(), 1);
        assert!(hub.textures().contains(&shared));
        assert_eq!(own.handle(), None);
        assert_eq!(first.core().pending_tasks(), 2);

        let before = shared.handle();
        first.on_render_frame();
        assert!(shared.handle().is_some());
        assert_ne!(shared.handle(), before);
        assert!(!second_handle.add_texture(image("late")));
        assert!(!second_handle.switch_scene(ProbeScene::handle("late", &EventLog::default())));
    }

    fn context_of(renderer: &mut Renderer) -> ContextId {
        renderer
            .core_mut()
            .device()
            .map(|gpu| gpu.context_id())
            .expect("renderer has a live device")
    }

    #[test]
    fn inactive_renderer_recovers_its_resources() {
        let hub = ResourceHub::new();
        let mut first = live(&hub);
        let own = image("own");
        first.handle().add_texture(own.clone());
        first.on_render_frame();

        let second = live(&hub);
        assert_eq!(hub.textures().active(), Some(second.id()));

        first.on_surface_destroyed();
        assert_eq!(own.handle(), None);
        first.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        first.on_render_frame();

        let ctx = context_of(&mut first);
        assert!(own.slot().handle_in(ctx).is_some());
        assert_eq!(own.owner(), Some(first.id()));
        assert_eq!(hub.textures().active(), Some(second.id()));
    }

    #[test]
    fn active_recovery_keeps_other_renderers_handles() {
        let hub = ResourceHub::new();
        let mut first = live(&hub);
        let theirs = image("theirs");
        first.handle().add_texture(theirs.clone());
        first.on_render_frame();
        let first_ctx = context_of(&mut first);
        let before = theirs.slot().handle_in(first_ctx);
        assert!(before.is_some());

        let mut second = live(&hub);
        let mine = image("mine");
        second.handle().add_texture(mine.clone());
        second.on_render_frame();

        second.on_surface_destroyed();
        second.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        second.on_render_frame();

        assert_eq!(theirs.slot().handle_in(first_ctx), before);
        assert_eq!(theirs.owner(), Some(first.id()));
        let second_ctx = context_of(&mut second);
        assert!(mine.slot().handle_in(second_ctx).is_some());
        assert_eq!(theirs.slot().handle_in(second_ctx), None);
    }

    #[test]
    fn failing_tasks_do_not_stop_the_drain() {
        let hub = ResourceHub::new();
        let mut renderer = Renderer::with_default_delegate(hub.clone(), RendererConfig::default());
        let handle = renderer.handle();
        let tex = image("after");
        handle.initialize(|_| panic!("initializer exploded"));
        handle.initialize(|_| Err(TaskError::Failed("nope".into())));
        handle.add_texture(tex.clone());

        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        assert!(hub.textures().contains(&tex));
        assert!(tex.handle().is_some());
    }

    #[test]
    fn caching_off_rebuilds_the_scene() {
        let log = EventLog::default();
        let mut renderer = rebuilding(false, &log);
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        assert_eq!(renderer.delegate().inits, 1);

        renderer.on_surface_destroyed();
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        assert_eq!(renderer.delegate().inits, 2);
        assert_eq!(renderer.core().scenes().len(), 1);
        assert_eq!(log.count("scene:destroy"), 1);
        assert_eq!(log.count("scene:reload"), 0);
    }

    #[test]
    fn caching_on_reloads_without_rebuilding() {
        let log = EventLog::default();
        let mut renderer = rebuilding(true, &log);
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        renderer.on_surface_destroyed();
        log.take();

        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 32, 16);
        assert_eq!(renderer.delegate().inits, 1);
        assert_eq!(
            log.events(),
            ["scene:reload", "scene:reset", "scene:projection 32x16"]
        );
    }

    #[test]
    fn last_switch_before_a_frame_wins() {
        let log = EventLog::default();
        let hub = ResourceHub::new();
        let mut renderer = live(&hub);
        let (a, b, c) = (
            ProbeScene::handle("a", &log),
            ProbeScene::handle("b", &log),
            ProbeScene::handle("c", &log),
        );
        for scene in [&a, &b, &c] {
            renderer.core_mut().add_scene(scene.clone());
        }
        assert_eq!(renderer.core().current_scene(), Some(a));

        let handle = renderer.handle();
        assert!(handle.switch_scene(b));
        assert!(handle.switch_scene_at(2));
        assert!(!handle.switch_scene_at(7));
        renderer.on_render_frame();

        assert_eq!(renderer.core().current_scene(), Some(c));
        assert_eq!(log.count("b:reset"), 0);
        assert_eq!(log.count("c:render surface"), 1);
    }

    #[test]
    fn removing_the_current_scene_is_refused() {
        let log = EventLog::default();
        let hub = ResourceHub::new();
        let mut renderer = live(&hub);
        let (a, b) = (ProbeScene::handle("a", &log), ProbeScene::handle("b", &log));
        let handle = renderer.handle();
        handle.add_scenes(vec![a.clone(), b.clone()]);
        handle.remove_scene(a.clone());
        handle.remove_scene(b.clone());
        renderer.on_render_frame();

        assert_eq!(renderer.core().scenes(), vec![a.clone()]);
        assert_eq!(renderer.core().current_scene(), Some(a));
    }

    #[test]
    fn replace_current_scene_switches_to_the_replacement() {
        let log = EventLog::default();
        let hub = ResourceHub::new();
        let mut renderer = live(&hub);
        let (a, b) = (ProbeScene::handle("a", &log), ProbeScene::handle("b", &log));
        renderer.core_mut().add_scene(a.clone());

        let handle = renderer.handle();
        assert!(handle.replace_scene(0, b.clone()));
        assert!(handle.replace_scene(5, a.clone()));
        renderer.on_render_frame();

        assert_eq!(renderer.core().scenes(), vec![b.clone()]);
        assert_eq!(renderer.core().current_scene(), Some(b));
    }

    #[test]
    fn fullscreen_targets_follow_the_surface() {
        let hub = ResourceHub::new();
        let mut renderer = live(&hub);
        let fixed = Arc::new(RenderTarget::new("fixed", 32, 32).with_fullscreen(false));
        let full = Arc::new(RenderTarget::new("full", 64, 64));
        renderer.core_mut().add_render_target(fixed.clone()).unwrap();
        renderer.core_mut().add_render_target(full.clone()).unwrap();
        let old = full.framebuffer();

        renderer.on_surface_size_changed(128, 96);
        assert_eq!(full.size(), (128, 96));
        assert_eq!(fixed.size(), (32, 32));
        assert!(!full.is_stale());
        assert_ne!(full.framebuffer(), old);
        assert_eq!(renderer.core().surface_size(), Viewport::new(128, 96));
    }

    #[test]
    fn torn_down_renderer_ignores_new_surfaces() {
        let hub = ResourceHub::new();
        let mut renderer = live(&hub);
        renderer.destroy();
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 64, 64);
        assert_eq!(renderer.state(), ContextState::TornDown);
        assert!(!hub.textures().is_registered(renderer.id()));
    }

    #[test]
    fn fps_listener_reports_every_window() {
        let hub = ResourceHub::new();
        let mut renderer = live(&hub);
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        renderer.set_fps_listener(move |fps: f64| sink.lock().push(fps));

        for _ in 0..FpsMeter::DEFAULT_WINDOW * 2 {
            renderer.on_render_frame();
        }
        assert_eq!(reports.lock().len(), 2);
        assert!(renderer.core().last_measured_fps().is_some());
    }
}
