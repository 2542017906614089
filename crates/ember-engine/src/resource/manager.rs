use std::sync::Arc;

use parking_lot::Mutex;

use crate::gpu::{ContextId, GpuDevice, RendererId};
use crate::task::{FrameTask, FrameTaskQueue, TaskKind, TaskPayload};

use super::ManagedResource;

struct ManagerState<T> {
    registry: Vec<Arc<T>>,
    /// Registered renderers, most recent last. The last one is active.
    renderers: Vec<(RendererId, FrameTaskQueue)>,
}

/// Process-wide registry of one resource kind.
///
/// Producer threads only call the `queue_*` methods, which enqueue a frame task
/// on the active renderer. The `task_*` methods run on the render thread, from
/// inside task dispatch or the context-recovery path.
pub struct ResourceManager<T: ManagedResource> {
    state: Mutex<ManagerState<T>>,
}

impl<T: ManagedResource> Default for ResourceManager<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(ManagerState {
                registry: Vec::new(),
                renderers: Vec::new(),
            }),
        }
    }
}

impl<T: ManagedResource> ResourceManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    // ── renderers ──

    /// Pushes `renderer` on the stack. Already registered renderers stay where they are.
    pub fn register_renderer(&self, renderer: RendererId, queue: FrameTaskQueue) -> bool {
        let mut state = self.state.lock();
        if state.renderers.iter().any(|(id, _)| *id == renderer) {
            return false;
        }
        state.renderers.push((renderer, queue));
        log::debug!("{:?} manager: registered {renderer}", T::MANAGER);
        true
    }

    pub fn unregister_renderer(&self, renderer: RendererId) -> bool {
        let mut state = self.state.lock();
        let before = state.renderers.len();
        state.renderers.retain(|(id, _)| *id != renderer);
        state.renderers.len() != before
    }

    pub fn active(&self) -> Option<RendererId> {
        self.state.lock().renderers.last().map(|(id, _)| *id)
    }

    pub fn is_registered(&self, renderer: RendererId) -> bool {
        self.state.lock().renderers.iter().any(|(id, _)| *id == renderer)
    }

    pub fn renderers(&self) -> Vec<RendererId> {
        self.state.lock().renderers.iter().map(|(id, _)| *id).collect()
    }

    // ── registry ──

    /// Snapshot of the registry in insertion order.
    pub fn registry(&self) -> Vec<Arc<T>> {
        self.state.lock().registry.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().registry.is_empty()
    }

    pub fn contains(&self, resource: &Arc<T>) -> bool {
        self.state.lock().registry.iter().any(|r| Arc::ptr_eq(r, resource))
    }

    // ── producer side ──

    fn enqueue(&self, task: FrameTask) -> bool {
        let queue = self.state.lock().renderers.last().map(|(_, q)| q.clone());
        match queue {
            Some(queue) => queue.enqueue(task),
            None => {
                log::warn!("{:?} manager: no renderer registered, {:?} dropped", T::MANAGER, task.kind());
                false
            }
        }
    }

    pub fn queue_add(&self, resource: Arc<T>) -> bool {
        self.enqueue(FrameTask::new(TaskKind::Add, T::payload(resource)))
    }

    pub fn queue_add_all(&self, resources: Vec<Arc<T>>) -> bool {
        self.enqueue(FrameTask::new(TaskKind::AddAll, T::batch_payload(resources)))
    }

    pub fn queue_remove(&self, resource: Arc<T>) -> bool {
        self.enqueue(FrameTask::new(TaskKind::Remove, T::payload(resource)))
    }

    pub fn queue_remove_all(&self, resources: Vec<Arc<T>>) -> bool {
        self.enqueue(FrameTask::new(TaskKind::RemoveAll, T::batch_payload(resources)))
    }

    pub fn queue_replace(&self, old: Arc<T>, new: Arc<T>) -> bool {
        self.enqueue(FrameTask::new(TaskKind::Replace, T::swap_payload(old, new)))
    }

    pub fn queue_reload(&self) -> bool {
        self.enqueue(FrameTask::new(TaskKind::Reload, TaskPayload::Manager(T::MANAGER)))
    }

    pub fn queue_reset(&self) -> bool {
        self.enqueue(FrameTask::new(TaskKind::Reset, TaskPayload::Manager(T::MANAGER)))
    }

    // ── render-thread side ──

    /// Registers and creates `resource`. A failed create still registers it.
    pub fn task_add(&self, resource: Arc<T>, renderer: RendererId, gpu: &mut dyn GpuDevice) {
        {
            let mut state = self.state.lock();
            if state.registry.iter().any(|r| Arc::ptr_eq(r, &resource)) {
                return;
            }
            state.registry.push(resource.clone());
        }
        resource.slot().set_owner(renderer);
        if let Err(err) = resource.create(gpu) {
            log::error!("failed to create `{}`: {err}", resource.name());
        }
    }

    /// Destroys `resource` and strikes it from the registry.
    pub fn task_remove(&self, resource: &Arc<T>, gpu: &mut dyn GpuDevice) {
        resource.destroy(gpu);
        self.state.lock().registry.retain(|r| !Arc::ptr_eq(r, resource));
    }

    /// Destroys `old` and puts `new` at its position (appended if `old` is absent).
    ///
    /// `old == new` re-uploads in place.
    pub fn task_replace(&self, old: &Arc<T>, new: Arc<T>, renderer: RendererId, gpu: &mut dyn GpuDevice) {
        old.destroy(gpu);
        {
            let mut state = self.state.lock();
            let registry = &mut state.registry;
            registry.retain(|r| Arc::ptr_eq(r, old) || !Arc::ptr_eq(r, &new));
            match registry.iter().position(|r| Arc::ptr_eq(r, old)) {
                Some(i) => registry[i] = new.clone(),
                None => registry.push(new.clone()),
            }
        }
        new.slot().set_owner(renderer);
        if let Err(err) = new.create(gpu) {
            log::error!("failed to create `{}`: {err}", new.name());
        }
    }

    /// Re-creates, in registry order, the resources `renderer` owns in its context.
    ///
    /// Resources owned by another registered renderer stay in that renderer's
    /// context. Resources whose owner is no longer registered are adopted.
    /// Entries that can no longer be restored are dropped. An unregistered
    /// renderer gets a no-op.
    pub fn task_reload(&self, renderer: RendererId, gpu: &mut dyn GpuDevice) -> usize {
        let (registry, renderers) = {
            let state = self.state.lock();
            let renderers: Vec<_> = state.renderers.iter().map(|(id, _)| *id).collect();
            (state.registry.clone(), renderers)
        };
        if !renderers.contains(&renderer) {
            log::debug!("{:?} manager: reload for unregistered {renderer} ignored", T::MANAGER);
            return 0;
        }

        let owned = registry.into_iter().filter(|r| match r.owner() {
            Some(owner) if owner == renderer => true,
            Some(owner) if renderers.contains(&owner) => false,
            _ => {
                r.slot().set_owner(renderer);
                true
            }
        });

        let mut reloaded = 0;
        let mut dropped = Vec::new();
        for resource in owned {
            if !resource.can_restore() {
                log::warn!("`{}` released its source data and cannot be reloaded", resource.name());
                resource.destroy(gpu);
                dropped.push(resource);
                continue;
            }
            match resource.reload(gpu) {
                Ok(()) => reloaded += 1,
                Err(err) => log::error!("failed to reload `{}`: {err}", resource.name()),
            }
        }

        if !dropped.is_empty() {
            self.state
                .lock()
                .registry
                .retain(|r| !dropped.iter().any(|d| Arc::ptr_eq(r, d)));
        }
        reloaded
    }

    /// Destroys and unregisters the resources `renderer` owns, plus any that can
    /// no longer be restored. The renderer stays registered.
    ///
    /// Without a device the handles are only forgotten.
    pub fn task_clear(&self, renderer: RendererId, gpu: Option<&mut dyn GpuDevice>) -> usize {
        let removed = {
            let mut state = self.state.lock();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.registry)
                .into_iter()
                .partition(|r| r.owner() == Some(renderer) || !r.can_restore());
            state.registry = kept;
            removed
        };
        release_all(&removed, gpu);
        removed.len()
    }

    /// Drops `renderer` and everything it owns, then hands the context to the
    /// next renderer on the stack.
    ///
    /// The promoted renderer gets a `Reload` task on its own queue, so the reload
    /// runs in its context at its next drain. Returns the promoted renderer.
    pub fn task_reset(&self, renderer: RendererId, gpu: Option<&mut dyn GpuDevice>) -> Option<RendererId> {
        if !self.is_registered(renderer) {
            return None;
        }

        let (removed, promoted) = {
            let mut state = self.state.lock();
            state.renderers.retain(|(id, _)| *id != renderer);
            let promoted = state.renderers.last().cloned();

            let removed = if promoted.is_some() {
                let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.registry)
                    .into_iter()
                    .partition(|r| r.owner() == Some(renderer) || !r.can_restore());
                state.registry = kept;
                removed
            } else {
                std::mem::take(&mut state.registry)
            };
            (removed, promoted)
        };

        release_all(&removed, gpu);
        log::debug!(
            "{:?} manager: reset {renderer}, {} resources removed",
            T::MANAGER,
            removed.len()
        );

        let (next, queue) = promoted?;
        log::info!("{:?} manager: {next} promoted after reset of {renderer}", T::MANAGER);
        if !queue.enqueue(FrameTask::new(TaskKind::Reload, TaskPayload::Manager(T::MANAGER))) {
            log::warn!("{next} no longer accepts tasks, reload skipped");
        }
        Some(next)
    }

    /// Forgets every handle stamped with `context`. Registry entries are kept.
    pub fn invalidate_context(&self, context: ContextId) -> usize {
        self.registry()
            .iter()
            .filter(|r| r.invalidate(context))
            .count()
    }

    /// Drops all state without touching any device.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        for resource in state.registry.drain(..) {
            resource.slot().forget();
        }
        state.renderers.clear();
    }
}

fn release_all<T: ManagedResource>(resources: &[Arc<T>], gpu: Option<&mut dyn GpuDevice>) {
    match gpu {
        Some(gpu) => {
            for r in resources {
                r.destroy(gpu);
            }
        }
        None => {
            for r in resources {
                r.slot().forget();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuError, HeadlessDevice};
    use crate::resource::{GpuResource, Texture};
    use crate::task::TaskPayload;

    fn tex(name: &str) -> Arc<Texture> {
        Arc::new(Texture::from_pixels(name, 1, 1, vec![1, 2, 3, 4]))
    }

    fn names(m: &ResourceManager<Texture>) -> Vec<String> {
        m.registry().iter().map(|t| t.name().to_string()).collect()
    }

    /// Applies queued texture tasks the way the renderer's dispatch does.
    fn drain(m: &ResourceManager<Texture>, q: &FrameTaskQueue, id: RendererId, gpu: &mut HeadlessDevice) {
        q.drain(|task| match task.into_parts() {
            (TaskKind::Add, TaskPayload::Texture(t), _) => m.task_add(t, id, gpu),
            (TaskKind::AddAll, TaskPayload::Textures(v), _) => v.into_iter().for_each(|t| m.task_add(t, id, gpu)),
            (TaskKind::Remove, TaskPayload::Texture(t), _) => m.task_remove(&t, gpu),
            (TaskKind::Replace, TaskPayload::TextureSwap { old, new }, _) => m.task_replace(&old, new, id, gpu),
            (TaskKind::Reload, TaskPayload::Manager(_), _) => {
                m.task_reload(id, gpu);
            }
            other => panic!("unexpected task {other:?}"),
        });
    }

    // ── registration ──

    #[test]
    fn queue_without_renderer_is_rejected() {
        let m = ResourceManager::<Texture>::new();
        assert!(!m.queue_add(tex("a")));
        assert!(!m.queue_reload());
    }

    #[test]
    fn second_registration_becomes_active_without_moving_the_first() {
        let m = ResourceManager::<Texture>::new();
        let (r1, r2) = (RendererId::next(), RendererId::next());
        assert!(m.register_renderer(r1, FrameTaskQueue::new()));
        assert!(m.register_renderer(r2, FrameTaskQueue::new()));
        assert!(!m.register_renderer(r1, FrameTaskQueue::new()));
        assert_eq!(m.renderers(), vec![r1, r2]);
        assert_eq!(m.active(), Some(r2));
    }

    // ── ordering ──

    #[test]
    fn interleaved_tasks_apply_in_enqueue_order() {
        let m = ResourceManager::<Texture>::new();
        let q = FrameTaskQueue::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, q.clone());

        let (a, b, c, d) = (tex("a"), tex("b"), tex("c"), tex("d"));
        assert!(m.queue_add(a.clone()));
        assert!(m.queue_add_all(vec![b.clone(), c.clone()]));
        assert!(m.queue_remove(a.clone()));
        assert!(m.queue_replace(b.clone(), d.clone()));
        assert!(m.queue_add(a.clone()));
        drain(&m, &q, id, &mut gpu);

        assert_eq!(names(&m), ["d", "c", "a"]);
        assert_eq!(b.handle(), None);
        assert_eq!(gpu.live_textures(), 3);
        assert!(m.registry().iter().all(|t| t.handle().is_some()));
    }

    #[test]
    fn remove_before_add_is_a_noop() {
        let m = ResourceManager::<Texture>::new();
        let q = FrameTaskQueue::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, q.clone());

        let a = tex("a");
        m.queue_remove(a.clone());
        m.queue_add(a.clone());
        drain(&m, &q, id, &mut gpu);
        assert_eq!(names(&m), ["a"]);
    }

    #[test]
    fn adding_the_same_resource_twice_registers_once() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());

        let a = tex("a");
        m.task_add(a.clone(), id, &mut gpu);
        m.task_add(a.clone(), id, &mut gpu);
        assert_eq!(m.len(), 1);
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn replace_with_itself_reuploads_in_place() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());

        let (a, b) = (tex("a"), tex("b"));
        m.task_add(a.clone(), id, &mut gpu);
        m.task_add(b.clone(), id, &mut gpu);
        let before = a.handle();
        m.task_replace(&a, a.clone(), id, &mut gpu);

        assert_eq!(names(&m), ["a", "b"]);
        assert_ne!(a.handle(), before);
        assert_eq!(gpu.live_textures(), 2);
    }

    #[test]
    fn failed_create_still_registers() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new().with_texture_limit(1);
        m.register_renderer(id, FrameTaskQueue::new());

        let (a, b) = (tex("a"), tex("b"));
        m.task_add(a.clone(), id, &mut gpu);
        m.task_add(b.clone(), id, &mut gpu);
        assert_eq!(m.len(), 2);
        assert_eq!(b.handle(), None);
        assert_eq!(b.last_error(), Some(GpuError::OutOfTextureUnits { limit: 1 }));
    }

    // ── reload / reset ──

    #[test]
    fn reload_keeps_order_and_identity() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut first = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());

        let all = vec![tex("a"), tex("b"), tex("c")];
        for t in &all {
            m.task_add(t.clone(), id, &mut first);
        }
        assert_eq!(m.invalidate_context(first.context_id()), 3);
        assert!(all.iter().all(|t| t.handle().is_none()));

        let mut second = HeadlessDevice::new();
        assert_eq!(m.task_reload(id, &mut second), 3);
        let handles: Vec<_> = m.registry().iter().map(|t| t.handle().unwrap().raw()).collect();
        assert_eq!(handles, [1, 2, 3]);
        assert!(m.registry().iter().zip(&all).all(|(a, b)| Arc::ptr_eq(a, b)));
    }

    #[test]
    fn reload_drops_released_sources() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());

        let keep = tex("keep");
        let gone = Arc::new(Texture::from_pixels("gone", 1, 1, vec![0; 4]).release_source_after_upload(true));
        m.task_add(keep.clone(), id, &mut gpu);
        m.task_add(gone.clone(), id, &mut gpu);

        m.task_reload(id, &mut gpu);
        assert_eq!(names(&m), ["keep"]);
        assert_eq!(gone.handle(), None);
    }

    #[test]
    fn reload_for_unknown_renderer_is_silent() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());
        let a = tex("a");
        m.task_add(a.clone(), id, &mut gpu);
        let before = a.handle();

        assert_eq!(m.task_reload(RendererId::next(), &mut gpu), 0);
        assert_eq!(m.task_reset(RendererId::next(), Some(&mut gpu)), None);
        assert_eq!(m.len(), 1);
        assert_eq!(a.handle(), before);
    }

    #[test]
    fn inactive_renderer_reloads_its_own_resources() {
        let m = ResourceManager::<Texture>::new();
        let (r1, r2) = (RendererId::next(), RendererId::next());
        let mut gpu1 = HeadlessDevice::new();
        let mut gpu2 = HeadlessDevice::new();
        m.register_renderer(r1, FrameTaskQueue::new());
        let (a, b) = (tex("a"), tex("b"));
        m.task_add(a.clone(), r1, &mut gpu1);
        m.register_renderer(r2, FrameTaskQueue::new());
        let x = tex("x");
        m.task_add(x.clone(), r2, &mut gpu2);
        m.task_add(b.clone(), r1, &mut gpu1);
        let x_handle = x.slot().handle_in(gpu2.context_id());

        m.invalidate_context(gpu1.context_id());
        let mut fresh = HeadlessDevice::new();
        assert_eq!(m.task_reload(r1, &mut fresh), 2);

        assert_eq!(names(&m), ["a", "x", "b"]);
        for t in [&a, &b] {
            let handle = t.slot().handle_in(fresh.context_id()).unwrap();
            assert!(fresh.is_texture_live(handle));
        }
        assert_eq!(fresh.live_textures(), 2);
        assert_eq!(x.slot().handle_in(gpu2.context_id()), x_handle);
        assert_eq!(m.active(), Some(r2));
    }

    #[test]
    fn active_reload_leaves_other_contexts_alone() {
        let m = ResourceManager::<Texture>::new();
        let (r1, r2) = (RendererId::next(), RendererId::next());
        let mut gpu1 = HeadlessDevice::new();
        let mut gpu2 = HeadlessDevice::new();
        m.register_renderer(r1, FrameTaskQueue::new());
        let a = tex("a");
        m.task_add(a.clone(), r1, &mut gpu1);
        m.register_renderer(r2, FrameTaskQueue::new());
        let x = tex("x");
        m.task_add(x.clone(), r2, &mut gpu2);
        let a_handle = a.slot().handle_in(gpu1.context_id()).unwrap();

        m.invalidate_context(gpu2.context_id());
        let mut fresh = HeadlessDevice::new();
        assert_eq!(m.task_reload(r2, &mut fresh), 1);

        assert_eq!(a.slot().handle_in(gpu1.context_id()), Some(a_handle));
        assert!(gpu1.is_texture_live(a_handle));
        assert_eq!(a.owner(), Some(r1));
        assert!(x.slot().handle_in(fresh.context_id()).is_some());
        assert_eq!(fresh.live_textures(), 1);
    }

    #[test]
    fn reload_adopts_resources_of_departed_owners() {
        let m = ResourceManager::<Texture>::new();
        let (gone, r) = (RendererId::next(), RendererId::next());
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(r, FrameTaskQueue::new());
        let a = tex("a");
        m.task_add(a.clone(), gone, &mut gpu);

        assert_eq!(m.task_reload(r, &mut gpu), 1);
        assert_eq!(a.owner(), Some(r));
        assert_eq!(gpu.live_textures(), 1);
    }

    #[test]
    fn reset_promotes_and_reload_reproduces_registry() {
        let m = ResourceManager::<Texture>::new();
        let (r1, r2) = (RendererId::next(), RendererId::next());
        let (q1, q2) = (FrameTaskQueue::new(), FrameTaskQueue::new());
        let mut gpu1 = HeadlessDevice::new();
        let mut gpu2 = HeadlessDevice::new();

        m.register_renderer(r1, q1.clone());
        let own = vec![tex("a"), tex("b")];
        for t in &own {
            m.task_add(t.clone(), r1, &mut gpu1);
        }
        m.register_renderer(r2, q2.clone());
        let foreign = tex("x");
        m.task_add(foreign.clone(), r2, &mut gpu2);
        let before: Vec<_> = m.registry().into_iter().filter(|t| t.owner() == Some(r1)).collect();

        assert_eq!(m.task_reset(r2, Some(&mut gpu2)), Some(r1));
        assert_eq!(m.active(), Some(r1));
        assert!(!m.contains(&foreign));
        assert_eq!(gpu2.live_textures(), 0);
        assert_eq!(q1.len(), 1);
        assert!(q2.is_empty());

        drain(&m, &q1, r1, &mut gpu1);
        let after = m.registry();
        assert_eq!(after.len(), before.len());
        assert!(after.iter().zip(&before).all(|(a, b)| Arc::ptr_eq(a, b)));
        assert!(after.iter().all(|t| gpu1.is_texture_live(t.handle().unwrap())));
        assert_eq!(gpu1.live_textures(), 2);
    }

    #[test]
    fn reset_of_last_renderer_clears_everything() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());
        m.task_add(tex("a"), id, &mut gpu);

        assert_eq!(m.task_reset(id, Some(&mut gpu)), None);
        assert!(m.is_empty());
        assert!(m.renderers().is_empty());
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn reset_without_device_forgets_handles() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());
        let a = tex("a");
        m.task_add(a.clone(), id, &mut gpu);

        m.task_reset(id, None);
        assert_eq!(a.handle(), None);
    }

    #[test]
    fn clear_keeps_registration() {
        let m = ResourceManager::<Texture>::new();
        let id = RendererId::next();
        let mut gpu = HeadlessDevice::new();
        m.register_renderer(id, FrameTaskQueue::new());
        m.task_add(tex("a"), id, &mut gpu);

        assert_eq!(m.task_clear(id, Some(&mut gpu)), 1);
        assert!(m.is_empty());
        assert_eq!(m.active(), Some(id));
    }
}
