use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use super::Scene;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SceneId(u64);

static NEXT_SCENE: AtomicU64 = AtomicU64::new(1);

impl SceneId {
    fn next() -> Self {
        Self(NEXT_SCENE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

/// Shared reference to a scene. Equality is identity.
#[derive(Clone)]
pub struct SceneHandle {
    id: SceneId,
    inner: Arc<Mutex<dyn Scene>>,
}

impl SceneHandle {
    pub fn new<S: Scene + 'static>(scene: S) -> Self {
        Self {
            id: SceneId::next(),
            inner: Arc::new(Mutex::new(scene)),
        }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    /// Locks the scene. Only the render thread draws, so this is uncontended
    /// outside of application-side inspection.
    pub fn lock(&self) -> MutexGuard<'_, dyn Scene> {
        self.inner.lock()
    }
}

impl PartialEq for SceneHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SceneHandle {}

impl fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SceneHandle").field(&self.id).finish()
    }
}
