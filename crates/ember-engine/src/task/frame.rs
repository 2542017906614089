use std::fmt;
use std::sync::Arc;

use crate::gpu::GpuDevice;
use crate::render::RenderTarget;
use crate::resource::{GpuResource, Material, Texture};
use crate::scene::SceneHandle;

use super::TaskError;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskKind {
    Add,
    AddAll,
    Remove,
    RemoveAll,
    Replace,
    Reload,
    Reset,
    Initialize,
}

/// Which process-wide manager a `Reload`/`Reset` task addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ManagerKind {
    Textures,
    Materials,
}

/// One-shot render-thread closure carried by an `Initialize` task.
pub struct Initializer(Box<dyn FnOnce(&mut dyn GpuDevice) -> Result<(), TaskError> + Send>);

impl Initializer {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&mut dyn GpuDevice) -> Result<(), TaskError> + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn run(self, gpu: &mut dyn GpuDevice) -> Result<(), TaskError> {
        (self.0)(gpu)
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Initializer(..)")
    }
}

/// The object or collection a task mutates.
pub enum TaskPayload {
    Texture(Arc<Texture>),
    Textures(Vec<Arc<Texture>>),
    TextureSwap { old: Arc<Texture>, new: Arc<Texture> },
    Material(Arc<Material>),
    Materials(Vec<Arc<Material>>),
    MaterialSwap { old: Arc<Material>, new: Arc<Material> },
    Scene(SceneHandle),
    Scenes(Vec<SceneHandle>),
    RenderTarget(Arc<RenderTarget>),
    Manager(ManagerKind),
    Initializer(Initializer),
}

impl fmt::Debug for TaskPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Texture(t) => write!(f, "Texture({})", t.name()),
            Self::Textures(v) => write!(f, "Textures(len={})", v.len()),
            Self::TextureSwap { old, new } => write!(f, "TextureSwap({} -> {})", old.name(), new.name()),
            Self::Material(m) => write!(f, "Material({})", m.name()),
            Self::Materials(v) => write!(f, "Materials(len={})", v.len()),
            Self::MaterialSwap { old, new } => {
                write!(f, "MaterialSwap({} -> {})", old.name(), new.name())
            }
            Self::Scene(s) => write!(f, "Scene({})", s.id()),
            Self::Scenes(v) => write!(f, "Scenes(len={})", v.len()),
            Self::RenderTarget(t) => write!(f, "RenderTarget({})", t.name()),
            Self::Manager(m) => write!(f, "Manager({m:?})"),
            Self::Initializer(i) => write!(f, "{i:?}"),
        }
    }
}

/// A deferred mutation. Immutable once built.
#[derive(Debug)]
pub struct FrameTask {
    kind: TaskKind,
    payload: TaskPayload,
    index: Option<usize>,
}

impl FrameTask {
    pub fn new(kind: TaskKind, payload: TaskPayload) -> Self {
        Self {
            kind,
            payload,
            index: None,
        }
    }

    /// Positional hint for scene tasks (`Add` at a position, `Replace` at a position).
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn into_parts(self) -> (TaskKind, TaskPayload, Option<usize>) {
        (self.kind, self.payload, self.index)
    }
}
