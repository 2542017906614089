use thiserror::Error;

use crate::gpu::GpuError;

/// Failure of one frame task. Logged at the dispatch boundary; never stops the drain.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("scene index {index} out of range ({len} scenes)")]
    SceneIndex { index: usize, len: usize },

    #[error("refusing to remove the current scene")]
    CurrentScene,

    #[error("{0}")]
    Failed(String),
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
