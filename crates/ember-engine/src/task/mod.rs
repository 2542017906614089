//! Deferred render-thread mutations.
//!
//! Producer threads build a [`FrameTask`] and push it on a renderer's
//! [`FrameTaskQueue`]; the render thread drains the queue once per frame,
//! before drawing, in strict FIFO order.

mod error;
mod frame;
mod queue;

pub use error::TaskError;
pub(crate) use error::panic_message;
pub use frame::{FrameTask, Initializer, ManagerKind, TaskKind, TaskPayload};
pub use queue::FrameTaskQueue;
