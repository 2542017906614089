//! Window and event loop.
//!
//! Maps `winit` lifecycle events onto the renderer's platform callbacks:
//! resume creates a context, suspend loses it, close tears the renderer down.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeEvent};
