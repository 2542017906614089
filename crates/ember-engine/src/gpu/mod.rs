//! GPU context abstraction.
//!
//! Everything above this module talks to the live context through [`GpuDevice`].
//! A device value *is* the context: dropping it is a context loss, and every
//! handle it produced is stamped with its [`ContextId`] so stale handles from a
//! previous context can never be mistaken for live ones.
//!
//! Two implementations exist:
//! - [`HeadlessDevice`]: in-memory bookkeeping, used by tests and offscreen tools
//! - `device::WgpuDevice`: the wgpu-backed context driven by the window runtime

mod device;
mod error;
mod handle;
mod headless;

pub use device::{ClearColor, FramebufferDesc, GpuDevice, ProgramDesc, QuadRect, TextureDesc};
pub use error::GpuError;
pub use handle::{ContextHandle, ContextId, GpuHandle, RendererId};
pub use headless::{CommandLog, DrawCommand, HeadlessDevice};
