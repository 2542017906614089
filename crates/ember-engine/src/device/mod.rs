//! wgpu implementation of [`GpuDevice`](crate::gpu::GpuDevice).
//!
//! One [`WgpuDevice`] is one context: the window runtime creates a new one on
//! every resume and drops it on suspend, which the renderer sees as a context
//! loss.

mod blit;
mod gpu;
mod init;

pub use gpu::WgpuDevice;
pub use init::GpuInit;
