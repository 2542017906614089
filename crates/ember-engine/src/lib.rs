//! Ember engine crate.
//!
//! Render-thread plumbing for a real-time renderer: a per-renderer frame task
//! queue, shared texture and material managers that track which renderer owns
//! the GPU context, recovery after a context loss, off-screen render targets,
//! scene switching and multi-pass compositing. The `device` and `window`
//! modules bind it to `wgpu` and `winit`.

pub mod core;
pub mod device;
pub mod gpu;
pub mod loader;
pub mod logging;
pub mod render;
pub mod resource;
pub mod scene;
pub mod task;
pub mod time;
pub mod window;

#[cfg(test)]
mod testing;
