//! Core engine-facing contracts.
//!
//! This module defines the interface between the renderer (platform callbacks,
//! task drain, context recovery) and the code that decides what a frame draws.

mod app;
mod ctx;

pub use app::{DefaultDelegate, RenderDelegate};
pub use ctx::FrameCtx;
