//! Time subsystem.
//!
//! - `FrameClock`: per-renderer elapsed/delta timing, ticked once per frame
//! - `FpsMeter`: frame-rate measurement over fixed frame windows
//! - `FrameScheduler`: fixed-rate timer thread that requests redraws

mod fps;
mod frame_clock;
mod scheduler;

pub use fps::{FpsListener, FpsMeter};
pub use frame_clock::{FrameClock, FrameTime};
pub use scheduler::{FrameScheduler, RenderRequest};
