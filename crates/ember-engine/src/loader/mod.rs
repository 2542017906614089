//! Background model parsing.
//!
//! Parsing runs on a small worker pool; results come back to whoever owns the
//! [`LoaderPool`] (the UI thread) through [`LoaderPool::dispatch_completed`].
//! Nothing here touches the GPU: a parsed model is handed to a renderer through
//! its `RendererHandle` like any other resource.

mod pool;

pub use pool::{LoadCallback, LoadId, LoaderConfig, LoaderPool, ModelLoader};
