//! Renderers and what they draw into.
//!
//! A [`Renderer`] owns one GPU context at a time and survives losing it: the
//! platform drives it through `on_surface_created` / `on_surface_destroyed`,
//! and it either reloads its cached resources in place or rebuilds its scene.
//!
//! Other threads talk to a renderer only through a [`RendererHandle`], which
//! enqueues frame tasks that run at the start of the next frame.

mod compositor;
mod config;
mod context;
mod handle;
mod renderer;
mod switcher;
mod target;
mod viewport;

pub use compositor::{Compositor, PassLayout, PipLayout, SceneRenderer, SubRenderer};
pub use config::RendererConfig;
pub use context::ContextState;
pub use handle::RendererHandle;
pub use renderer::{RenderCore, Renderer};
pub use switcher::{PendingScene, SceneSwitcher};
pub use target::RenderTarget;
pub use viewport::Viewport;
