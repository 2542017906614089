//! Multi-pass compositing: picture-in-picture and side-by-side.
//!
//! Each frame every pass renders its sub-renderer's scene into its own
//! [`RenderTarget`], then the composite scene draws one screen quad per pass,
//! textured with that pass's target, to the surface.

use std::sync::Arc;

use crate::core::{FrameCtx, RenderDelegate};
use crate::gpu::{ClearColor, GpuDevice, GpuError, QuadRect};
use crate::resource::{GpuResource, Texture};
use crate::scene::{Scene, SceneHandle, SceneTime};
use crate::time::FrameTime;

use super::{RenderCore, RenderTarget, Viewport};

/// Source of one compositor pass.
pub trait SubRenderer {
    /// Builds the sub-renderer's scenes. Runs inside the compositor's own scene setup.
    fn init_scene(&mut self, core: &mut RenderCore) -> anyhow::Result<()>;

    fn current_scene(&self) -> Option<SceneHandle>;

    /// Per-frame hook, before the pass renders.
    fn on_frame(&mut self, time: &FrameTime) {
        let _ = time;
    }
}

/// Sub-renderer that draws a single scene.
#[derive(Debug, Clone)]
pub struct SceneRenderer {
    scene: SceneHandle,
}

impl SceneRenderer {
    pub fn new(scene: SceneHandle) -> Self {
        Self { scene }
    }
}

impl SubRenderer for SceneRenderer {
    fn init_scene(&mut self, core: &mut RenderCore) -> anyhow::Result<()> {
        core.add_scene(self.scene.clone());
        Ok(())
    }

    fn current_scene(&self) -> Option<SceneHandle> {
        Some(self.scene.clone())
    }
}

/// Placement of the mini view, in the top-right corner.
///
/// `scale` is the fraction of the surface the mini view covers on each axis;
/// margins are in pixels from the right and top edges.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PipLayout {
    pub scale: f32,
    pub margin_x: f32,
    pub margin_y: f32,
}

impl Default for PipLayout {
    fn default() -> Self {
        Self {
            scale: 0.25,
            margin_x: 16.0,
            margin_y: 16.0,
        }
    }
}

/// Where a pass lands on the surface.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PassLayout {
    Full,
    LeftHalf,
    RightHalf,
    Inset(PipLayout),
}

impl PassLayout {
    /// Normalized screen rect for a surface of the given size.
    pub fn resolve(self, viewport: Viewport) -> QuadRect {
        match self {
            Self::Full => QuadRect::FULL,
            Self::LeftHalf => QuadRect::new(0.0, 0.0, 0.5, 1.0),
            Self::RightHalf => QuadRect::new(0.5, 0.0, 0.5, 1.0),
            Self::Inset(pip) => {
                let (mx, my) = if viewport.is_valid() {
                    (pip.margin_x / viewport.width as f32, pip.margin_y / viewport.height as f32)
                } else {
                    (0.0, 0.0)
                };
                QuadRect::new(1.0 - pip.scale - mx, my, pip.scale, pip.scale)
            }
        }
    }

    /// Size of the pass's render target.
    fn target_size(self, viewport: Viewport) -> (u32, u32) {
        match self {
            Self::LeftHalf | Self::RightHalf => ((viewport.width / 2).max(1), viewport.height.max(1)),
            Self::Full | Self::Inset(_) => (viewport.width.max(1), viewport.height.max(1)),
        }
    }

    /// Half-width targets are sized by the compositor; the others follow the surface.
    fn follows_surface(self) -> bool {
        matches!(self, Self::Full | Self::Inset(_))
    }
}

struct Pass {
    name: String,
    renderer: Box<dyn SubRenderer>,
    layout: PassLayout,
    target: Option<Arc<RenderTarget>>,
}

/// Screen quads textured with each pass's target, in pass order.
struct CompositeScene {
    layers: Vec<(Arc<Texture>, PassLayout)>,
    rects: Vec<QuadRect>,
    clear: ClearColor,
}

impl Scene for CompositeScene {
    fn update_projection_matrix(&mut self, width: u32, height: u32) {
        let vp = Viewport::new(width, height);
        self.rects = self.layers.iter().map(|(_, layout)| layout.resolve(vp)).collect();
    }

    fn render(
        &mut self,
        gpu: &mut dyn GpuDevice,
        _time: SceneTime,
        _target: Option<&RenderTarget>,
    ) -> Result<(), GpuError> {
        gpu.clear(self.clear);
        let context = gpu.context_id();
        for ((texture, _), rect) in self.layers.iter().zip(&self.rects) {
            match texture.slot().handle_in(context) {
                Some(handle) => gpu.draw_textured_quad(handle, *rect)?,
                None => log::debug!("composite layer `{}` has no texture", texture.name()),
            }
        }
        Ok(())
    }
}

/// Render delegate that runs N off-screen passes and composites them.
pub struct Compositor {
    passes: Vec<Pass>,
    composite: Option<SceneHandle>,
    viewport: Viewport,
    clear: ClearColor,
    focused: Option<usize>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            composite: None,
            viewport: Viewport::default(),
            clear: ClearColor::BLACK,
            focused: None,
        }
    }

    /// Adds a pass. Passes render and composite in the order they were added.
    pub fn with_pass(
        mut self,
        name: impl Into<String>,
        renderer: impl SubRenderer + 'static,
        layout: PassLayout,
    ) -> Self {
        self.passes.push(Pass {
            name: name.into(),
            renderer: Box::new(renderer),
            layout,
            target: None,
        });
        self
    }

    pub fn with_clear_color(mut self, clear: ClearColor) -> Self {
        self.clear = clear;
        self
    }

    /// `main` fills the surface, `mini` is inset in the top-right corner.
    pub fn pip(main: impl SubRenderer + 'static, mini: impl SubRenderer + 'static, layout: PipLayout) -> Self {
        Self::new()
            .with_pass("pip.main", main, PassLayout::Full)
            .with_pass("pip.mini", mini, PassLayout::Inset(layout))
    }

    /// Each eye gets half of the surface width.
    pub fn side_by_side(left: impl SubRenderer + 'static, right: impl SubRenderer + 'static) -> Self {
        Self::new()
            .with_pass("sbs.left", left, PassLayout::LeftHalf)
            .with_pass("sbs.right", right, PassLayout::RightHalf)
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn target(&self, pass: usize) -> Option<&Arc<RenderTarget>> {
        self.passes.get(pass).and_then(|p| p.target.as_ref())
    }

    pub fn composite_scene(&self) -> Option<&SceneHandle> {
        self.composite.as_ref()
    }

    /// Topmost pass under a surface position in pixels.
    pub fn pass_at(&self, x: f32, y: f32) -> Option<usize> {
        if !self.viewport.is_valid() {
            return None;
        }
        let (nx, ny) = (x / self.viewport.width as f32, y / self.viewport.height as f32);
        self.passes
            .iter()
            .rposition(|p| p.layout.resolve(self.viewport).contains(nx, ny))
    }

    /// Pass that received the last pointer press.
    pub fn focused_pass(&self) -> Option<usize> {
        self.focused
    }

    /// Whether a surface position in pixels falls on an inset (mini) pass.
    pub fn hit_test_mini(&self, x: f32, y: f32) -> bool {
        self.pass_at(x, y)
            .is_some_and(|i| matches!(self.passes[i].layout, PassLayout::Inset(_)))
    }
}

impl RenderDelegate for Compositor {
    fn init_scene(&mut self, core: &mut RenderCore) -> anyhow::Result<()> {
        self.viewport = core.viewport();

        let mut layers = Vec::with_capacity(self.passes.len());
        for pass in &mut self.passes {
            let (w, h) = pass.layout.target_size(self.viewport);
            let target = Arc::new(
                RenderTarget::new(pass.name.clone(), w, h).with_fullscreen(pass.layout.follows_surface()),
            );
            if let Err(err) = core.add_render_target(target.clone()) {
                log::error!("render target for pass `{}`: {err}", pass.name);
            }
            layers.push((target.texture().clone(), pass.layout));
            pass.target = Some(target);
        }

        let composite = SceneHandle::new(CompositeScene {
            layers,
            rects: Vec::new(),
            clear: self.clear,
        });
        core.add_scene(composite.clone());
        self.composite = Some(composite);

        for pass in &mut self.passes {
            pass.renderer.init_scene(core)?;
        }
        Ok(())
    }

    fn on_render(&mut self, ctx: &mut FrameCtx<'_>) -> anyhow::Result<()> {
        let time = ctx.time;
        let core = &mut *ctx.core;
        let user = core.current_scene();

        for pass in &mut self.passes {
            let (Some(scene), Some(target)) = (pass.renderer.current_scene(), pass.target.clone()) else {
                continue;
            };
            pass.renderer.on_frame(&time);
            core.switch_scene_direct(scene);
            core.set_render_target(Some(target));
            if let Err(err) = core.render(time.scene_time()) {
                log::warn!("pass `{}` failed: {err}", pass.name);
            }
        }
        core.set_render_target(None);

        let result = match &self.composite {
            Some(composite) => {
                core.switch_scene_direct(composite.clone());
                core.render(time.scene_time())
            }
            None => Ok(()),
        };
        if let Some(user) = user {
            core.switch_scene_direct(user);
        }
        result?;
        Ok(())
    }

    fn on_resize(&mut self, _core: &mut RenderCore, viewport: Viewport) {
        self.viewport = viewport;
        for pass in &self.passes {
            if let (Some(target), false) = (&pass.target, pass.layout.follows_surface()) {
                let (w, h) = pass.layout.target_size(viewport);
                target.set_size(w, h);
            }
        }
    }

    fn on_pointer_down(&mut self, _core: &mut RenderCore, x: f32, y: f32) {
        self.focused = self.pass_at(x, y);
        if let Some(i) = self.focused {
            log::debug!("pointer down at ({x}, {y}) on pass `{}`", self.passes[i].name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DrawCommand, HeadlessDevice};
    use crate::render::{Renderer, RendererConfig};
    use crate::resource::ResourceHub;
    use crate::testing::{EventLog, ProbeScene};

    const RED: ClearColor = ClearColor::new(1.0, 0.0, 0.0, 1.0);
    const BLUE: ClearColor = ClearColor::new(0.0, 0.0, 1.0, 1.0);

    fn pip(log: &EventLog) -> Renderer<Compositor> {
        let main = SceneRenderer::new(ProbeScene::colored("main", RED, log));
        let mini = SceneRenderer::new(ProbeScene::colored("mini", BLUE, log));
        let layout = PipLayout {
            scale: 0.25,
            margin_x: 25.0,
            margin_y: 25.0,
        };
        Renderer::new(ResourceHub::new(), RendererConfig::default(), Compositor::pip(main, mini, layout))
    }

    #[test]
    fn inset_layout_sits_in_top_right_corner() {
        let layout = PassLayout::Inset(PipLayout {
            scale: 0.25,
            margin_x: 25.0,
            margin_y: 25.0,
        });
        let r = layout.resolve(Viewport::new(200, 100));
        assert_eq!(r, QuadRect::new(0.625, 0.25, 0.25, 0.25));
        assert_eq!(r.to_pixels(200, 100), (125, 25, 50, 25));
    }

    #[test]
    fn pip_frame_renders_passes_then_composite() {
        let log = EventLog::default();
        let mut renderer = pip(&log);
        let gpu = HeadlessDevice::new();
        let commands = gpu.command_log();
        renderer.on_surface_created(Box::new(gpu), 200, 100);
        log.take();
        commands.take();

        renderer.on_render_frame();
        let renders: Vec<_> = log.events().into_iter().filter(|e| e.contains(":render")).collect();
        assert_eq!(renders, ["main:render pip.main", "mini:render pip.mini"]);

        let compositor = renderer.delegate();
        let main_tex = compositor.target(0).unwrap().texture().handle().unwrap();
        let mini_tex = compositor.target(1).unwrap().texture().handle().unwrap();
        assert_eq!(renderer.core().current_scene().as_ref(), compositor.composite_scene());

        let frame_tail: Vec<_> = commands
            .take()
            .into_iter()
            .filter(|c| matches!(c, DrawCommand::Quad { .. } | DrawCommand::Bind(None)))
            .collect();
        assert_eq!(
            frame_tail.last().cloned(),
            Some(DrawCommand::Quad {
                texture: mini_tex,
                rect: QuadRect::new(0.625, 0.25, 0.25, 0.25)
            })
        );
        assert!(frame_tail.contains(&DrawCommand::Quad {
            texture: main_tex,
            rect: QuadRect::FULL
        }));
    }

    #[test]
    fn hit_test_routes_to_mini() {
        let log = EventLog::default();
        let mut renderer = pip(&log);
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 200, 100);

        let compositor = renderer.delegate();
        assert!(compositor.hit_test_mini(150.0, 30.0));
        assert!(!compositor.hit_test_mini(20.0, 80.0));
        assert_eq!(compositor.pass_at(20.0, 80.0), Some(0));

        renderer.on_pointer_down(150.0, 30.0);
        assert_eq!(renderer.delegate().focused_pass(), Some(1));
        renderer.on_pointer_down(20.0, 80.0);
        assert_eq!(renderer.delegate().focused_pass(), Some(0));
    }

    #[test]
    fn side_by_side_targets_track_half_width() {
        let log = EventLog::default();
        let left = SceneRenderer::new(ProbeScene::handle("left", &log));
        let right = SceneRenderer::new(ProbeScene::handle("right", &log));
        let mut renderer = Renderer::new(
            ResourceHub::new(),
            RendererConfig::default(),
            Compositor::side_by_side(left, right),
        );
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 400, 300);

        let left_target = renderer.delegate().target(0).unwrap().clone();
        assert_eq!(left_target.size(), (200, 300));
        assert!(!left_target.is_fullscreen());

        let old_fb = left_target.framebuffer().unwrap();
        renderer.on_surface_size_changed(800, 600);
        assert_eq!(left_target.size(), (400, 600));
        assert_eq!(left_target.texture().size(), (400, 600));

        renderer.on_render_frame();
        assert_ne!(left_target.framebuffer(), Some(old_fb));
        assert!(!left_target.is_stale());
    }

    #[test]
    fn user_scene_is_restored_after_composite() {
        let log = EventLog::default();
        let mut renderer = pip(&log);
        renderer.on_surface_created(Box::new(HeadlessDevice::new()), 200, 100);

        let user = ProbeScene::handle("user", &log);
        let handle = renderer.handle();
        assert!(handle.add_scene(user.clone()));
        assert!(handle.switch_scene(user.clone()));
        renderer.on_render_frame();
        renderer.on_render_frame();

        assert_eq!(renderer.core().current_scene(), Some(user));
        assert_eq!(log.count("user:render surface"), 0);
    }
}
