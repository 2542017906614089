use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ember_engine::device::GpuInit;
use ember_engine::gpu::{ClearColor, QuadRect};
use ember_engine::loader::{LoadCallback, LoaderConfig, LoaderPool, ModelLoader};
use ember_engine::logging::{LoggingConfig, init_logging};
use ember_engine::render::{Compositor, PipLayout, Renderer, RendererConfig, SceneRenderer};
use ember_engine::resource::{ResourceHub, Texture};
use ember_engine::scene::{ColorScene, SceneHandle};
use ember_engine::window::{Runtime, RuntimeConfig};
use parking_lot::Mutex;
use winit::dpi::LogicalSize;

const CHECKER_SIZE: u32 = 64;

/// Procedural RGBA checkerboard, "parsed" on a loader thread.
struct CheckerLoader {
    name: String,
    cell: u32,
    a: [u8; 4],
    b: [u8; 4],
    out: Arc<Mutex<Option<Vec<u8>>>>,
}

impl ModelLoader for CheckerLoader {
    fn parse(&mut self) -> Result<()> {
        if self.cell == 0 {
            bail!("checker cell size must be non-zero");
        }
        let mut pixels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
        for y in 0..CHECKER_SIZE {
            for x in 0..CHECKER_SIZE {
                let even = (x / self.cell + y / self.cell) % 2 == 0;
                pixels.extend_from_slice(if even { &self.a } else { &self.b });
            }
        }
        *self.out.lock() = Some(pixels);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct Preload;

impl LoadCallback for Preload {
    fn on_model_load_complete(&mut self, loader: Box<dyn ModelLoader>, tag: u32) {
        log::info!("loaded `{}` (tag {tag})", loader.name());
    }

    fn on_model_load_failed(&mut self, loader: Box<dyn ModelLoader>, tag: u32, error: &anyhow::Error) {
        log::error!("failed to load `{}` (tag {tag}): {error:#}", loader.name());
    }
}

/// Builds the checker textures on the loader pool and waits for them.
fn preload_textures() -> Result<Vec<Arc<Texture>>> {
    let mut pool = LoaderPool::new(LoaderConfig::default())?;
    let checkers = [
        ("checker.warm", 8, [240, 180, 60, 255], [120, 40, 20, 255]),
        ("checker.cool", 16, [60, 180, 240, 255], [20, 40, 120, 255]),
    ];

    let mut slots = Vec::new();
    for (tag, (name, cell, a, b)) in checkers.into_iter().enumerate() {
        let out = Arc::new(Mutex::new(None));
        let loader = CheckerLoader {
            name: name.to_string(),
            cell,
            a,
            b,
            out: out.clone(),
        };
        let id = pool.load_model(Box::new(loader), Box::new(Preload), tag as u32);
        log::debug!("queued {id} for `{name}`");
        slots.push((name, out));
    }

    while pool.pending() > 0 {
        if pool.dispatch_completed() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    pool.shutdown();

    slots
        .into_iter()
        .map(|(name, out)| {
            let pixels = out.lock().take().with_context(|| format!("`{name}` produced no pixels"))?;
            Ok(Arc::new(Texture::from_pixels(name, CHECKER_SIZE, CHECKER_SIZE, pixels)))
        })
        .collect()
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let textures = preload_textures()?;
    let (warm, cool) = match textures.as_slice() {
        [warm, cool] => (warm.clone(), cool.clone()),
        _ => bail!("expected two preloaded textures"),
    };

    let main_scene = SceneHandle::new(
        ColorScene::new(ClearColor::new(0.08, 0.09, 0.12, 1.0))
            .with_quad(warm.clone(), QuadRect::new(0.1, 0.15, 0.35, 0.7))
            .with_quad(cool.clone(), QuadRect::new(0.55, 0.15, 0.35, 0.7)),
    );
    let mini_scene = SceneHandle::new(
        ColorScene::new(ClearColor::new(0.3, 0.05, 0.1, 1.0)).with_quad(cool.clone(), QuadRect::new(0.2, 0.2, 0.6, 0.6)),
    );

    let compositor = Compositor::pip(
        SceneRenderer::new(main_scene),
        SceneRenderer::new(mini_scene),
        PipLayout::default(),
    );
    let mut renderer = Renderer::new(ResourceHub::new(), RendererConfig::default(), compositor);
    renderer.handle().add_textures(vec![warm, cool]);
    renderer.set_fps_listener(|fps: f64| log::info!("{fps:.1} fps"));

    let config = RuntimeConfig {
        title: "ember studio".to_string(),
        initial_size: LogicalSize::new(960.0, 540.0),
    };
    Runtime::run(config, GpuInit::default(), renderer)
}
