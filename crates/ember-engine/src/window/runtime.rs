use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::RenderDelegate;
use crate::device::{GpuInit, WgpuDevice};
use crate::render::Renderer;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "ember".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Events posted to the event loop from other threads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// The frame scheduler wants a redraw.
    RenderRequested,
}

/// Runs one renderer in one window until the window closes.
pub struct Runtime;

impl Runtime {
    pub fn run<D>(config: RuntimeConfig, gpu_init: GpuInit, renderer: Renderer<D>) -> Result<()>
    where
        D: RenderDelegate + 'static,
    {
        let event_loop = EventLoop::<RuntimeEvent>::with_user_event()
            .build()
            .context("failed to create winit EventLoop")?;

        let proxy = Mutex::new(event_loop.create_proxy());
        renderer.set_render_request(move || {
            if proxy.lock().send_event(RuntimeEvent::RenderRequested).is_err() {
                log::trace!("render request after event loop exit");
            }
        });

        let mut state = AppState {
            config,
            gpu_init,
            renderer,
            window: None,
            cursor: None,
        };
        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;
        Ok(())
    }
}

struct AppState<D: RenderDelegate> {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    renderer: Renderer<D>,
    window: Option<Arc<Window>>,
    cursor: Option<PhysicalPosition<f64>>,
}

impl<D: RenderDelegate> AppState<D> {
    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        if let Some(window) = &self.window {
            return Ok(window.clone());
        }
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(event_loop.create_window(attrs).context("failed to create window")?);
        self.window = Some(window.clone());
        Ok(window)
    }

    /// Creates a fresh context for the window and hands it to the renderer.
    fn create_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = self.ensure_window(event_loop)?;
        let size = window.inner_size();
        let device = pollster::block_on(WgpuDevice::new(window.clone(), &self.gpu_init))
            .context("GPU initialization failed")?;
        self.renderer
            .on_surface_created(Box::new(device), size.width, size.height);
        window.request_redraw();
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.renderer.destroy();
        event_loop.exit();
    }
}

impl<D: RenderDelegate> ApplicationHandler<RuntimeEvent> for AppState<D> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Err(e) = self.create_surface(event_loop) {
            log::error!("failed to create surface: {e:#}");
            self.shutdown(event_loop);
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer.on_surface_destroyed();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: RuntimeEvent) {
        match event {
            RuntimeEvent::RenderRequested => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),

            WindowEvent::Resized(size) => {
                self.renderer.on_surface_size_changed(size.width, size.height);
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    self.renderer.on_surface_size_changed(size.width, size.height);
                }
            }

            WindowEvent::Occluded(hidden) => {
                if hidden {
                    self.renderer.on_pause();
                } else {
                    self.renderer.on_resume();
                }
            }

            WindowEvent::CursorMoved { position, .. } => self.cursor = Some(position),
            WindowEvent::CursorLeft { .. } => self.cursor = None,

            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(pos) = self.cursor {
                    self.renderer.on_pointer_down(pos.x as f32, pos.y as f32);
                }
            }

            WindowEvent::RedrawRequested => self.renderer.on_render_frame(),

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer.destroy();
    }
}
