use crate::gpu::ClearColor;

/// Renderer configuration.
///
/// `scene_caching` selects the recovery path after a context loss: reload
/// everything in place (`true`) or clear and run scene initialization again.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub frame_rate: f64,
    pub scene_caching: bool,
    /// Used instead of the surface size for projection and viewport.
    pub viewport_override: Option<(u32, u32)>,
    pub clear_color: ClearColor,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            scene_caching: true,
            viewport_override: None,
            clear_color: ClearColor::BLACK,
        }
    }
}
