use std::time::Instant;

/// Receives frame-rate measurements.
pub trait FpsListener: Send {
    fn on_fps_update(&mut self, fps: f64);
}

impl<F: FnMut(f64) + Send> FpsListener for F {
    fn on_fps_update(&mut self, fps: f64) {
        self(fps)
    }
}

/// Measures frames per second over windows of a fixed number of frames.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window: u32,
    frames: u32,
    window_start: Instant,
    last: Option<f64>,
}

impl FpsMeter {
    pub const DEFAULT_WINDOW: u32 = 50;

    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    pub fn with_window(window: u32) -> Self {
        Self {
            window: window.max(1),
            frames: 0,
            window_start: Instant::now(),
            last: None,
        }
    }

    pub fn reset(&mut self) {
        self.frames = 0;
        self.window_start = Instant::now();
    }

    pub fn last_measured(&self) -> Option<f64> {
        self.last
    }

    /// Counts a frame. Returns a new measurement when a window completes.
    pub fn frame_rendered(&mut self) -> Option<f64> {
        self.frame_rendered_at(Instant::now())
    }

    pub fn frame_rendered_at(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        if self.frames < self.window {
            return None;
        }

        let secs = now.saturating_duration_since(self.window_start).as_secs_f64();
        let fps = if secs > 0.0 { f64::from(self.frames) / secs } else { f64::INFINITY };
        self.frames = 0;
        self.window_start = now;
        self.last = Some(fps);
        Some(fps)
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn reports_once_per_window() {
        let mut meter = FpsMeter::with_window(50);
        let start = Instant::now();
        meter.window_start = start;

        for i in 1..50 {
            assert_eq!(meter.frame_rendered_at(start + Duration::from_millis(20 * i)), None);
        }
        let fps = meter.frame_rendered_at(start + Duration::from_secs(1)).unwrap();
        assert!((fps - 50.0).abs() < 1e-6);
        assert_eq!(meter.last_measured(), Some(fps));
        assert_eq!(meter.frame_rendered_at(start + Duration::from_secs(2)), None);
    }

    #[test]
    fn closures_are_listeners() {
        let mut seen = Vec::new();
        {
            let mut listener = |fps: f64| seen.push(fps);
            listener.on_fps_update(30.0);
        }
        assert_eq!(seen, [30.0]);
    }
}
