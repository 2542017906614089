use std::time::{Duration, Instant};

use crate::scene::SceneTime;

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Nanoseconds since rendering (re)started.
    pub elapsed_nanos: u64,

    /// Time elapsed since the previous frame tick, in seconds.
    pub delta: f64,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

impl FrameTime {
    pub fn scene_time(&self) -> SceneTime {
        SceneTime {
            elapsed_nanos: self.elapsed_nanos,
            delta: self.delta,
        }
    }
}

/// Frame clock producing `FrameTime` snapshots.
///
/// Delta time is clamped so a stall (debugger, minimized surface) does not
/// hand scenes a pathological step. Elapsed time is not clamped.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts elapsed time. Called whenever rendering starts.
    pub fn restart(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last = now;
    }

    /// Resets the delta baseline only, e.g. after a pause.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let ft = FrameTime {
            elapsed_nanos: u64::try_from(now.saturating_duration_since(self.start).as_nanos())
                .unwrap_or(u64::MAX),
            delta: dt.as_secs_f64(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
