use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Platform hook asking for one redraw.
pub type RenderRequest = Arc<dyn Fn() + Send + Sync>;

struct Worker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

struct SchedulerState {
    frame_rate: f64,
    hook: Option<RenderRequest>,
    worker: Option<Worker>,
}

/// Fixed-rate redraw timer.
///
/// A timer thread calls the render-request hook once per interval. A tick that
/// comes due late is fired once and the schedule restarts from there; missed
/// ticks are never replayed. Clones share the same timer.
#[derive(Clone)]
pub struct FrameScheduler {
    inner: Arc<Mutex<SchedulerState>>,
}

impl FrameScheduler {
    pub fn new(frame_rate: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerState {
                frame_rate: sanitize(frame_rate).unwrap_or(60.0),
                hook: None,
                worker: None,
            })),
        }
    }

    pub fn set_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().hook = Some(Arc::new(hook));
    }

    pub fn frame_rate(&self) -> f64 {
        self.inner.lock().frame_rate
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().worker.is_some()
    }

    /// Starts the timer. Returns `false` if it is already running or no hook is set.
    pub fn start(&self) -> bool {
        let mut state = self.inner.lock();
        if state.worker.is_some() {
            return false;
        }
        let Some(hook) = state.hook.clone() else {
            log::debug!("frame scheduler has no render hook, not starting");
            return false;
        };

        let interval = Duration::from_secs_f64(1.0 / state.frame_rate);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let spawned = thread::Builder::new()
            .name("ember-frame-timer".into())
            .spawn(move || run_timer(interval, &flag, hook.as_ref()));

        match spawned {
            Ok(thread) => {
                state.worker = Some(Worker { stop, thread });
                log::debug!("frame scheduler started at {:.1} fps", state.frame_rate);
                true
            }
            Err(err) => {
                log::error!("failed to spawn frame timer: {err}");
                false
            }
        }
    }

    /// Stops the timer and waits for the thread to exit.
    pub fn stop(&self) {
        let Some(worker) = self.inner.lock().worker.take() else {
            return;
        };
        worker.stop.store(true, Ordering::Release);
        worker.thread.thread().unpark();
        if worker.thread.thread().id() == thread::current().id() {
            return;
        }
        if worker.thread.join().is_err() {
            log::error!("frame timer thread panicked");
        }
    }

    /// Changes the target rate, restarting the timer if it is running.
    ///
    /// Non-positive or non-finite rates are rejected.
    pub fn set_frame_rate(&self, frame_rate: f64) -> bool {
        let Some(frame_rate) = sanitize(frame_rate) else {
            log::warn!("ignoring invalid frame rate {frame_rate}");
            return false;
        };
        let running = self.is_running();
        if running {
            self.stop();
        }
        self.inner.lock().frame_rate = frame_rate;
        if running {
            self.start();
        }
        true
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("FrameScheduler")
            .field("frame_rate", &state.frame_rate)
            .field("running", &state.worker.is_some())
            .finish()
    }
}

fn sanitize(frame_rate: f64) -> Option<f64> {
    (frame_rate.is_finite() && frame_rate > 0.0).then_some(frame_rate)
}

fn run_timer(interval: Duration, stop: &AtomicBool, hook: &(dyn Fn() + Send + Sync)) {
    let mut next = Instant::now() + interval;
    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next {
            thread::park_timeout(next - now);
            continue;
        }

        hook();

        next += interval;
        let now = Instant::now();
        if next <= now {
            next = now + interval;
        }
    }
}
