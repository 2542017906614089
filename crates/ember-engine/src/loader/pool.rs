use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;

use crate::task::panic_message;

/// A model parser. `parse` runs on a loader thread.
pub trait ModelLoader: Send {
    fn parse(&mut self) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        "model"
    }
}

/// Completion callbacks, invoked from [`LoaderPool::dispatch_completed`].
pub trait LoadCallback {
    fn on_model_load_complete(&mut self, loader: Box<dyn ModelLoader>, tag: u32);

    fn on_model_load_failed(&mut self, loader: Box<dyn ModelLoader>, tag: u32, error: &anyhow::Error);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadId(u64);

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load-{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Worker threads. Defaults to one less than the available cores, at least one.
    pub workers: Option<usize>,
}

impl LoaderConfig {
    fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
        })
        .max(1)
    }
}

struct Job {
    id: LoadId,
    loader: Box<dyn ModelLoader>,
}

struct Completion {
    id: LoadId,
    loader: Box<dyn ModelLoader>,
    result: anyhow::Result<()>,
}

struct PendingLoad {
    tag: u32,
    callback: Box<dyn LoadCallback>,
}

/// Fixed-size pool of loader threads.
pub struct LoaderPool {
    jobs: Option<Sender<Job>>,
    completed: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
    pending: HashMap<LoadId, PendingLoad>,
    next_id: u64,
}

impl LoaderPool {
    pub fn new(config: LoaderConfig) -> anyhow::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let count = config.worker_count();
        let mut workers = Vec::with_capacity(count);
        for i in 0..count {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let worker = thread::Builder::new()
                .name(format!("ember-loader-{i}"))
                .spawn(move || run_worker(&jobs, &done))
                .with_context(|| format!("failed to spawn loader thread {i}"))?;
            workers.push(worker);
        }
        log::debug!("loader pool started with {count} workers");

        Ok(Self {
            jobs: Some(job_tx),
            completed: done_rx,
            workers,
            pending: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Loads that have not been dispatched yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queues `loader` for parsing. `callback` fires from a later
    /// [`dispatch_completed`](Self::dispatch_completed), or right away if the
    /// pool can no longer accept work.
    pub fn load_model(
        &mut self,
        loader: Box<dyn ModelLoader>,
        mut callback: Box<dyn LoadCallback>,
        tag: u32,
    ) -> LoadId {
        let id = LoadId(self.next_id);
        self.next_id += 1;

        let Some(jobs) = &self.jobs else {
            let err = anyhow!("loader pool is shut down");
            callback.on_model_load_failed(loader, tag, &err);
            return id;
        };
        match jobs.send(Job { id, loader }) {
            Ok(()) => {
                self.pending.insert(id, PendingLoad { tag, callback });
            }
            Err(mpsc::SendError(job)) => {
                let err = anyhow!("no loader thread is running");
                log::error!("{id}: {err}");
                callback.on_model_load_failed(job.loader, tag, &err);
            }
        }
        id
    }

    /// Runs the callbacks of every finished load. Never blocks.
    pub fn dispatch_completed(&mut self) -> usize {
        let mut dispatched = 0;
        loop {
            let done = match self.completed.try_recv() {
                Ok(done) => done,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            let Some(PendingLoad { tag, mut callback }) = self.pending.remove(&done.id) else {
                log::warn!("{}: completion for unknown load", done.id);
                continue;
            };
            match done.result {
                Ok(()) => {
                    log::debug!("{}: `{}` loaded", done.id, done.loader.name());
                    callback.on_model_load_complete(done.loader, tag);
                }
                Err(err) => {
                    log::error!("{}: `{}` failed: {err:#}", done.id, done.loader.name());
                    callback.on_model_load_failed(done.loader, tag, &err);
                }
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Stops accepting work, waits for queued parses to finish and joins the workers.
    /// Completions stay available to [`dispatch_completed`](Self::dispatch_completed).
    pub fn shutdown(&mut self) {
        if self.jobs.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("loader thread panicked");
            }
        }
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for LoaderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderPool")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn run_worker(jobs: &Mutex<Receiver<Job>>, done: &Sender<Completion>) {
    loop {
        let job = jobs.lock().recv();
        let Ok(Job { id, mut loader }) = job else {
            return;
        };

        let result = match panic::catch_unwind(AssertUnwindSafe(|| loader.parse())) {
            Ok(result) => result,
            Err(panic) => Err(anyhow!("parser panicked: {}", panic_message(panic.as_ref()))),
        };
        if done.send(Completion { id, loader, result }).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct Fixture {
        name: &'static str,
        outcome: Outcome,
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Ok,
        Fail,
        Panic,
    }

    impl Fixture {
        fn boxed(name: &'static str, outcome: Outcome) -> Box<dyn ModelLoader> {
            Box::new(Self { name, outcome })
        }
    }

    impl ModelLoader for Fixture {
        fn parse(&mut self) -> anyhow::Result<()> {
            match self.outcome {
                Outcome::Ok => Ok(()),
                Outcome::Fail => anyhow::bail!("bad header in {}", self.name),
                Outcome::Panic => panic!("parser bug"),
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    type Events = Arc<Mutex<Vec<String>>>;

    struct Recorder(Events);

    impl LoadCallback for Recorder {
        fn on_model_load_complete(&mut self, loader: Box<dyn ModelLoader>, tag: u32) {
            self.0.lock().push(format!("complete {} #{tag}", loader.name()));
        }

        fn on_model_load_failed(&mut self, loader: Box<dyn ModelLoader>, tag: u32, error: &anyhow::Error) {
            self.0.lock().push(format!("failed {} #{tag}: {error}", loader.name()));
        }
    }

    fn recorder(events: &Events) -> Box<dyn LoadCallback> {
        Box::new(Recorder(events.clone()))
    }

    fn dispatch_all(pool: &mut LoaderPool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.pending() > 0 && Instant::now() < deadline {
            if pool.dispatch_completed() == 0 {
                thread::sleep(Duration::from_millis(2));
            }
        }
        assert_eq!(pool.pending(), 0, "loads did not finish in time");
    }

    #[test]
    fn worker_count_is_at_least_one() {
        assert_eq!(LoaderConfig { workers: Some(0) }.worker_count(), 1);
        assert_eq!(LoaderConfig { workers: Some(3) }.worker_count(), 3);
        assert!(LoaderConfig::default().worker_count() >= 1);
    }

    #[test]
    fn default_leaves_one_core_free() {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(LoaderConfig::default().worker_count(), cores.saturating_sub(1).max(1));
    }

    #[test]
    fn callbacks_run_only_on_dispatch() {
        let events = Events::default();
        let mut pool = LoaderPool::new(LoaderConfig { workers: Some(2) }).unwrap();
        pool.load_model(Fixture::boxed("teapot", Outcome::Ok), recorder(&events), 7);
        pool.load_model(Fixture::boxed("broken", Outcome::Fail), recorder(&events), 8);

        thread::sleep(Duration::from_millis(20));
        assert!(events.lock().is_empty());

        dispatch_all(&mut pool);
        let mut got = events.lock().clone();
        got.sort();
        assert_eq!(
            got,
            ["complete teapot #7", "failed broken #8: bad header in broken"]
        );
    }

    #[test]
    fn panicking_parser_reports_failure_and_pool_keeps_working() {
        let events = Events::default();
        let mut pool = LoaderPool::new(LoaderConfig { workers: Some(1) }).unwrap();
        pool.load_model(Fixture::boxed("crash", Outcome::Panic), recorder(&events), 1);
        pool.load_model(Fixture::boxed("after", Outcome::Ok), recorder(&events), 2);

        dispatch_all(&mut pool);
        assert_eq!(
            *events.lock(),
            ["failed crash #1: parser panicked: parser bug", "complete after #2"]
        );
    }

    #[test]
    fn load_after_shutdown_fails_immediately() {
        let events = Events::default();
        let mut pool = LoaderPool::new(LoaderConfig { workers: Some(1) }).unwrap();
        pool.shutdown();
        assert_eq!(pool.workers(), 0);

        pool.load_model(Fixture::boxed("late", Outcome::Ok), recorder(&events), 3);
        assert_eq!(pool.pending(), 0);
        assert_eq!(*events.lock(), ["failed late #3: loader pool is shut down"]);
    }
}
