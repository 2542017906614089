use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::FrameTask;

#[derive(Debug, Default)]
struct QueueState {
    tasks: VecDeque<FrameTask>,
    closed: bool,
}

/// Multi-producer, single-consumer FIFO of frame tasks.
///
/// Cloning shares the queue. The lock is only held for one push or one pop,
/// never while a task runs.
#[derive(Debug, Clone, Default)]
pub struct FrameTaskQueue {
    inner: Arc<Mutex<QueueState>>,
}

impl FrameTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `task` at the tail. Returns `false` once the queue is closed.
    pub fn enqueue(&self, task: FrameTask) -> bool {
        let mut state = self.inner.lock();
        if state.closed {
            log::debug!("frame task rejected, queue closed: {:?}", task.kind());
            return false;
        }
        state.tasks.push_back(task);
        true
    }

    pub fn pop(&self) -> Option<FrameTask> {
        self.inner.lock().tasks.pop_front()
    }

    /// Pops and runs tasks until the queue is empty. Returns how many ran.
    ///
    /// Tasks enqueued by `run` itself are picked up in the same drain.
    pub fn drain(&self, mut run: impl FnMut(FrameTask)) -> usize {
        let mut count = 0;
        while let Some(task) = self.pop() {
            run(task);
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    /// Rejects further tasks and discards the backlog.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        let dropped = state.tasks.len();
        state.tasks.clear();
        if dropped > 0 {
            log::debug!("frame task queue closed, {dropped} pending tasks dropped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ManagerKind, TaskKind, TaskPayload};

    fn reload(kind: ManagerKind) -> FrameTask {
        FrameTask::new(TaskKind::Reload, TaskPayload::Manager(kind))
    }

    #[test]
    fn drains_in_fifo_order() {
        let q = FrameTaskQueue::new();
        assert!(q.enqueue(reload(ManagerKind::Textures)));
        assert!(q.enqueue(reload(ManagerKind::Materials)));
        assert!(q.enqueue(FrameTask::new(TaskKind::Reset, TaskPayload::Manager(ManagerKind::Textures))));

        let mut seen = Vec::new();
        let n = q.drain(|t| {
            let (kind, payload, _) = t.into_parts();
            let TaskPayload::Manager(m) = payload else { unreachable!() };
            seen.push((kind, m));
        });

        assert_eq!(n, 3);
        assert_eq!(
            seen,
            vec![
                (TaskKind::Reload, ManagerKind::Textures),
                (TaskKind::Reload, ManagerKind::Materials),
                (TaskKind::Reset, ManagerKind::Textures),
            ]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn tasks_enqueued_while_draining_run_in_the_same_drain() {
        let q = FrameTaskQueue::new();
        q.enqueue(reload(ManagerKind::Textures));
        let producer = q.clone();
        let mut first = true;
        let n = q.drain(|_| {
            if first {
                first = false;
                assert!(producer.enqueue(reload(ManagerKind::Materials)));
            }
        });
        assert_eq!(n, 2);
    }

    #[test]
    fn rejects_after_close() {
        let q = FrameTaskQueue::new();
        q.enqueue(reload(ManagerKind::Textures));
        q.close();
        assert!(q.is_closed());
        assert!(q.is_empty());
        assert!(!q.enqueue(reload(ManagerKind::Textures)));
    }

    #[test]
    fn enqueue_from_other_threads() {
        let q = FrameTaskQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        q.enqueue(reload(ManagerKind::Textures));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(q.drain(|_| {}), 100);
    }
}
