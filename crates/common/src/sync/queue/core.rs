//! Bounded-concurrency FIFO task queue
//!
//! At most `max_concurrent` tasks run at once; the rest wait in arrival
//! order. Each task runs on its own Tokio task and its output is handed back
//! to the caller of [`RequestQueue::add`].

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use super::errors::{QueueError, QueueResult};
use super::metrics::{QueueMetrics, QueueMetricsSnapshot};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueueState {
    pending: VecDeque<Job>,
    active: usize,
}

struct QueueInner {
    max_concurrent: usize,
    state: Mutex<QueueState>,
    metrics: QueueMetrics,
}

/// FIFO queue that bounds how many tasks run concurrently
///
/// Cloning is cheap; clones share the same slots.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RequestQueue")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("active", &state.active)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl RequestQueue {
    /// Queue running at most `max_concurrent` tasks at once
    ///
    /// # Errors
    /// `QueueError::InvalidConfig` if `max_concurrent` is zero.
    pub fn new(max_concurrent: usize) -> QueueResult<Self> {
        if max_concurrent == 0 {
            return Err(QueueError::InvalidConfig(
                "max_concurrent must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(QueueInner {
                max_concurrent,
                state: Mutex::new(QueueState { pending: VecDeque::new(), active: 0 }),
                metrics: QueueMetrics::new(),
            }),
        })
    }

    /// Configured concurrency cap
    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Tasks currently running
    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Tasks waiting for a slot
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        let (active, pending) = {
            let state = self.inner.state.lock();
            (state.active, state.pending.len())
        };
        self.inner.metrics.snapshot(active, pending)
    }

    /// Enqueue a task and wait for its output
    ///
    /// Dropping the returned future does not cancel a task that has already
    /// been queued; it still runs and its output is discarded.
    ///
    /// # Errors
    /// `QueueError::TaskDropped` if the task panicked or was dropped before
    /// completing (for example during runtime shutdown).
    pub async fn add<F, T>(&self, task: F) -> QueueResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let output = task.await;
            // Receiver gone means the caller stopped waiting
            let _ = tx.send(output);
        });

        self.inner.state.lock().pending.push_back(job);
        self.inner.metrics.record_enqueue();
        process(&self.inner);

        rx.await.map_err(|_| QueueError::TaskDropped)
    }
}

/// Start queued tasks while slots are free
///
/// Slot accounting and dequeueing happen in one critical section, so
/// concurrent callers can never overshoot `max_concurrent`.
fn process(inner: &Arc<QueueInner>) {
    let Ok(runtime) = Handle::try_current() else {
        debug!("No Tokio runtime available; queued tasks left pending");
        return;
    };

    let started: Vec<(Job, usize)> = {
        let mut state = inner.state.lock();
        let mut started = Vec::new();
        while state.active < inner.max_concurrent {
            let Some(job) = state.pending.pop_front() else { break };
            state.active += 1;
            started.push((job, state.active));
        }
        started
    };

    for (job, active) in started {
        inner.metrics.record_start(active);
        trace!(active, "Starting queued task");

        let slot = SlotGuard { inner: Arc::clone(inner) };
        runtime.spawn(async move {
            let _slot = slot;
            job.await;
        });
    }
}

/// Releases a slot when the task finishes, panics, or is dropped
struct SlotGuard {
    inner: Arc<QueueInner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.inner.metrics.record_completion();
        process(&self.inner);
    }
}
