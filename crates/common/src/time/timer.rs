//! One-shot timers with cancellation support
//!
//! State machines that need "do X after D" (the breaker's open → half-open
//! flip) schedule through [`Scheduler`] instead of calling `tokio::spawn`
//! directly, so tests can swap in [`ManualScheduler`] and fire timers by
//! advancing a [`MockClock`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::debug;

use crate::resilience::{Clock, MockClock};

/// Work run when a timer fires
pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// A timer handle that can be used to cancel a timer
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Create a new, armed timer handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the timer
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if the timer has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Something that can run a task once after a delay
pub trait Scheduler: Send + Sync + 'static {
    /// Arrange for `task` to run after `delay` unless the returned handle is
    /// cancelled first
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TimerHandle;
}

/// Scheduler backed by the ambient Tokio runtime
///
/// Outside a runtime nothing is armed; callers that also check elapsed time
/// (the circuit breaker does) still make progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TimerHandle {
        let handle = TimerHandle::new();

        match Handle::try_current() {
            Ok(runtime) => {
                let timer = handle.clone();
                runtime.spawn(async move {
                    sleep(delay).await;
                    if !timer.is_cancelled() {
                        task();
                    }
                });
            }
            Err(_) => {
                debug!(?delay, "No Tokio runtime available; timer not armed");
            }
        }

        handle
    }
}

/// Scheduler that never fires
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn schedule(&self, _delay: Duration, _task: ScheduledTask) -> TimerHandle {
        TimerHandle::new()
    }
}

struct ManualTimer {
    due: Instant,
    handle: TimerHandle,
    task: ScheduledTask,
}

/// Test scheduler driven by a [`MockClock`]
///
/// Timers fire only from [`ManualScheduler::advance`] or
/// [`ManualScheduler::run_due`], in due order.
pub struct ManualScheduler {
    clock: MockClock,
    timers: Mutex<Vec<ManualTimer>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("elapsed", &self.clock.elapsed())
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new(clock: MockClock) -> Self {
        Self { clock, timers: Mutex::new(Vec::new()) }
    }

    pub fn clock(&self) -> &MockClock {
        &self.clock
    }

    /// Move the clock forward and fire everything now due
    ///
    /// Returns the number of timers that fired.
    pub fn advance(&self, duration: Duration) -> usize {
        self.clock.advance(duration);
        self.run_due()
    }

    /// Fire every timer due at the current mock time
    pub fn run_due(&self) -> usize {
        let now = self.clock.now();

        let mut due: Vec<ManualTimer> = {
            let mut timers = self.timers.lock();
            let (ready, waiting): (Vec<_>, Vec<_>) =
                timers.drain(..).partition(|timer| timer.due <= now);
            *timers = waiting;
            ready
        };
        due.sort_by_key(|timer| timer.due);

        // Tasks run without the list lock held; they may schedule again
        let mut fired = 0;
        for timer in due {
            if !timer.handle.is_cancelled() {
                (timer.task)();
                fired += 1;
            }
        }
        fired
    }

    /// Number of armed, uncancelled timers
    pub fn pending(&self) -> usize {
        self.timers.lock().iter().filter(|timer| !timer.handle.is_cancelled()).count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: ScheduledTask) -> TimerHandle {
        let handle = TimerHandle::new();
        self.timers.lock().push(ManualTimer {
            due: self.clock.now() + delay,
            handle: handle.clone(),
            task,
        });
        handle
    }
}
