//! Scheduler: the reactivity tick.
//!
//! Work that must not run in the middle of a synchronous call chain
//! (watcher flushes) is deferred onto a FIFO queue. The queue is drained
//! when the outermost [`Scheduler::batch`] returns, so one logical tick is
//! "everything triggered by one top-level call". Tasks deferred while
//! draining join the same drain loop.
//!
//! Work that must wait for the caller to finish its own synchronous code
//! (immediate emitter emissions) goes on the next-tick queue instead. It runs
//! when the next tick starts: at the entry of the next outermost batch, on a
//! `defer` outside any batch, or on an explicit [`Scheduler::flush`].
//!
//! ```ignore
//! let scheduler = Scheduler::new();
//! scheduler.batch(|| {
//!     scheduler.next_tick(|| println!("third"));
//!     scheduler.defer(|| println!("second"));
//!     println!("first");
//! });
//! scheduler.flush();
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SchedulerState {
    depth: usize,
    flushing: bool,
    queue: VecDeque<Task>,
    next_tick: VecDeque<Task>,
}

impl SchedulerState {
    fn is_idle(&self) -> bool {
        self.depth == 0 && !self.flushing
    }
}

/// Cloneable handle to a shared task queue.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<Mutex<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` inside a batch. Deferred tasks run once the outermost batch ends.
    ///
    /// An outermost batch first runs whatever was held for the next tick.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let starts_tick = {
            let state = self.lock();
            state.is_idle() && !state.next_tick.is_empty()
        };
        if starts_tick {
            self.drain(true);
        }

        let guard = BatchGuard::enter(self);
        let result = f();
        drop(guard);
        if self.lock().is_idle() {
            self.drain(false);
        }
        result
    }

    /// Queue a task for the end of the current tick.
    ///
    /// Outside of any batch and outside of a flush, the task runs before
    /// `defer` returns, after anything held for the next tick.
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut state = self.lock();
            state.queue.push_back(Box::new(task));
            state.is_idle()
        };
        if run_now {
            self.drain(true);
        }
    }

    /// Hold a task until the next tick starts.
    pub fn next_tick(&self, task: impl FnOnce() + Send + 'static) {
        self.lock().next_tick.push_back(Box::new(task));
    }

    /// Start a tick now: run held next-tick tasks, then anything queued.
    /// A nested call while already draining is a no-op.
    pub fn flush(&self) {
        self.drain(true);
    }

    fn drain(&self, start_tick: bool) {
        {
            let mut state = self.lock();
            if state.flushing {
                return;
            }
            state.flushing = true;
            if start_tick && !state.next_tick.is_empty() {
                let mut held = std::mem::take(&mut state.next_tick);
                held.append(&mut state.queue);
                state.queue = held;
            }
        }
        let mut reset = FlushGuard {
            scheduler: self,
            armed: true,
        };

        let mut ran = 0usize;
        loop {
            let next = {
                let mut state = self.lock();
                let next = state.queue.pop_front();
                if next.is_none() {
                    // Seen empty and released in one critical section, so a
                    // concurrent batch either lands in this queue or flushes itself.
                    state.flushing = false;
                }
                next
            };
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        reset.armed = false;
        if ran > 0 {
            trace!(tasks = ran, "scheduler tick flushed");
        }
    }

    /// Number of tasks waiting for the end of the current tick.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of tasks held for the next tick.
    pub fn held(&self) -> usize {
        self.lock().next_tick.len()
    }

    /// Whether a batch is currently open.
    pub fn in_batch(&self) -> bool {
        self.lock().depth > 0
    }

    /// Whether both handles share one queue.
    pub fn ptr_eq(&self, other: &Scheduler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        // A panicking task must not wedge the whole tick.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct BatchGuard<'a>(&'a Scheduler);

impl<'a> BatchGuard<'a> {
    fn enter(scheduler: &'a Scheduler) -> Self {
        scheduler.lock().depth += 1;
        Self(scheduler)
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.depth = state.depth.saturating_sub(1);
    }
}

/// Clears `flushing` if a task unwinds out of the drain loop.
struct FlushGuard<'a> {
    scheduler: &'a Scheduler,
    armed: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.lock().flushing = false;
        }
    }
}
