//! When deferred flushes run.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

/// A unit of deferred work.
pub type FlushTask = Box<dyn FnOnce() + Send + 'static>;

/// Decides when a scheduled flush runs.
pub trait FlushScheduler: Send + Sync {
    fn schedule(&self, task: FlushTask);
}

/// Runs every task as soon as it is scheduled.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateScheduler;

impl FlushScheduler for ImmediateScheduler {
    fn schedule(&self, task: FlushTask) {
        task();
    }
}

/// Queues tasks until the owner calls [`tick`](Self::tick).
///
/// This plays the part of a frame or idle callback.
#[derive(Default)]
pub struct TickScheduler {
    pending: Mutex<VecDeque<FlushTask>>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the tasks queued before this call and return how many ran.
    ///
    /// Tasks scheduled while ticking wait for the next tick.
    pub fn tick(&self) -> usize {
        let tasks = std::mem::take(&mut *self.pending.lock());
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

impl FlushScheduler for TickScheduler {
    fn schedule(&self, task: FlushTask) {
        self.pending.lock().push_back(task);
    }
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
