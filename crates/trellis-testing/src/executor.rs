use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use log::trace;
use trellis_core::{BackgroundExecutor, Task};

/// Executor that holds tasks until the test runs them.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Task>>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs the oldest queued task. Returns false if there was none.
    pub fn run_next(&self) -> bool {
        let task = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks, including ones queued while running, until the queue is
    /// empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        trace!("ran {ran} queued tasks");
        ran
    }

    /// Drops every queued task without running it.
    pub fn discard_pending(&self) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

impl BackgroundExecutor for ManualExecutor {
    fn execute(&self, task: Task) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push_back(task);
    }
}

impl fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/executor_tests.rs"]
mod tests;
