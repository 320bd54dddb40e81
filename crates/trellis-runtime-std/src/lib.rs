//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `trellis-core`. Hosts construct a
//! [`ThreadPoolExecutor`] and hand it to a tree's configuration to run
//! asynchronous resolve and layout requests on worker threads.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{trace, warn};
use trellis_core::{BackgroundExecutor, Task};

#[derive(Default)]
struct Idle {
    pending: Mutex<usize>,
    changed: Condvar,
}

impl Idle {
    fn started(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finished(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.changed.notify_all();
        }
    }

    fn pending(&self) -> usize {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            pending = self.changed.wait(pending).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Fixed-size pool of worker threads fed from one queue.
///
/// Dropping the pool closes the queue and joins the workers after they
/// drain it.
pub struct ThreadPoolExecutor {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Vec<JoinHandle<()>>,
    idle: Arc<Idle>,
}

impl ThreadPoolExecutor {
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));
        let idle = Arc::new(Idle::default());

        let workers = (0..threads)
            .filter_map(|index| {
                let receiver = receiver.clone();
                let idle = idle.clone();
                thread::Builder::new()
                    .name(format!("trellis-worker-{index}"))
                    .spawn(move || work(&receiver, &idle))
                    .map_err(|err| warn!("failed to spawn worker {index}: {err}"))
                    .ok()
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers,
            idle,
        }
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Tasks accepted but not yet finished.
    pub fn pending(&self) -> usize {
        self.idle.pending()
    }

    /// Blocks until every accepted task has finished.
    pub fn wait_until_idle(&self) {
        self.idle.wait();
    }
}

fn work(receiver: &Mutex<Receiver<Task>>, idle: &Idle) {
    loop {
        let next = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(task) = next else {
            return;
        };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
            warn!("background task panicked");
        }
        idle.finished();
    }
}

impl Default for ThreadPoolExecutor {
    fn default() -> Self {
        let threads = thread::available_parallelism().map_or(2, |count| count.get());
        Self::new(threads)
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("threads", &self.workers.len())
            .field("pending", &self.pending())
            .finish()
    }
}

impl BackgroundExecutor for ThreadPoolExecutor {
    fn execute(&self, task: Task) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            trace!("executor shut down, dropping task");
            return;
        };
        self.idle.started();
        if let Err(mpsc::SendError(task)) = sender.send(task) {
            warn!("no worker left, running task on the caller thread");
            task();
            self.idle.finished();
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            // the last handle may be dropped by a task running on a worker
            if worker.thread().id() != current {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/thread_pool_tests.rs"]
mod tests;
