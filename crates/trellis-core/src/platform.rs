//! Platform abstraction for running background work.
//!
//! The tree never spawns threads itself. Asynchronous resolve and layout
//! requests are handed to a [`BackgroundExecutor`], which the host
//! supplies (a thread pool, a test queue, or the caller thread).

/// Unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes tasks off the caller's thread.
///
/// Implementations must be safe to use from multiple threads and must run
/// every task they accept at most once.
pub trait BackgroundExecutor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Executor that runs each task immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl BackgroundExecutor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}
