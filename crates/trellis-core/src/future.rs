//! Versioned, shareable units of resolve and layout work.
//!
//! A [`VersionedFuture`] wraps one computation. Whichever thread calls
//! [`VersionedFuture::run_and_get`] first runs it; every other caller blocks
//! until it finishes and receives a clone of the same result. A background
//! task that has not started yet can thereby be taken over by a caller that
//! needs the result now.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use log::trace;

use crate::error::{ComponentError, TreeError};

/// Flag checked by queued work before it starts.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn same_token(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Why a resolve or layout was requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RenderSource {
    SetRootSync,
    SetRootAsync,
    SetSizeSpecSync,
    SetSizeSpecAsync,
    UpdateStateSync,
    UpdateStateAsync,
    Measure,
}

impl RenderSource {
    pub fn is_async(self) -> bool {
        matches!(
            self,
            RenderSource::SetRootAsync | RenderSource::SetSizeSpecAsync | RenderSource::UpdateStateAsync
        )
    }
}

/// Whether a request started a computation or joined a running one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FutureExecutionType {
    NewFuture,
    ReuseFuture,
}

type Work<T> = Box<dyn FnOnce() -> Result<T, TreeError> + Send>;

enum Progress<T> {
    Pending,
    Running(ThreadId),
    Done(Result<T, TreeError>),
}

pub struct VersionedFuture<T> {
    version: u64,
    source: RenderSource,
    progress: Mutex<Progress<T>>,
    finished: Condvar,
    work: Mutex<Option<Work<T>>>,
    refs: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone> VersionedFuture<T> {
    pub fn new(
        version: u64,
        source: RenderSource,
        work: impl FnOnce() -> Result<T, TreeError> + Send + 'static,
    ) -> Self {
        Self {
            version,
            source,
            progress: Mutex::new(Progress::Pending),
            finished: Condvar::new(),
            work: Mutex::new(Some(Box::new(work))),
            refs: AtomicUsize::new(0),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn source(&self) -> RenderSource {
        self.source
    }

    /// Registers interest in the result. Returns the new holder count.
    pub fn acquire(&self) -> usize {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops interest in the result. Returns the remaining holder count.
    pub fn release(&self) -> usize {
        let previous = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| Some(refs.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    pub fn holders(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        !matches!(*lock(&self.progress), Progress::Pending)
    }

    pub fn is_done(&self) -> bool {
        matches!(*lock(&self.progress), Progress::Done(_))
    }

    /// The result, if the computation has finished.
    pub fn try_get(&self) -> Option<Result<T, TreeError>> {
        match &*lock(&self.progress) {
            Progress::Done(result) => Some(result.clone()),
            _ => None,
        }
    }

    /// Runs the computation on this thread if nobody has started it yet,
    /// otherwise waits for the thread that did.
    ///
    /// If the computation panics, waiters receive an error and the panic is
    /// resumed on the running thread.
    pub fn run_and_get(&self) -> Result<T, TreeError> {
        let current = thread::current().id();
        let mut progress = lock(&self.progress);
        loop {
            match &*progress {
                Progress::Done(result) => return result.clone(),
                Progress::Running(owner) if *owner == current => {
                    return Err(ComponentError::new(format!(
                        "future v{} awaited from inside its own computation",
                        self.version
                    ))
                    .into());
                }
                Progress::Running(owner) => {
                    trace!("future v{} ({:?}): waiting on {:?}", self.version, self.source, owner);
                    progress = self
                        .finished
                        .wait(progress)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Progress::Pending => {
                    *progress = Progress::Running(current);
                    break;
                }
            }
        }
        drop(progress);

        trace!("future v{} ({:?}): running on {:?}", self.version, self.source, current);
        let work = lock(&self.work).take();
        let outcome = match work {
            Some(work) => panic::catch_unwind(AssertUnwindSafe(work)),
            None => Ok(Err(ComponentError::new("future work already taken").into())),
        };
        let (result, panic_payload) = match outcome {
            Ok(result) => (result, None),
            Err(payload) => (
                Err(ComponentError::new(format!("future v{} panicked", self.version)).into()),
                Some(payload),
            ),
        };

        *lock(&self.progress) = Progress::Done(result.clone());
        self.finished.notify_all();

        if let Some(payload) = panic_payload {
            panic::resume_unwind(payload);
        }
        result
    }
}

#[cfg(test)]
#[path = "tests/future_tests.rs"]
mod tests;
