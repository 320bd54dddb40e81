//! Testing utilities for Trellis trees.
//!
//! [`ManualExecutor`] queues background work until a test decides to run
//! it, which makes interleavings of async requests deterministic. The
//! components in [`components`] count their calls and fail on request.

pub mod components;
pub mod executor;

pub use components::{CallCounter, CountingComposite, CountingLeaf, Recorded, RecordingBoundary, ThrowingLeaf, Wrapper};
pub use executor::ManualExecutor;
