//! Callbacks a [`ComponentTree`](crate::ComponentTree) reports to.
//!
//! Every listener trait is implemented for plain closures.

use std::sync::Arc;

use trellis_core::{FutureExecutionType, RenderSource, TreeError};

use crate::layout_state::LayoutState;

/// Called after every layout commit.
pub trait NewLayoutStateReadyListener: Send + Sync {
    fn on_new_layout_state_ready(&self, layout: &Arc<LayoutState>, source: RenderSource);
}

impl<F> NewLayoutStateReadyListener for F
where
    F: Fn(&Arc<LayoutState>, RenderSource) + Send + Sync,
{
    fn on_new_layout_state_ready(&self, layout: &Arc<LayoutState>, source: RenderSource) {
        self(layout, source)
    }
}

/// Receives failures of asynchronous requests, which have no caller to
/// return them to.
pub trait TreeErrorListener: Send + Sync {
    fn on_error(&self, error: &TreeError, source: RenderSource);
}

impl<F> TreeErrorListener for F
where
    F: Fn(&TreeError, RenderSource) + Send + Sync,
{
    fn on_error(&self, error: &TreeError, source: RenderSource) {
        self(error, source)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FuturePhase {
    Resolve,
    Layout,
}

/// One request for a resolve or layout future.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FutureExecution {
    pub phase: FuturePhase,
    pub execution: FutureExecutionType,
    pub source: RenderSource,
    pub version: u64,
}

pub trait FutureExecutionListener: Send + Sync {
    fn on_future_execution(&self, execution: &FutureExecution);
}

impl<F> FutureExecutionListener for F
where
    F: Fn(&FutureExecution) + Send + Sync,
{
    fn on_future_execution(&self, execution: &FutureExecution) {
        self(execution)
    }
}

#[derive(Default)]
pub(crate) struct Listeners {
    pub layout: Vec<Arc<dyn NewLayoutStateReadyListener>>,
    pub errors: Vec<Arc<dyn TreeErrorListener>>,
    pub futures: Vec<Arc<dyn FutureExecutionListener>>,
}
