use std::fmt;
use std::sync::Arc;

use trellis_core::{BackgroundExecutor, InlineExecutor};

/// Consecutive passes that may enqueue state updates from render before the
/// tree gives up.
pub const DEFAULT_STATE_UPDATE_LOOP_THRESHOLD: usize = 50;

/// Behavior switches of a [`ComponentTree`](crate::ComponentTree).
#[derive(Clone)]
pub struct TreeConfig {
    /// Runs asynchronous requests. Defaults to [`InlineExecutor`].
    pub executor: Arc<dyn BackgroundExecutor>,
    pub state_update_loop_threshold: usize,
    /// Reuse unchanged subtrees, or whole trees, across resolves.
    pub reconciliation_enabled: bool,
    /// Attach equivalent requests to a running computation.
    pub reuse_futures: bool,
    /// Reuse measurements recorded by the previous layout.
    pub use_diffing: bool,
}

impl TreeConfig {
    pub fn with_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_state_update_loop_threshold(mut self, threshold: usize) -> Self {
        self.state_update_loop_threshold = threshold;
        self
    }

    pub fn with_reconciliation(mut self, enabled: bool) -> Self {
        self.reconciliation_enabled = enabled;
        self
    }

    pub fn with_future_reuse(mut self, enabled: bool) -> Self {
        self.reuse_futures = enabled;
        self
    }

    pub fn with_diffing(mut self, enabled: bool) -> Self {
        self.use_diffing = enabled;
        self
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            executor: Arc::new(InlineExecutor),
            state_update_loop_threshold: DEFAULT_STATE_UPDATE_LOOP_THRESHOLD,
            reconciliation_enabled: true,
            reuse_futures: true,
            use_diffing: true,
        }
    }
}

impl fmt::Debug for TreeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeConfig")
            .field("state_update_loop_threshold", &self.state_update_loop_threshold)
            .field("reconciliation_enabled", &self.reconciliation_enabled)
            .field("reuse_futures", &self.reuse_futures)
            .field("use_diffing", &self.use_diffing)
            .finish_non_exhaustive()
    }
}
