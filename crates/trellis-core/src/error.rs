use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Lifecycle callback a [`ComponentError`] was raised from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    InitialState,
    TreeProps,
    Render,
    Measure,
    StateUpdate,
}

impl LifecyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::InitialState => "initial state",
            LifecyclePhase::TreeProps => "tree props",
            LifecyclePhase::Render => "render",
            LifecyclePhase::Measure => "measure",
            LifecyclePhase::StateUpdate => "state update",
        }
    }
}

struct ErrorInner {
    message: String,
    source: Option<Arc<dyn Error + Send + Sync>>,
}

/// Failure raised by a user lifecycle callback.
///
/// The error records the component frames it bubbled through on its way to
/// an error boundary (or the caller). Cloning is cheap so the same failure
/// can be handed to every waiter of a future.
#[derive(Clone)]
pub struct ComponentError {
    inner: Arc<ErrorInner>,
    phase: Option<LifecyclePhase>,
    // innermost first
    frames: Vec<&'static str>,
}

impl ComponentError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ErrorInner {
                message: message.into(),
                source: None,
            }),
            phase: None,
            frames: Vec::new(),
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ErrorInner {
                message: message.into(),
                source: Some(Arc::new(source)),
            }),
            phase: None,
            frames: Vec::new(),
        }
    }

    /// Tags the error with the phase it came from unless it already has one.
    pub fn in_phase(mut self, phase: LifecyclePhase) -> Self {
        self.phase.get_or_insert(phase);
        self
    }

    /// Records that the error passed through the frame of `component`.
    pub fn push_frame(&mut self, component: &'static str) {
        self.frames.push(component);
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn phase(&self) -> Option<LifecyclePhase> {
        self.phase
    }

    /// Component names from the outermost frame reached down to the
    /// component that failed.
    pub fn component_stack(&self) -> Vec<&'static str> {
        self.frames.iter().rev().copied().collect()
    }

    /// The component stack joined with `" > "`.
    pub fn path(&self) -> String {
        self.component_stack().join(" > ")
    }

    pub fn failing_component(&self) -> Option<&'static str> {
        self.frames.first().copied()
    }

    /// Returns true when both values originate from the same failure.
    pub fn same_failure(&self, other: &ComponentError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentError")
            .field("message", &self.inner.message)
            .field("phase", &self.phase)
            .field("stack", &self.component_stack())
            .finish()
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(phase) = self.phase {
            write!(f, "{} failed: ", phase.as_str())?;
        }
        f.write_str(&self.inner.message)?;
        if !self.frames.is_empty() {
            write!(f, " (component stack: {})", self.path())?;
        }
        Ok(())
    }
}

impl Error for ComponentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

/// Error returned by component tree operations.
#[derive(Clone, Debug)]
pub enum TreeError {
    Component(ComponentError),
    Released,
    NoRoot,
    NoSizeSpec,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::Component(error) => write!(f, "{error}"),
            TreeError::Released => f.write_str("component tree has been released"),
            TreeError::NoRoot => f.write_str("component tree has no root"),
            TreeError::NoSizeSpec => f.write_str("component tree has no size spec"),
        }
    }
}

impl Error for TreeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TreeError::Component(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ComponentError> for TreeError {
    fn from(error: ComponentError) -> Self {
        TreeError::Component(error)
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
