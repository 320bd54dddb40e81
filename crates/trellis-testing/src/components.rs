//! Instrumented components.
//!
//! Counters and recorders compare equal to each other, so two instances
//! built with different counters are still equivalent for reconciliation.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use trellis_core::{
    Component, ComponentError, ComponentKind, Composite, Element, ErrorBoundary, ErrorDisposition, ErrorScope,
    Primitive, RenderScope,
};
use trellis_ui_layout::{Size, SizeSpec};

/// Shared call counter.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

impl PartialEq for CallCounter {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl fmt::Debug for CallCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallCounter({})", self.get())
    }
}

/// Shared log of values.
pub struct Recorded<T>(Arc<Mutex<Vec<T>>>);

impl<T> Recorded<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(value);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Recorded<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<T> Clone for Recorded<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Recorded<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartialEq for Recorded<T> {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl<T> fmt::Debug for Recorded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recorded({})", self.len())
    }
}

/// Primitive of a fixed preferred size that counts its measurements.
#[derive(Debug, PartialEq)]
pub struct CountingLeaf {
    pub label: &'static str,
    pub size: Size,
    pub measures: CallCounter,
}

impl CountingLeaf {
    pub fn new(label: &'static str, width: i32, height: i32, measures: &CallCounter) -> Self {
        Self {
            label,
            size: Size::new(width, height),
            measures: measures.clone(),
        }
    }
}

impl Component for CountingLeaf {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Primitive(self)
    }
}

impl Primitive for CountingLeaf {
    fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, ComponentError> {
        self.measures.hit();
        Ok(Size::new(width.resolve(self.size.width), height.resolve(self.size.height)))
    }
}

/// Composite that renders `child` and counts its renders.
#[derive(Debug, PartialEq)]
pub struct CountingComposite {
    pub child: Element,
    pub renders: CallCounter,
}

impl CountingComposite {
    pub fn new(child: Element, renders: &CallCounter) -> Self {
        Self {
            child,
            renders: renders.clone(),
        }
    }
}

impl Component for CountingComposite {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }
}

impl Composite for CountingComposite {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        self.renders.hit();
        Ok(Some(self.child.clone()))
    }
}

/// Composite that renders `child` unchanged.
#[derive(Debug, PartialEq)]
pub struct Wrapper {
    pub child: Element,
}

impl Wrapper {
    pub fn new(child: Element) -> Self {
        Self { child }
    }
}

impl Component for Wrapper {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }
}

impl Composite for Wrapper {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        Ok(Some(self.child.clone()))
    }
}

/// Primitive whose measurement always fails.
#[derive(Debug, PartialEq)]
pub struct ThrowingLeaf {
    pub message: &'static str,
}

impl ThrowingLeaf {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl Component for ThrowingLeaf {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Primitive(self)
    }
}

impl Primitive for ThrowingLeaf {
    fn measure(&self, _: SizeSpec, _: SizeSpec) -> Result<Size, ComponentError> {
        Err(ComponentError::new(self.message))
    }
}

/// Error boundary that records every failure it sees and shows
/// `replacement` instead.
#[derive(Debug, PartialEq)]
pub struct RecordingBoundary {
    pub child: Element,
    pub replacement: Option<Element>,
    pub caught: Recorded<ComponentError>,
}

impl RecordingBoundary {
    pub fn new(child: Element, caught: &Recorded<ComponentError>) -> Self {
        Self {
            child,
            replacement: None,
            caught: caught.clone(),
        }
    }

    pub fn with_replacement(mut self, replacement: Element) -> Self {
        self.replacement = Some(replacement);
        self
    }
}

impl Component for RecordingBoundary {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }

    fn type_name(&self) -> &'static str {
        "Boundary"
    }

    fn error_boundary(&self) -> Option<&dyn ErrorBoundary> {
        Some(self)
    }
}

impl Composite for RecordingBoundary {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        Ok(Some(self.child.clone()))
    }
}

impl ErrorBoundary for RecordingBoundary {
    fn on_error(&self, _: &mut ErrorScope<'_>, error: &ComponentError) -> ErrorDisposition {
        self.caught.push(error.clone());
        ErrorDisposition::Handled {
            replacement: self.replacement.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_do_not_affect_equality() {
        let a = CountingLeaf::new("leaf", 10, 10, &CallCounter::new());
        let b = CountingLeaf::new("leaf", 10, 10, &CallCounter::new());
        assert_eq!(a, b);
        assert_ne!(a, CountingLeaf::new("other", 10, 10, &CallCounter::new()));
    }

    #[test]
    fn counting_leaf_counts_and_clamps() {
        let measures = CallCounter::new();
        let leaf = CountingLeaf::new("leaf", 30, 10, &measures);
        let size = leaf.measure(SizeSpec::at_most(20), SizeSpec::UNSPECIFIED).unwrap();
        assert_eq!(size, Size::new(20, 10));
        assert_eq!(measures.get(), 1);
    }
}
