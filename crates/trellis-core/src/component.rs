//! Component capabilities.
//!
//! A component is an immutable, value-comparable description. What it can
//! do is expressed through [`ComponentKind`], a closed set of capability
//! traits that the resolver and the layout engine dispatch on:
//!
//! - [`Composite`] renders into a single delegate element;
//! - [`Container`] lists child elements and arranges them with a [`Stack`];
//! - [`Primitive`] measures itself and produces mountable content;
//! - [`SizeDependent`] renders only once concrete size specs are known.
//!
//! Optional lifecycle hooks (initial state, tree props, error boundary)
//! live on [`Component`] itself with inert defaults.

use std::any::Any;
use std::fmt;

use trellis_ui_layout::{Size, SizeSpec, Stack};

use crate::element::Element;
use crate::error::ComponentError;
use crate::key::GlobalKey;
use crate::resolve::RenderScope;
use crate::state::{StateUpdate, StateValue, TreeState};
use crate::tree_props::TreeProps;

/// Object-safe equality and type information for components.
///
/// Blanket-implemented for every `PartialEq` type; never implement it by hand.
pub trait ComponentEq: Any {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn Any) -> bool;
    fn short_type_name(&self) -> &'static str;
}

impl<T: PartialEq + Any> ComponentEq for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn short_type_name(&self) -> &'static str {
        short_name(std::any::type_name::<T>())
    }
}

fn short_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(index) => &base[index + 2..],
        None => base,
    }
}

pub trait Component: ComponentEq + fmt::Debug + Send + Sync + 'static {
    /// Name used for type-derived keys and in error component stacks.
    fn type_name(&self) -> &'static str {
        self.short_type_name()
    }

    fn kind(&self) -> ComponentKind<'_>;

    fn create_initial_state(
        &self,
        _scope: &InitialStateScope<'_>,
    ) -> Result<Option<StateValue>, ComponentError> {
        Ok(None)
    }

    /// Tree props visible to this component's descendants. `None` passes the
    /// inherited props through unchanged.
    fn provide_tree_props(&self, _inherited: &TreeProps) -> Option<TreeProps> {
        None
    }

    fn error_boundary(&self) -> Option<&dyn ErrorBoundary> {
        None
    }
}

impl dyn Component {
    /// Value equivalence: same concrete type and equal props.
    pub fn is_equivalent_to(&self, other: &dyn Component) -> bool {
        self.dyn_eq(other.as_any())
    }

    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

#[derive(Clone, Copy)]
pub enum ComponentKind<'a> {
    Composite(&'a dyn Composite),
    Container(&'a dyn Container),
    Primitive(&'a dyn Primitive),
    SizeDependent(&'a dyn SizeDependent),
}

pub trait Composite {
    fn render(&self, scope: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError>;
}

pub trait Container {
    fn stack(&self) -> Stack {
        Stack::column()
    }

    fn children(&self, scope: &mut RenderScope<'_, '_>) -> Result<Vec<Element>, ComponentError>;
}

/// Leaf measured by an external layout solver.
pub trait Primitive {
    fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, ComponentError>;

    /// Whether the primitive can be measured independently. Primitives that
    /// cannot take whatever the specs give them.
    fn can_measure(&self) -> bool {
        true
    }
}

pub trait SizeDependent {
    fn render_with_size(
        &self,
        scope: &mut RenderScope<'_, '_>,
        width: SizeSpec,
        height: SizeSpec,
    ) -> Result<Option<Element>, ComponentError>;
}

/// What an [`ErrorBoundary`] decided to do with a descendant failure.
#[derive(Debug)]
pub enum ErrorDisposition {
    /// The failure is swallowed. `replacement` takes the place of the failed
    /// content, or nothing is shown when it is `None`.
    Handled { replacement: Option<Element> },
    Propagate,
}

pub trait ErrorBoundary: Send + Sync {
    fn on_error(&self, scope: &mut ErrorScope<'_>, error: &ComponentError) -> ErrorDisposition;
}

pub struct InitialStateScope<'a> {
    pub(crate) global_key: &'a GlobalKey,
    pub(crate) tree_props: &'a TreeProps,
}

impl<'a> InitialStateScope<'a> {
    pub fn global_key(&self) -> &GlobalKey {
        self.global_key
    }

    pub fn tree_prop<T: Any>(&self) -> Option<&T> {
        self.tree_props.get::<T>()
    }
}

/// Handed to [`ErrorBoundary::on_error`]. Updates enqueued here trigger a
/// follow-up resolve once the current pass commits.
pub struct ErrorScope<'a> {
    global_key: &'a GlobalKey,
    tree_state: &'a TreeState,
    enqueued: &'a mut usize,
}

impl<'a> ErrorScope<'a> {
    pub fn new(global_key: &'a GlobalKey, tree_state: &'a TreeState, enqueued: &'a mut usize) -> Self {
        Self {
            global_key,
            tree_state,
            enqueued,
        }
    }

    /// Key of the boundary component.
    pub fn global_key(&self) -> &GlobalKey {
        self.global_key
    }

    pub fn update_state(&mut self, update: StateUpdate) {
        self.tree_state.enqueue_update(self.global_key.clone(), update);
        *self.enqueued += 1;
    }
}

#[cfg(test)]
#[path = "tests/component_tests.rs"]
mod tests;
