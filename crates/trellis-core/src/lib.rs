//! Core of the Trellis component tree.
//!
//! This crate turns immutable component descriptions into a
//! layout-independent node tree ("resolve") and owns everything that has
//! to be shared between the threads asking for one: the per-tree state and
//! update queue, versioned futures, and the executor seam. Layout, diffing
//! and the commit gate live in `trellis-ui`.

pub mod collections;
pub mod component;
pub mod element;
pub mod error;
pub mod future;
pub mod hash;
pub mod key;
pub mod node;
pub mod platform;
pub mod resolve;
pub mod result_cache;
pub mod state;
pub mod tree_props;

pub use component::{
    Component, ComponentEq, ComponentKind, Composite, Container, ErrorBoundary, ErrorDisposition,
    ErrorScope, InitialStateScope, Primitive, SizeDependent,
};
pub use element::{Element, EventHandler, TransitionId, TransitionKey, TransitionScope};
pub use error::{ComponentError, LifecyclePhase, TreeError};
pub use future::{CancelToken, FutureExecutionType, RenderSource, VersionedFuture};
pub use key::{DiagnosticKind, GlobalKey, KeyDiagnostic, SiblingKeys};
pub use node::{NodeKind, ResolvedNode, ScopedComponent};
pub use platform::{BackgroundExecutor, InlineExecutor, Task};
pub use resolve::{
    handle_with_boundary, resolve_detached, resolve_nested, resolve_tree, MeasureDelegate, NestedEnv,
    RenderScope, ResolveInput, ResolveResult,
};
pub use result_cache::ResultCache;
pub use state::{
    state_value, LocalState, PendingUpdate, StateSnapshot, StateUpdate, StateValue, TreeState, UpdateMode,
};
pub use tree_props::TreeProps;

pub mod prelude {
    pub use crate::component::{
        Component, ComponentKind, Composite, Container, ErrorBoundary, ErrorDisposition, ErrorScope,
        InitialStateScope, Primitive, SizeDependent,
    };
    pub use crate::element::Element;
    pub use crate::error::{ComponentError, LifecyclePhase, TreeError};
    pub use crate::resolve::RenderScope;
    pub use crate::state::{state_value, StateUpdate, StateValue, UpdateMode};
    pub use crate::tree_props::TreeProps;
    pub use trellis_ui_layout::prelude::*;
}
