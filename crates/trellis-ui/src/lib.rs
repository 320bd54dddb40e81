//! Layout, diffing and the concurrent component tree for Trellis.
//!
//! [`ComponentTree`] is the entry point: it accepts roots, size specs and
//! state updates from any thread, schedules resolve and layout work as
//! versioned futures, and commits only the newest results. The layout
//! engine turns a resolved tree into a [`LayoutState`] of positioned
//! [`RenderOutput`]s with stable ids.

pub mod config;
pub mod diff;
pub mod layout;
pub mod layout_state;
pub mod listeners;
pub mod output;
pub mod transitions;
pub mod tree;
pub mod widgets;

pub use config::{TreeConfig, DEFAULT_STATE_UPDATE_LOOP_THRESHOLD};
pub use diff::{DiffNode, NestedTree};
pub use layout::{compute_layout, LayoutEngine, LayoutInput, LayoutStats};
pub use layout_state::LayoutState;
pub use listeners::{
    FutureExecution, FutureExecutionListener, FuturePhase, NewLayoutStateReadyListener, TreeErrorListener,
};
pub use output::{compare_by_bottom, compare_by_top, OutputId, OutputKind, RenderOutput, UpdateState, ROOT_HOST_ID};
pub use transitions::{transition_changes, TransitionChange};
pub use tree::ComponentTree;
pub use widgets::{Column, Row, Spacer, Text};

pub use trellis_core;
pub use trellis_ui_layout;

pub mod prelude {
    pub use crate::config::TreeConfig;
    pub use crate::layout_state::LayoutState;
    pub use crate::output::{RenderOutput, UpdateState};
    pub use crate::tree::ComponentTree;
    pub use crate::widgets::{Column, Row, Spacer, Text};
    pub use trellis_core::prelude::*;
    pub use trellis_core::{GlobalKey, RenderSource};
}
