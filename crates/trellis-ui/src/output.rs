//! Mountable outputs of a layout and their orderings.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use trellis_core::{Component, EventHandler, GlobalKey, TransitionId};
use trellis_ui_layout::Rect;

/// Stable identity of an output across layouts.
pub type OutputId = u64;

/// Id of the host output created for the tree root.
pub const ROOT_HOST_ID: OutputId = 0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Hosts other outputs; carries handlers and transition keys of
    /// containers.
    Host,
    /// Content drawn by a primitive.
    Content,
}

/// How an output relates to the output with the same id in the previous
/// layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UpdateState {
    /// No previous layout had this output.
    Unknown,
    /// Same components and attributes as before; rebinding can be skipped.
    Unchanged,
    Updated,
}

/// One positioned, mountable unit of a [`LayoutState`].
///
/// [`LayoutState`]: crate::LayoutState
#[derive(Clone)]
pub struct RenderOutput {
    pub id: OutputId,
    /// Position in [`LayoutState::outputs`](crate::LayoutState::outputs).
    pub index: usize,
    /// Index of the enclosing host output.
    pub parent: Option<usize>,
    pub kind: OutputKind,
    /// Absolute bounds within the root.
    pub bounds: Rect,
    pub global_key: GlobalKey,
    pub component: Arc<dyn Component>,
    pub update_state: UpdateState,
    pub transition: Option<TransitionId>,
    pub handlers: SmallVec<[EventHandler; 1]>,
}

impl fmt::Debug for RenderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOutput")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("kind", &self.kind)
            .field("bounds", &self.bounds)
            .field("key", &self.global_key)
            .field("component", &self.component.type_name())
            .field("update_state", &self.update_state)
            .finish()
    }
}

/// Orders outputs by top edge, then by index.
pub fn compare_by_top(a: &RenderOutput, b: &RenderOutput) -> Ordering {
    a.bounds
        .top
        .cmp(&b.bounds.top)
        .then_with(|| a.index.cmp(&b.index))
}

/// Orders outputs by bottom edge; on equal bottoms the higher index comes
/// first so that unmounting walks siblings in reverse.
pub fn compare_by_bottom(a: &RenderOutput, b: &RenderOutput) -> Ordering {
    a.bounds
        .bottom
        .cmp(&b.bounds.bottom)
        .then_with(|| b.index.cmp(&a.index))
}

pub(crate) fn sorted_indices(
    outputs: &[RenderOutput],
    compare: fn(&RenderOutput, &RenderOutput) -> Ordering,
) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..outputs.len()).collect();
    indices.sort_by(|&a, &b| compare(&outputs[a], &outputs[b]));
    indices
}
