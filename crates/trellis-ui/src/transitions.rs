//! Correlation of transition keys between two layouts.
//!
//! The animation engine is an external collaborator; it receives, for
//! every transition key present in either layout, the bounds before and
//! after the change.

use indexmap::IndexSet;
use trellis_core::TransitionId;
use trellis_ui_layout::Rect;

use crate::layout_state::LayoutState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionChange {
    pub id: TransitionId,
    /// `None` when the key appears in this layout.
    pub before: Option<Rect>,
    /// `None` when the key disappears in this layout.
    pub after: Option<Rect>,
}

impl TransitionChange {
    pub fn is_appearing(&self) -> bool {
        self.before.is_none()
    }

    pub fn is_disappearing(&self) -> bool {
        self.after.is_none()
    }

    pub fn is_changed(&self) -> bool {
        self.before != self.after
    }
}

/// Pairs the transition bounds of `previous` and `next`.
///
/// Keys are reported in the order `next` declares them, followed by keys
/// only `previous` had.
pub fn transition_changes(previous: Option<&LayoutState>, next: &LayoutState) -> Vec<TransitionChange> {
    let mut ids: IndexSet<&TransitionId> = next.transitions().keys().collect();
    if let Some(previous) = previous {
        ids.extend(previous.transitions().keys());
    }

    ids.into_iter()
        .map(|id| TransitionChange {
            id: id.clone(),
            before: previous.and_then(|previous| previous.transitions().get(id).copied()),
            after: next.transitions().get(id).copied(),
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/transitions_tests.rs"]
mod tests;
