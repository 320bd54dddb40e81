//! Correlation between consecutive layouts.
//!
//! Every layout produces a [`DiffNode`] tree parallel to the resolved tree
//! it measured. The next layout walks its new node tree alongside the
//! previous diff tree, matching nodes by global key and tail component
//! type. A match carries the previous output ids forward and, when the
//! node and its specs allow it, the previous measurement. Diff trees only
//! ever save work: dropping them changes performance, never results.

use std::any::{Any, TypeId};
use std::sync::Arc;

use trellis_core::collections::map::HashMap;
use trellis_core::{GlobalKey, ResolvedNode};
use trellis_ui_layout::{is_size_spec_compatible, Point, Size, SizeSpec};

use crate::output::{OutputId, UpdateState};

/// Measured form of one resolved node.
#[derive(Clone, Debug)]
pub struct DiffNode {
    pub(crate) node: Arc<ResolvedNode>,
    pub(crate) width_spec: SizeSpec,
    pub(crate) height_spec: SizeSpec,
    pub(crate) size: Size,
    // relative to the parent's origin
    pub(crate) position: Point,
    pub(crate) update_state: UpdateState,
    pub(crate) host_id: Option<OutputId>,
    pub(crate) content_id: Option<OutputId>,
    pub(crate) nested: Option<Box<NestedTree>>,
    pub(crate) children: Vec<DiffNode>,
}

/// Content of a nested-tree holder for the specs it was laid out with.
#[derive(Clone, Debug)]
pub struct NestedTree {
    pub(crate) root: Option<DiffNode>,
    pub(crate) width_spec: SizeSpec,
    pub(crate) height_spec: SizeSpec,
}

impl NestedTree {
    pub fn root(&self) -> Option<&DiffNode> {
        self.root.as_ref()
    }

    pub fn width_spec(&self) -> SizeSpec {
        self.width_spec
    }

    pub fn height_spec(&self) -> SizeSpec {
        self.height_spec
    }
}

impl DiffNode {
    pub(crate) fn new(
        node: Arc<ResolvedNode>,
        width_spec: SizeSpec,
        height_spec: SizeSpec,
        previous: Option<&DiffNode>,
    ) -> Self {
        Self {
            update_state: update_state(previous, &node),
            host_id: previous.and_then(|previous| previous.host_id),
            content_id: previous.and_then(|previous| previous.content_id),
            node,
            width_spec,
            height_spec,
            size: Size::ZERO,
            position: Point::ZERO,
            nested: None,
            children: Vec::new(),
        }
    }

    pub fn node(&self) -> &Arc<ResolvedNode> {
        &self.node
    }

    pub fn global_key(&self) -> &GlobalKey {
        self.node.global_key()
    }

    pub fn width_spec(&self) -> SizeSpec {
        self.width_spec
    }

    pub fn height_spec(&self) -> SizeSpec {
        self.height_spec
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn update_state(&self) -> UpdateState {
        self.update_state
    }

    pub fn host_id(&self) -> Option<OutputId> {
        self.host_id
    }

    pub fn content_id(&self) -> Option<OutputId> {
        self.content_id
    }

    pub fn nested(&self) -> Option<&NestedTree> {
        self.nested.as_deref()
    }

    pub fn children(&self) -> &[DiffNode] {
        &self.children
    }

    /// Whether this record describes a predecessor of `node`.
    pub fn matches(&self, node: &ResolvedNode) -> bool {
        self.node.global_key() == node.global_key()
            && type_of(&self.node) == type_of(node)
    }

    /// Whether the measurement recorded here is valid for `node` under the
    /// given specs. Only primitives are measured in isolation.
    pub(crate) fn can_reuse_measurement(&self, node: &Arc<ResolvedNode>, width: SizeSpec, height: SizeSpec) -> bool {
        (Arc::ptr_eq(&self.node, node) || self.node.is_shallow_equivalent(node))
            && is_size_spec_compatible(self.width_spec, width, self.size.width)
            && is_size_spec_compatible(self.height_spec, height, self.size.height)
    }

    /// Copy of this subtree for an identical node measured with identical
    /// specs. Ids are kept and everything is marked unchanged.
    pub(crate) fn reused(&self) -> DiffNode {
        let mut copy = self.clone();
        copy.mark_unchanged();
        copy
    }

    pub(crate) fn mark_unchanged(&mut self) {
        self.update_state = UpdateState::Unchanged;
        for child in &mut self.children {
            child.mark_unchanged();
        }
        if let Some(root) = self.nested.as_mut().and_then(|nested| nested.root.as_mut()) {
            root.mark_unchanged();
        }
    }

    /// Number of records in this subtree, nested trees included.
    pub fn record_count(&self) -> usize {
        let nested = self
            .nested()
            .and_then(NestedTree::root)
            .map_or(0, DiffNode::record_count);
        1 + nested + self.children.iter().map(DiffNode::record_count).sum::<usize>()
    }
}

fn update_state(previous: Option<&DiffNode>, node: &Arc<ResolvedNode>) -> UpdateState {
    match previous {
        None => UpdateState::Unknown,
        Some(previous) if Arc::ptr_eq(&previous.node, node) || previous.node.is_shallow_equivalent(node) => {
            UpdateState::Unchanged
        }
        Some(_) => UpdateState::Updated,
    }
}

/// Indexes the children of `previous` by global key.
pub(crate) fn previous_children(previous: Option<&DiffNode>) -> HashMap<&GlobalKey, &DiffNode> {
    previous
        .map(|previous| {
            previous
                .children
                .iter()
                .map(|child| (child.global_key(), child))
                .collect()
        })
        .unwrap_or_default()
}

fn type_of(node: &ResolvedNode) -> TypeId {
    let component: &dyn Any = node.tail().component.as_any();
    component.type_id()
}

#[cfg(test)]
#[path = "tests/diff_tests.rs"]
mod tests;
