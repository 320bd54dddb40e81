//! Layout-independent node tree produced by a resolve.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use trellis_ui_layout::{LayoutProps, Stack};

use crate::component::Component;
use crate::element::{Element, EventHandler, TransitionId};
use crate::key::GlobalKey;
use crate::tree_props::TreeProps;

/// A component together with the identity it was resolved under.
#[derive(Clone)]
pub struct ScopedComponent {
    pub component: Arc<dyn Component>,
    pub global_key: GlobalKey,
    pub stateful: bool,
}

impl fmt::Debug for ScopedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.component.type_name(), self.global_key)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Container(Stack),
    Primitive,
    /// Placeholder for a size-dependent component, resolved during layout.
    NestedTreeHolder,
}

/// One node of a resolved tree.
///
/// A node covers a chain of components: zero or more composites that
/// delegated to each other, ending in the container, primitive or
/// size-dependent component that determines its kind. Nodes are immutable
/// once built and shared by `Arc`; an unchanged subtree in the next resolve
/// is the same allocation.
pub struct ResolvedNode {
    pub(crate) chain: SmallVec<[ScopedComponent; 2]>,
    pub(crate) element: Element,
    pub(crate) kind: NodeKind,
    pub(crate) props: LayoutProps,
    pub(crate) handlers: SmallVec<[EventHandler; 1]>,
    pub(crate) transition: Option<TransitionId>,
    pub(crate) inherited_props: TreeProps,
    pub(crate) tail_props: TreeProps,
    pub(crate) children: Vec<Arc<ResolvedNode>>,
}

impl ResolvedNode {
    /// Identity of the node: the global key of its head component.
    pub fn global_key(&self) -> &GlobalKey {
        &self.head().global_key
    }

    pub fn head(&self) -> &ScopedComponent {
        &self.chain[0]
    }

    /// The component that determined the node kind.
    pub fn tail(&self) -> &ScopedComponent {
        &self.chain[self.chain.len() - 1]
    }

    pub fn chain(&self) -> &[ScopedComponent] {
        &self.chain
    }

    /// Element the head component was created from.
    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_nested_tree_holder(&self) -> bool {
        self.kind == NodeKind::NestedTreeHolder
    }

    pub fn props(&self) -> &LayoutProps {
        &self.props
    }

    pub fn handlers(&self) -> &[EventHandler] {
        &self.handlers
    }

    pub fn transition(&self) -> Option<&TransitionId> {
        self.transition.as_ref()
    }

    /// Tree props the head component inherited from its parent.
    pub fn inherited_props(&self) -> &TreeProps {
        &self.inherited_props
    }

    /// Tree props visible to the tail component.
    pub fn tail_props(&self) -> &TreeProps {
        &self.tail_props
    }

    pub fn children(&self) -> &[Arc<ResolvedNode>] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|child| child.node_count()).sum::<usize>()
    }

    /// Finds the node whose head key is `key` in this subtree.
    pub fn find(self: &Arc<Self>, key: &GlobalKey) -> Option<Arc<ResolvedNode>> {
        if self.global_key() == key {
            return Some(self.clone());
        }
        if !self.global_key().is_ancestor_of(key) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(key))
    }

    /// Copy of this subtree with every key under `from` moved under `to`.
    pub(crate) fn rekeyed(&self, from: &GlobalKey, to: &GlobalKey) -> ResolvedNode {
        let rebase = |key: &GlobalKey| key.rebased(from, to).unwrap_or_else(|| key.clone());
        ResolvedNode {
            chain: self
                .chain
                .iter()
                .map(|scoped| ScopedComponent {
                    global_key: rebase(&scoped.global_key),
                    ..scoped.clone()
                })
                .collect(),
            element: self.element.clone(),
            kind: self.kind,
            props: self.props,
            handlers: self.handlers.clone(),
            transition: self.transition.as_ref().map(|transition| match transition {
                TransitionId::Local { owner, key } => TransitionId::Local {
                    owner: rebase(owner),
                    key: key.clone(),
                },
                global => global.clone(),
            }),
            inherited_props: self.inherited_props.clone(),
            tail_props: self.tail_props.clone(),
            children: self
                .children
                .iter()
                .map(|child| Arc::new(child.rekeyed(from, to)))
                .collect(),
        }
    }

    /// Calls `f` for every node in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&ResolvedNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    /// Pairwise equivalence of the component chains and node attributes,
    /// ignoring children.
    pub fn is_shallow_equivalent(&self, other: &ResolvedNode) -> bool {
        self.kind == other.kind
            && self.props == other.props
            && self.handlers == other.handlers
            && self.transition == other.transition
            && self.inherited_props == other.inherited_props
            && self.tail_props == other.tail_props
            && self.chain.len() == other.chain.len()
            && self.chain.iter().zip(other.chain.iter()).all(|(a, b)| {
                a.global_key == b.global_key
                    && (Arc::ptr_eq(&a.component, &b.component)
                        || a.component.is_equivalent_to(b.component.as_ref()))
            })
    }
}

impl fmt::Debug for ResolvedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ResolvedNode");
        s.field("key", self.global_key())
            .field("chain", &self.chain)
            .field("kind", &self.kind);
        if !self.children.is_empty() {
            s.field("children", &self.children);
        }
        s.finish()
    }
}
