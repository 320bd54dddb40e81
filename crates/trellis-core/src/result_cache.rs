//! Resolve-scoped memoization.
//!
//! A component measured through [`RenderScope::measure`] is resolved ahead
//! of time. If the same component instance is then returned as a child,
//! the cached node is used instead of resolving it again. A child whose key
//! was rewritten (for example to `T!1`) takes the cached node re-keyed,
//! unless the subtree holds state: state belongs to the key, so such a
//! subtree is resolved again. Sizes are cached per instance and spec pair.
//!
//! [`RenderScope::measure`]: crate::resolve::RenderScope::measure

use std::sync::Arc;

use log::trace;
use trellis_ui_layout::{Size, SizeSpec};

use crate::collections::map::HashMap;
use crate::component::Component;
use crate::key::GlobalKey;
use crate::node::ResolvedNode;
use crate::state::LocalState;

fn instance_id(component: &Arc<dyn Component>) -> usize {
    Arc::as_ptr(component) as *const () as usize
}

struct CachedNode {
    // keeps the allocation alive so the address cannot be reused
    component: Arc<dyn Component>,
    key: GlobalKey,
    node: Option<Arc<ResolvedNode>>,
    local: LocalState,
}

#[derive(Default)]
pub struct ResultCache {
    nodes: HashMap<usize, CachedNode>,
    sizes: HashMap<(usize, SizeSpec, SizeSpec), Size>,
    measured: Vec<Arc<dyn Component>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn node(&self, component: &Arc<dyn Component>) -> Option<(&GlobalKey, Option<&Arc<ResolvedNode>>)> {
        self.nodes
            .get(&instance_id(component))
            .filter(|cached| Arc::ptr_eq(&cached.component, component))
            .map(|cached| (&cached.key, cached.node.as_ref()))
    }

    pub(crate) fn insert_node(
        &mut self,
        component: &Arc<dyn Component>,
        key: GlobalKey,
        node: Option<Arc<ResolvedNode>>,
        local: LocalState,
    ) {
        self.nodes.insert(
            instance_id(component),
            CachedNode {
                component: component.clone(),
                key,
                node,
                local,
            },
        );
    }

    /// Removes and returns the node cached for `component`, moved to `key`
    /// if it was resolved under another one.
    pub(crate) fn take_node(
        &mut self,
        component: &Arc<dyn Component>,
        key: &GlobalKey,
    ) -> Option<(Option<Arc<ResolvedNode>>, LocalState)> {
        let id = instance_id(component);
        let usable = self.nodes.get(&id).is_some_and(|cached| {
            Arc::ptr_eq(&cached.component, component) && (&cached.key == key || cached.local.is_stateless())
        });
        if !usable {
            return None;
        }
        let cached = self.nodes.remove(&id)?;
        if &cached.key == key {
            return Some((cached.node, cached.local));
        }
        trace!("moving measured node from {} to {}", cached.key, key);
        let node = cached.node.map(|node| Arc::new(node.rekeyed(&cached.key, key)));
        Some((node, cached.local))
    }

    pub(crate) fn size(&mut self, component: &Arc<dyn Component>, width: SizeSpec, height: SizeSpec) -> Option<Size> {
        let size = self.sizes.get(&(instance_id(component), width, height)).copied();
        if size.is_some() {
        }
        size
    }

    pub(crate) fn insert_size(&mut self, component: &Arc<dyn Component>, width: SizeSpec, height: SizeSpec, size: Size) {
        if self.sizes.insert((instance_id(component), width, height), size).is_none() {
            self.measured.push(component.clone());
        }
    }
}
