//! The committed output of a layout.

use std::fmt;
use std::sync::Arc;

use log::warn;
use trellis_core::collections::map::{HashMap, HashSet};
use trellis_core::collections::OrderedMap;
use trellis_core::hash::hash_one;
use trellis_core::{GlobalKey, KeyDiagnostic, LocalState, NodeKind, ResolvedNode, TransitionId};
use trellis_ui_layout::{Point, Rect, Size, SizeSpec};

use crate::diff::DiffNode;
use crate::layout::LayoutStats;
use crate::output::{
    compare_by_bottom, compare_by_top, sorted_indices, OutputId, OutputKind, RenderOutput, ROOT_HOST_ID,
};

pub(crate) struct LayoutParts {
    pub version: u64,
    pub resolve_version: u64,
    pub width_spec: SizeSpec,
    pub height_spec: SizeSpec,
    pub size: Size,
    pub root: Option<Arc<ResolvedNode>>,
    pub diff_root: Option<DiffNode>,
    pub nested_local: LocalState,
    pub diagnostics: Vec<KeyDiagnostic>,
    pub state_updates_in_render: usize,
    pub stats: LayoutStats,
}

/// Positioned outputs for one resolved tree and one pair of size specs.
///
/// Outputs are stored in pre-order; parents always precede their
/// children. Two index orderings support incremental mounting: by top edge
/// and by bottom edge.
pub struct LayoutState {
    version: u64,
    resolve_version: u64,
    width_spec: SizeSpec,
    height_spec: SizeSpec,
    size: Size,
    root: Option<Arc<ResolvedNode>>,
    outputs: Vec<RenderOutput>,
    by_top: Vec<usize>,
    by_bottom: Vec<usize>,
    ids: HashMap<OutputId, usize>,
    transitions: OrderedMap<TransitionId, Rect>,
    diff_root: Option<DiffNode>,
    nested_local: LocalState,
    diagnostics: Vec<KeyDiagnostic>,
    state_updates_in_render: usize,
    stats: LayoutStats,
}

impl LayoutState {
    pub(crate) fn assemble(mut parts: LayoutParts) -> Self {
        if let Some(root) = parts.diff_root.as_mut() {
            let mut used = HashSet::default();
            keep_carried_ids(root, true, &mut used);
            assign_new_ids(root, &mut used);
        }

        let mut collected = Collected::default();
        if let Some(root) = parts.diff_root.as_ref() {
            collect(root, Point::ZERO, None, &mut collected);
        }
        let Collected { outputs, transitions } = collected;
        let by_top = sorted_indices(&outputs, compare_by_top);
        let by_bottom = sorted_indices(&outputs, compare_by_bottom);
        let ids = outputs.iter().map(|output| (output.id, output.index)).collect();

        Self {
            version: parts.version,
            resolve_version: parts.resolve_version,
            width_spec: parts.width_spec,
            height_spec: parts.height_spec,
            size: parts.size,
            root: parts.root,
            outputs,
            by_top,
            by_bottom,
            ids,
            transitions,
            diff_root: parts.diff_root,
            nested_local: parts.nested_local,
            diagnostics: parts.diagnostics,
            state_updates_in_render: parts.state_updates_in_render,
            stats: parts.stats,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Version of the resolve this layout was computed from.
    pub fn resolve_version(&self) -> u64 {
        self.resolve_version
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

    pub fn root(&self) -> Option<&Arc<ResolvedNode>> {
        self.root.as_ref()
    }

    pub fn outputs(&self) -> &[RenderOutput] {
        &self.outputs
    }

    pub fn output(&self, id: OutputId) -> Option<&RenderOutput> {
        self.ids.get(&id).map(|&index| &self.outputs[index])
    }

    /// Outputs created for the node with the given global key.
    pub fn outputs_for(&self, key: &GlobalKey) -> impl Iterator<Item = &RenderOutput> + '_ {
        let key = key.clone();
        self.outputs.iter().filter(move |output| output.global_key == key)
    }

    pub fn by_top(&self) -> &[usize] {
        &self.by_top
    }

    pub fn by_bottom(&self) -> &[usize] {
        &self.by_bottom
    }

    pub fn outputs_by_top(&self) -> impl Iterator<Item = &RenderOutput> + '_ {
        self.by_top.iter().map(|&index| &self.outputs[index])
    }

    pub fn outputs_by_bottom(&self) -> impl Iterator<Item = &RenderOutput> + '_ {
        self.by_bottom.iter().map(|&index| &self.outputs[index])
    }

    /// Outputs whose vertical extent overlaps `viewport`, in top order.
    pub fn visible_outputs(&self, viewport: Rect) -> Vec<&RenderOutput> {
        self.outputs_by_top()
            .take_while(|output| output.bounds.top < viewport.bottom)
            .filter(|output| output.bounds.bottom > viewport.top)
            .collect()
    }

    /// Bounds of every transition key declared in this layout.
    pub fn transitions(&self) -> &OrderedMap<TransitionId, Rect> {
        &self.transitions
    }

    pub fn diff_root(&self) -> Option<&DiffNode> {
        self.diff_root.as_ref()
    }

    /// States of nested trees resolved during this layout.
    pub fn nested_local_state(&self) -> &LocalState {
        &self.nested_local
    }

    /// Duplicate-key diagnostics raised by nested resolves.
    pub fn diagnostics(&self) -> &[KeyDiagnostic] {
        &self.diagnostics
    }

    pub fn state_updates_in_render(&self) -> usize {
        self.state_updates_in_render
    }

    pub fn stats(&self) -> LayoutStats {
        self.stats
    }
}

impl fmt::Debug for LayoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutState")
            .field("version", &self.version)
            .field("resolve_version", &self.resolve_version)
            .field("specs", &(self.width_spec, self.height_spec))
            .field("size", &self.size)
            .field("outputs", &self.outputs)
            .finish()
    }
}

fn needs_host(diff: &DiffNode) -> bool {
    let node = &diff.node;
    node.kind() != NodeKind::Primitive && (!node.handlers().is_empty() || node.transition().is_some())
}

fn needs_content(diff: &DiffNode) -> bool {
    diff.node.kind() == NodeKind::Primitive
}

/// First pass: keeps every carried id that is still wanted and unique.
fn keep_carried_ids(diff: &mut DiffNode, is_root: bool, used: &mut HashSet<OutputId>) {
    if is_root {
        diff.host_id = Some(ROOT_HOST_ID);
        used.insert(ROOT_HOST_ID);
    } else {
        let wanted = needs_host(diff);
        diff.host_id = diff.host_id.filter(|&id| wanted && used.insert(id));
    }
    let wanted = needs_content(diff);
    diff.content_id = diff.content_id.filter(|&id| wanted && used.insert(id));

    for child in &mut diff.children {
        keep_carried_ids(child, false, used);
    }
    if let Some(root) = diff.nested.as_mut().and_then(|nested| nested.root.as_mut()) {
        keep_carried_ids(root, false, used);
    }
}

/// Second pass: derives ids for outputs that did not carry one.
fn assign_new_ids(diff: &mut DiffNode, used: &mut HashSet<OutputId>) {
    if diff.host_id.is_none() && needs_host(diff) {
        diff.host_id = Some(new_id(diff.node.global_key(), OutputKind::Host, used));
    }
    if diff.content_id.is_none() && needs_content(diff) {
        diff.content_id = Some(new_id(diff.node.global_key(), OutputKind::Content, used));
    }
    for child in &mut diff.children {
        assign_new_ids(child, used);
    }
    if let Some(root) = diff.nested.as_mut().and_then(|nested| nested.root.as_mut()) {
        assign_new_ids(root, used);
    }
}

fn new_id(key: &GlobalKey, kind: OutputKind, used: &mut HashSet<OutputId>) -> OutputId {
    let mut id = hash_one(&(key.as_str(), kind));
    let mut salt: u32 = 0;
    while id == ROOT_HOST_ID || !used.insert(id) {
        salt += 1;
        id = hash_one(&(key.as_str(), kind, salt));
    }
    id
}

#[derive(Default)]
struct Collected {
    outputs: Vec<RenderOutput>,
    transitions: OrderedMap<TransitionId, Rect>,
}

impl Collected {
    fn push(&mut self, diff: &DiffNode, id: OutputId, kind: OutputKind, parent: Option<usize>, bounds: Rect) -> usize {
        let node = &diff.node;
        // handlers and transitions belong to the host when the node has one
        let attributed = kind == OutputKind::Host || diff.host_id.is_none();
        let index = self.outputs.len();
        self.outputs.push(RenderOutput {
            id,
            index,
            parent,
            kind,
            bounds,
            global_key: node.global_key().clone(),
            component: node.tail().component.clone(),
            update_state: diff.update_state,
            transition: node.transition().cloned().filter(|_| attributed),
            handlers: if attributed {
                node.handlers().iter().cloned().collect()
            } else {
                Default::default()
            },
        });
        index
    }
}

fn collect(diff: &DiffNode, parent_origin: Point, parent_host: Option<usize>, out: &mut Collected) {
    let origin = parent_origin.offset(diff.position.x, diff.position.y);
    let bounds = Rect::from_origin_size(origin, diff.size);

    let mut host = parent_host;
    if let Some(id) = diff.host_id {
        host = Some(out.push(diff, id, OutputKind::Host, parent_host, bounds));
    }
    if let Some(id) = diff.content_id {
        out.push(diff, id, OutputKind::Content, host, bounds);
    }
    if let Some(transition) = diff.node.transition() {
        if out.transitions.insert(transition.clone(), bounds).is_some() {
            warn!("transition key {transition} is declared more than once");
        }
    }

    for child in &diff.children {
        collect(child, origin, host, out);
    }
    if let Some(root) = diff.nested().and_then(|nested| nested.root()) {
        collect(root, origin, host, out);
    }
}

#[cfg(test)]
#[path = "tests/layout_state_tests.rs"]
mod tests;
