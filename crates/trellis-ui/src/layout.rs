//! The layout engine.
//!
//! Layout walks a resolved tree once, top-down for specs and bottom-up for
//! sizes. Primitives are measured through their [`Primitive`] capability,
//! containers arrange their children with their [`Stack`], and
//! nested-tree holders resolve their content now that concrete specs are
//! known and lay it out recursively.
//!
//! With a previous [`LayoutState`] the engine walks the previous
//! [`DiffNode`] tree alongside the new one. Output ids always carry over
//! from a matched predecessor; measurements carry over only when diffing is
//! enabled and the recorded specs are compatible with the new ones.
//!
//! [`Primitive`]: trellis_core::Primitive

use std::sync::Arc;

use log::{debug, trace};
use trellis_core::{
    handle_with_boundary, resolve_detached, resolve_nested, ComponentError, ComponentKind, LifecyclePhase,
    MeasureDelegate, NestedEnv, NodeKind, ResolveResult, ResolvedNode, ScopedComponent, TreeState,
};
use trellis_ui_layout::{Edges, Point, Size, SizeSpec, Stack};

use crate::diff::{previous_children, DiffNode, NestedTree};
use crate::layout_state::{LayoutParts, LayoutState};

/// Counters describing how much work one layout did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutStats {
    /// Primitive `measure` calls.
    pub measured: usize,
    /// Diff records whose measurement was reused instead.
    pub reused: usize,
    /// Nested trees resolved during the pass.
    pub nested_resolves: usize,
}

/// Stateless measuring entry point, shared with the resolver so that
/// components can measure children while they render.
#[derive(Clone, Copy, Debug, Default)]
pub struct LayoutEngine;

impl LayoutEngine {
    pub fn shared() -> Arc<dyn MeasureDelegate> {
        Arc::new(LayoutEngine)
    }
}

impl MeasureDelegate for LayoutEngine {
    fn measure(
        &self,
        node: &Arc<ResolvedNode>,
        width: SizeSpec,
        height: SizeSpec,
        env: &mut NestedEnv,
    ) -> Result<Size, ComponentError> {
        let mut measurer = Measurer::new(env, false);
        let measured = measurer.measure(node, width, height, None)?;
        Ok(measured.map_or_else(
            || Size::new(width.resolve(0), height.resolve(0)),
            |diff| diff.size,
        ))
    }
}

/// Inputs of one layout pass.
pub struct LayoutInput {
    pub resolve: Arc<ResolveResult>,
    pub width: SizeSpec,
    pub height: SizeSpec,
    pub previous: Option<Arc<LayoutState>>,
    pub tree_state: Arc<TreeState>,
    pub version: u64,
    pub use_diffing: bool,
    pub reconcile: bool,
}

impl LayoutInput {
    pub fn new(resolve: Arc<ResolveResult>, tree_state: Arc<TreeState>, width: SizeSpec, height: SizeSpec) -> Self {
        Self {
            resolve,
            width,
            height,
            previous: None,
            tree_state,
            version: 0,
            use_diffing: true,
            reconcile: true,
        }
    }

    pub fn previous(mut self, previous: Option<Arc<LayoutState>>) -> Self {
        self.previous = previous;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn use_diffing(mut self, use_diffing: bool) -> Self {
        self.use_diffing = use_diffing;
        self
    }

    pub fn reconcile(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }
}

/// Lays out `input.resolve` for the given specs.
///
/// Nothing is committed here; nested-tree states end up in the returned
/// state's [`LayoutState::nested_local_state`].
pub fn compute_layout(input: LayoutInput) -> Result<LayoutState, ComponentError> {
    let snapshot = Arc::new(input.tree_state.snapshot());
    let mut env = NestedEnv::new(
        input.tree_state.clone(),
        snapshot,
        input.reconcile,
        Some(LayoutEngine::shared()),
    );

    let previous_root = input.previous.as_ref().and_then(|previous| previous.diff_root());
    let mut measurer = Measurer::new(&mut env, input.use_diffing);
    let root = match input.resolve.root() {
        Some(node) => measurer.measure_root(node, input.width, input.height, previous_root)?,
        None => None,
    };
    let stats = measurer.stats;

    let content = root.as_ref().map_or(Size::ZERO, outer_size);
    let size = Size::new(input.width.resolve(content.width), input.height.resolve(content.height));
    debug!(
        "layout v{} (resolve v{}): {}x{} for {:?} x {:?}, {} measured, {} reused",
        input.version,
        input.resolve.version(),
        size.width,
        size.height,
        input.width,
        input.height,
        stats.measured,
        stats.reused
    );

    Ok(LayoutState::assemble(LayoutParts {
        version: input.version,
        resolve_version: input.resolve.version(),
        width_spec: input.width,
        height_spec: input.height,
        size,
        root: input.resolve.root().cloned(),
        diff_root: root,
        nested_local: env.local,
        diagnostics: env.diagnostics,
        state_updates_in_render: env.state_updates_in_render,
        stats,
    }))
}

// size including the node's margin
fn outer_size(diff: &DiffNode) -> Size {
    let margin = diff.node.props().margin();
    Size::new(
        diff.size.width.saturating_add(margin.horizontal_sum()),
        diff.size.height.saturating_add(margin.vertical_sum()),
    )
}

fn with_frames(mut error: ComponentError, chain: &[ScopedComponent]) -> ComponentError {
    for scoped in chain.iter().rev() {
        error.push_frame(scoped.component.type_name());
    }
    error
}

struct Measurer<'e> {
    env: &'e mut NestedEnv,
    use_diffing: bool,
    stats: LayoutStats,
}

impl<'e> Measurer<'e> {
    fn new(env: &'e mut NestedEnv, use_diffing: bool) -> Self {
        Self {
            env,
            use_diffing,
            stats: LayoutStats::default(),
        }
    }

    /// Measures a root that is not arranged by a parent container; its
    /// margin is applied here.
    fn measure_root(
        &mut self,
        node: &Arc<ResolvedNode>,
        width: SizeSpec,
        height: SizeSpec,
        previous: Option<&DiffNode>,
    ) -> Result<Option<DiffNode>, ComponentError> {
        let margin = node.props().margin();
        let measured = self.measure(
            node,
            width.shrink(margin.horizontal_sum()),
            height.shrink(margin.vertical_sum()),
            previous,
        )?;
        Ok(measured.map(|mut diff| {
            diff.position = Point::new(margin.left, margin.top);
            diff
        }))
    }

    /// Measures `node` under the specs its parent offered. `None` means an
    /// error boundary removed the node.
    fn measure(
        &mut self,
        node: &Arc<ResolvedNode>,
        width: SizeSpec,
        height: SizeSpec,
        previous: Option<&DiffNode>,
    ) -> Result<Option<DiffNode>, ComponentError> {
        let previous = previous.filter(|previous| previous.matches(node));
        match self.measure_node(node, width, height, previous) {
            Ok(diff) => Ok(Some(diff)),
            Err(error) => self.recover(node, width, height, error),
        }
    }

    fn measure_node(
        &mut self,
        node: &Arc<ResolvedNode>,
        offered_width: SizeSpec,
        offered_height: SizeSpec,
        previous: Option<&DiffNode>,
    ) -> Result<DiffNode, ComponentError> {
        let width = node.props().width_spec(offered_width);
        let height = node.props().height_spec(offered_height);

        if let Some(previous) = previous.filter(|previous| {
            self.use_diffing
                && Arc::ptr_eq(&previous.node, node)
                && previous.width_spec == width
                && previous.height_spec == height
                && !self.env.snapshot.has_pending_within(node.global_key())
        }) {
            trace!("layout: reusing measured subtree at {}", node.global_key());
            self.stats.reused += previous.record_count();
            return Ok(previous.reused());
        }

        let mut diff = DiffNode::new(node.clone(), width, height, previous);
        match node.kind() {
            NodeKind::Primitive => diff.size = self.measure_primitive(node, width, height, previous)?,
            NodeKind::Container(stack) => self.measure_container(&mut diff, stack, previous)?,
            NodeKind::NestedTreeHolder => self.measure_holder(&mut diff, previous)?,
        }
        Ok(diff)
    }

    fn measure_primitive(
        &mut self,
        node: &Arc<ResolvedNode>,
        width: SizeSpec,
        height: SizeSpec,
        previous: Option<&DiffNode>,
    ) -> Result<Size, ComponentError> {
        if let Some(previous) =
            previous.filter(|previous| self.use_diffing && previous.can_reuse_measurement(node, width, height))
        {
            self.stats.reused += 1;
            return Ok(Size::new(
                width.resolve(previous.size.width),
                height.resolve(previous.size.height),
            ));
        }

        let component = &node.tail().component;
        let ComponentKind::Primitive(primitive) = component.kind() else {
            return Err(ComponentError::new(format!("{} is not a primitive", component.type_name()))
                .in_phase(LifecyclePhase::Measure));
        };
        if !primitive.can_measure() {
            return Ok(Size::new(width.resolve(0), height.resolve(0)));
        }
        self.stats.measured += 1;
        let measured = primitive
            .measure(width, height)
            .map_err(|error| error.in_phase(LifecyclePhase::Measure))?;
        Ok(Size::new(width.resolve(measured.width), height.resolve(measured.height)))
    }

    fn measure_container(
        &mut self,
        diff: &mut DiffNode,
        stack: Stack,
        previous: Option<&DiffNode>,
    ) -> Result<(), ComponentError> {
        let node = diff.node.clone();
        let padding = node.props().padding();
        let previous = previous_children(previous);

        let mut children = Vec::with_capacity(node.child_count());
        for child in node.children() {
            let (width, height) = stack.child_specs(diff.width_spec, diff.height_spec, padding, child.props().margin());
            if let Some(measured) = self.measure(child, width, height, previous.get(child.global_key()).copied())? {
                children.push(measured);
            }
        }

        let placed: Vec<(Size, Edges)> = children
            .iter()
            .map(|child| (child.size, child.node.props().margin()))
            .collect();
        let mut positions = vec![Point::ZERO; children.len()];
        let content = stack.arrange(padding, &placed, &mut positions);
        for (child, position) in children.iter_mut().zip(positions) {
            child.position = position;
        }

        diff.size = Size::new(
            diff.width_spec.resolve(content.width),
            diff.height_spec.resolve(content.height),
        );
        diff.children = children;
        Ok(())
    }

    fn measure_holder(&mut self, diff: &mut DiffNode, previous: Option<&DiffNode>) -> Result<(), ComponentError> {
        let node = diff.node.clone();
        let (width, height) = (diff.width_spec, diff.height_spec);
        let holder_key = &node.tail().global_key;
        let previous_nested = previous.and_then(|previous| previous.nested.as_deref());

        let reusable = self.use_diffing
            && previous.is_some_and(|previous| {
                Arc::ptr_eq(&previous.node, &node) || previous.node.is_shallow_equivalent(&node)
            })
            && previous_nested.is_some_and(|nested| nested.width_spec == width && nested.height_spec == height)
            && !self.env.snapshot.has_pending_within(holder_key);
        if let (true, Some(previous), Some(nested)) = (reusable, previous, previous_nested) {
            trace!("layout: reusing nested tree of {}", holder_key);
            self.stats.reused += 1;
            let mut nested = nested.clone();
            if let Some(root) = nested.root.as_mut() {
                root.mark_unchanged();
            }
            diff.size = previous.size;
            diff.nested = Some(Box::new(nested));
            return Ok(());
        }

        self.stats.nested_resolves += 1;
        let previous_root = previous_nested.and_then(|nested| nested.root.as_ref());
        let resolved = resolve_nested(
            &node,
            width,
            height,
            previous_root.map(|root| &root.node),
            self.env,
        )?;
        let root = match resolved {
            Some(root) => self.measure_root(&root, width, height, previous_root)?,
            None => None,
        };

        let content = root.as_ref().map_or(Size::ZERO, outer_size);
        diff.size = Size::new(width.resolve(content.width), height.resolve(content.height));
        diff.nested = Some(Box::new(NestedTree {
            root,
            width_spec: width,
            height_spec: height,
        }));
        Ok(())
    }

    /// Offers `error` to the boundaries of the node's chain, tail first.
    ///
    /// A failure raised by the tail itself is not offered to the tail's own
    /// boundary. A handled error is replaced by the boundary's replacement,
    /// resolved and measured under the same specs.
    fn recover(
        &mut self,
        node: &Arc<ResolvedNode>,
        width: SizeSpec,
        height: SizeSpec,
        mut error: ComponentError,
    ) -> Result<Option<DiffNode>, ComponentError> {
        let own_failure = error.failing_component().is_none();
        let chain = node.chain();
        let tail = chain.len() - 1;

        for (index, scoped) in chain.iter().enumerate().rev() {
            error.push_frame(scoped.component.type_name());
            if index == tail && own_failure {
                continue;
            }
            match handle_with_boundary(&scoped.component, &scoped.global_key, error, self.env) {
                Ok(None) => return Ok(None),
                Ok(Some(replacement)) => {
                    let key = scoped.global_key.child(replacement.base_key());
                    let replaced = resolve_detached(&replacement, key, &scoped.global_key, node.tail_props(), self.env)
                        .map_err(|error| with_frames(error, &chain[..=index]))?;
                    let Some(replaced) = replaced else {
                        return Ok(None);
                    };
                    return self
                        .measure_node(&replaced, width, height, None)
                        .map(Some)
                        .map_err(|error| with_frames(error, &chain[..=index]));
                }
                Err(unhandled) => error = unhandled,
            }
        }
        Err(error)
    }
}

#[cfg(test)]
#[path = "tests/layout_tests.rs"]
mod tests;
