//! The resolver: components plus tree state in, [`ResolvedNode`] tree out.
//!
//! A resolve walks the element tree top-down. For every element it either
//! reuses the node the previous committed resolve produced under the same
//! global key (when the element is equivalent, tree props are unchanged
//! and no state update is queued anywhere inside it) or runs the
//! component's lifecycle: initial state, queued updates, tree props and
//! render. Composites are followed through their delegates so that one
//! node covers a whole delegation chain.
//!
//! Nothing in here touches committed state. Every state value the pass
//! computes goes into a [`LocalState`] that the caller commits together
//! with the node tree, or drops.

use std::any::Any;
use std::sync::Arc;

use log::{debug, trace, warn};
use smallvec::SmallVec;
use trellis_ui_layout::{LayoutProps, Size, SizeSpec};

use crate::collections::map::HashMap;
use crate::component::{Component, ComponentKind, ErrorDisposition, ErrorScope, InitialStateScope};
use crate::element::{Element, EventHandler, TransitionId};
use crate::error::{ComponentError, LifecyclePhase};
use crate::key::{DiagnosticKind, GlobalKey, KeyDiagnostic, SiblingKeys};
use crate::node::{NodeKind, ResolvedNode, ScopedComponent};
use crate::result_cache::ResultCache;
use crate::state::{LocalState, StateSnapshot, StateUpdate, StateValue, TreeState};
use crate::tree_props::TreeProps;

/// Measures resolved subtrees on behalf of the resolver.
///
/// Implemented by the layout engine; lets [`RenderScope::measure`] and
/// nested trees lay out content in the middle of a resolve.
pub trait MeasureDelegate: Send + Sync {
    fn measure(
        &self,
        node: &Arc<ResolvedNode>,
        width: SizeSpec,
        height: SizeSpec,
        env: &mut NestedEnv,
    ) -> Result<Size, ComponentError>;
}

/// Everything a resolve needs besides the elements themselves, plus the
/// side effects it accumulates.
pub struct NestedEnv {
    pub tree_state: Arc<TreeState>,
    pub snapshot: Arc<StateSnapshot>,
    pub local: LocalState,
    pub diagnostics: Vec<KeyDiagnostic>,
    /// State updates enqueued from render or error callbacks.
    pub state_updates_in_render: usize,
    pub reconcile: bool,
    pub measurer: Option<Arc<dyn MeasureDelegate>>,
}

impl NestedEnv {
    pub fn new(
        tree_state: Arc<TreeState>,
        snapshot: Arc<StateSnapshot>,
        reconcile: bool,
        measurer: Option<Arc<dyn MeasureDelegate>>,
    ) -> Self {
        let local = LocalState::new(snapshot.seq());
        Self {
            tree_state,
            snapshot,
            local,
            diagnostics: Vec::new(),
            state_updates_in_render: 0,
            reconcile,
            measurer,
        }
    }

    /// A fresh env sharing this one's inputs.
    pub fn scratch(&self) -> Self {
        Self::new(
            self.tree_state.clone(),
            self.snapshot.clone(),
            self.reconcile,
            self.measurer.clone(),
        )
    }

    /// Takes over the diagnostics and render-update count of `other`,
    /// leaving its states alone.
    pub fn absorb_side_effects(&mut self, other: &mut NestedEnv) {
        self.diagnostics.append(&mut other.diagnostics);
        self.state_updates_in_render += std::mem::take(&mut other.state_updates_in_render);
    }
}

/// Inputs of a top-level resolve.
pub struct ResolveInput {
    pub root: Element,
    pub tree_props: TreeProps,
    pub tree_state: Arc<TreeState>,
    pub previous: Option<Arc<ResolveResult>>,
    pub version: u64,
    pub reconcile: bool,
    pub measurer: Option<Arc<dyn MeasureDelegate>>,
}

impl ResolveInput {
    pub fn new(root: Element, tree_state: Arc<TreeState>) -> Self {
        Self {
            root,
            tree_props: TreeProps::default(),
            tree_state,
            previous: None,
            version: 0,
            reconcile: true,
            measurer: None,
        }
    }

    pub fn tree_props(mut self, tree_props: TreeProps) -> Self {
        self.tree_props = tree_props;
        self
    }

    pub fn previous(mut self, previous: Option<Arc<ResolveResult>>) -> Self {
        self.previous = previous;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn reconcile(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }

    pub fn measurer(mut self, measurer: Option<Arc<dyn MeasureDelegate>>) -> Self {
        self.measurer = measurer;
        self
    }
}

/// Output of a resolve: the node tree and the state it was computed with.
#[derive(Debug)]
pub struct ResolveResult {
    root: Option<Arc<ResolvedNode>>,
    element: Element,
    tree_props: TreeProps,
    local: LocalState,
    version: u64,
    diagnostics: Vec<KeyDiagnostic>,
    state_updates_in_render: usize,
    reused: bool,
}

impl ResolveResult {
    pub fn root(&self) -> Option<&Arc<ResolvedNode>> {
        self.root.as_ref()
    }

    /// The root element this result was resolved from.
    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn tree_props(&self) -> &TreeProps {
        &self.tree_props
    }

    pub fn local_state(&self) -> &LocalState {
        &self.local
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn diagnostics(&self) -> &[KeyDiagnostic] {
        &self.diagnostics
    }

    pub fn state_updates_in_render(&self) -> usize {
        self.state_updates_in_render
    }

    /// True when the whole previous tree was reused without rendering.
    pub fn is_reused(&self) -> bool {
        self.reused
    }
}

/// Resolves `input.root` against the current tree state.
pub fn resolve_tree(input: ResolveInput) -> Result<ResolveResult, ComponentError> {
    let snapshot = Arc::new(input.tree_state.snapshot());

    if let Some(previous) = input.previous.as_ref().filter(|previous| {
        input.reconcile
            && !snapshot.has_pending()
            && previous.tree_props == input.tree_props
            && previous.element.is_equivalent_to(&input.root)
    }) {
        trace!("resolve v{}: nothing changed, reusing v{}", input.version, previous.version);
        let mut local = LocalState::new(snapshot.seq());
        local.states = previous.local.states.clone();
        local.holders = previous.local.holders.clone();
        return Ok(ResolveResult {
            root: previous.root.clone(),
            element: input.root,
            tree_props: input.tree_props,
            local,
            version: input.version,
            diagnostics: Vec::new(),
            state_updates_in_render: 0,
            reused: true,
        });
    }

    let mut env = NestedEnv::new(input.tree_state.clone(), snapshot, input.reconcile, input.measurer.clone());
    let key = GlobalKey::root(input.root.base_key());
    let previous_root = input.previous.as_ref().and_then(|previous| previous.root.clone());
    let root = ResolveContext::new(&mut env).resolve_element(
        &input.root,
        key.clone(),
        &key,
        &input.tree_props,
        previous_root.as_ref(),
    )?;

    Ok(ResolveResult {
        root,
        element: input.root,
        tree_props: input.tree_props,
        local: env.local,
        version: input.version,
        diagnostics: env.diagnostics,
        state_updates_in_render: env.state_updates_in_render,
        reused: false,
    })
}

/// Resolves the content of a nested-tree holder for concrete size specs.
///
/// `previous` is the nested root the holder produced last time, used for
/// subtree reuse. States go into `env.local` under the holder's key.
pub fn resolve_nested(
    holder: &ResolvedNode,
    width: SizeSpec,
    height: SizeSpec,
    previous: Option<&Arc<ResolvedNode>>,
    env: &mut NestedEnv,
) -> Result<Option<Arc<ResolvedNode>>, ComponentError> {
    let tail = holder.tail();
    let ComponentKind::SizeDependent(component) = tail.component.kind() else {
        return Err(ComponentError::new(format!(
            "{} is not size dependent",
            tail.component.type_name()
        )));
    };
    let key = &tail.global_key;

    let mut ctx = ResolveContext::new(env);
    ctx.env.local.add_holder(key.clone());
    let state = ctx.state_for(key, &tail.component, &holder.tail_props)?;
    let rendered = {
        let mut scope = RenderScope::new(&mut ctx, key, state, &holder.tail_props);
        component.render_with_size(&mut scope, width, height)
    }
    .map_err(|error| error.in_phase(LifecyclePhase::Render))?;

    let Some(element) = rendered else {
        return Ok(None);
    };
    let child_props = tail
        .component
        .provide_tree_props(&holder.tail_props)
        .unwrap_or_else(|| holder.tail_props.clone());
    let root_key = key.child(element.base_key());
    ctx.resolve_element(&element, root_key, key, &child_props, previous)
}

/// Resolves a standalone element, e.g. an error boundary's replacement.
pub fn resolve_detached(
    element: &Element,
    key: GlobalKey,
    owner: &GlobalKey,
    tree_props: &TreeProps,
    env: &mut NestedEnv,
) -> Result<Option<Arc<ResolvedNode>>, ComponentError> {
    ResolveContext::new(env).resolve_element(element, key, owner, tree_props, None)
}

/// Asks the boundary of `component`, if any, to handle `error`.
///
/// Returns the replacement on success and the error back when it was not
/// handled.
pub fn handle_with_boundary(
    component: &Arc<dyn Component>,
    key: &GlobalKey,
    error: ComponentError,
    env: &mut NestedEnv,
) -> Result<Option<Element>, ComponentError> {
    let Some(boundary) = component.error_boundary() else {
        return Err(error);
    };
    let mut scope = ErrorScope::new(key, &env.tree_state, &mut env.state_updates_in_render);
    match boundary.on_error(&mut scope, &error) {
        ErrorDisposition::Handled { replacement } => {
            debug!("{} handled error: {}", key, error);
            Ok(replacement)
        }
        ErrorDisposition::Propagate => Err(error),
    }
}

#[derive(Clone)]
struct ChainAcc {
    head: Option<Element>,
    chain: SmallVec<[ScopedComponent; 2]>,
    props: LayoutProps,
    handlers: SmallVec<[EventHandler; 1]>,
    transition: Option<TransitionId>,
    inherited: TreeProps,
}

impl ChainAcc {
    fn new(inherited: &TreeProps) -> Self {
        Self {
            head: None,
            chain: SmallVec::new(),
            props: LayoutProps::default(),
            handlers: SmallVec::new(),
            transition: None,
            inherited: inherited.clone(),
        }
    }

    fn absorb(&mut self, element: &Element, owner: &GlobalKey) {
        if self.head.is_none() {
            self.head = Some(element.clone());
        }
        self.props = element.props().merged_with(&self.props);
        self.handlers.extend(element.handlers().iter().cloned());
        if self.transition.is_none() {
            self.transition = element
                .transition()
                .map(|transition| TransitionId::resolve(transition, owner));
        }
    }

    fn build(
        self,
        kind: NodeKind,
        tail_props: TreeProps,
        children: Vec<Arc<ResolvedNode>>,
    ) -> Result<Arc<ResolvedNode>, ComponentError> {
        let element = self
            .head
            .ok_or_else(|| ComponentError::new("node built without a head element"))?;
        Ok(Arc::new(ResolvedNode {
            chain: self.chain,
            element,
            kind,
            props: self.props,
            handlers: self.handlers,
            transition: self.transition,
            inherited_props: self.inherited,
            tail_props,
            children,
        }))
    }
}

fn with_frame(mut error: ComponentError, component: &dyn Component) -> ComponentError {
    error.push_frame(component.type_name());
    error
}

pub(crate) struct ResolveContext<'e> {
    env: &'e mut NestedEnv,
    cache: ResultCache,
}

impl<'e> ResolveContext<'e> {
    pub(crate) fn new(env: &'e mut NestedEnv) -> Self {
        Self {
            env,
            cache: ResultCache::new(),
        }
    }

    fn resolve_element(
        &mut self,
        element: &Element,
        key: GlobalKey,
        owner: &GlobalKey,
        inherited: &TreeProps,
        previous: Option<&Arc<ResolvedNode>>,
    ) -> Result<Option<Arc<ResolvedNode>>, ComponentError> {
        let previous = previous.filter(|previous| previous.global_key() == &key);
        if let Some(previous) = previous {
            if self.can_reuse(previous, element, inherited) {
                trace!("reusing subtree at {}", key);
                self.carry_states(previous);
                return Ok(Some(previous.clone()));
            }
        }
        if let Some((node, local)) = self.cache.take_node(element.component(), &key) {
            self.env.local.merge(local);
            return Ok(node);
        }
        self.resolve_chain(element, key, owner, ChainAcc::new(inherited), inherited, previous)
    }

    fn can_reuse(&self, previous: &ResolvedNode, element: &Element, inherited: &TreeProps) -> bool {
        self.env.reconcile
            && previous.inherited_props == *inherited
            && previous.element.is_equivalent_to(element)
            && !self.env.snapshot.has_pending_within(previous.global_key())
    }

    fn carry_states(&mut self, node: &ResolvedNode) {
        let snapshot = &self.env.snapshot;
        let local = &mut self.env.local;
        node.visit(&mut |node| {
            for scoped in node.chain() {
                if scoped.stateful {
                    if let Some(value) = snapshot.committed(&scoped.global_key) {
                        local.insert(scoped.global_key.clone(), value.clone());
                    }
                }
            }
            if node.is_nested_tree_holder() {
                local.add_holder(node.tail().global_key.clone());
            }
        });
    }

    fn resolve_chain(
        &mut self,
        element: &Element,
        key: GlobalKey,
        owner: &GlobalKey,
        mut acc: ChainAcc,
        tree_props: &TreeProps,
        previous: Option<&Arc<ResolvedNode>>,
    ) -> Result<Option<Arc<ResolvedNode>>, ComponentError> {
        let component = element.component().clone();
        acc.absorb(element, owner);

        let kind = component.kind();
        let state = match kind {
            // size-dependent state is owned by the nested tree
            ComponentKind::SizeDependent(_) => None,
            _ => self
                .state_for(&key, &component, tree_props)
                .map_err(|error| with_frame(error, component.as_ref()))?,
        };
        let child_props = component
            .provide_tree_props(tree_props)
            .unwrap_or_else(|| tree_props.clone());
        acc.chain.push(ScopedComponent {
            component: component.clone(),
            global_key: key.clone(),
            stateful: state.is_some(),
        });

        match kind {
            ComponentKind::Composite(composite) => {
                let rendered = {
                    let mut scope = RenderScope::new(self, &key, state, tree_props);
                    composite.render(&mut scope)
                }
                .map_err(|error| with_frame(error.in_phase(LifecyclePhase::Render), component.as_ref()))?;
                let Some(delegate) = rendered else {
                    return Ok(None);
                };

                let delegate_key = key.child(delegate.base_key());
                match self.resolve_chain(&delegate, delegate_key.clone(), &key, acc.clone(), &child_props, previous) {
                    Ok(node) => Ok(node),
                    Err(error) => {
                        let error = with_frame(error, component.as_ref());
                        let replacement = handle_with_boundary(&component, &key, error, self.env)?;
                        self.env.local.discard_subtree(&delegate_key);
                        match replacement {
                            Some(replacement) => {
                                let replacement_key = key.child(replacement.base_key());
                                self.resolve_chain(&replacement, replacement_key, &key, acc, &child_props, None)
                                    .map_err(|error| with_frame(error, component.as_ref()))
                            }
                            None => Ok(None),
                        }
                    }
                }
            }
            ComponentKind::Container(container) => {
                let stack = container.stack();
                let elements = {
                    let mut scope = RenderScope::new(self, &key, state, tree_props);
                    container.children(&mut scope)
                }
                .map_err(|error| with_frame(error.in_phase(LifecyclePhase::Render), component.as_ref()))?;

                let children = match self.resolve_children(&key, &elements, &child_props, previous) {
                    Ok(children) => children,
                    Err(error) => {
                        let error = with_frame(error, component.as_ref());
                        let replacement = handle_with_boundary(&component, &key, error, self.env)?;
                        self.env.local.discard_descendants(&key);
                        match replacement {
                            Some(replacement) => {
                                let replacement_key = key.child(replacement.base_key());
                                self.resolve_element(&replacement, replacement_key, &key, &child_props, None)
                                    .map_err(|error| with_frame(error, component.as_ref()))?
                                    .into_iter()
                                    .collect()
                            }
                            None => Vec::new(),
                        }
                    }
                };
                acc.build(NodeKind::Container(stack), tree_props.clone(), children).map(Some)
            }
            ComponentKind::Primitive(_) => acc.build(NodeKind::Primitive, tree_props.clone(), Vec::new()).map(Some),
            ComponentKind::SizeDependent(_) => {
                self.env.local.add_holder(key);
                acc.build(NodeKind::NestedTreeHolder, tree_props.clone(), Vec::new()).map(Some)
            }
        }
    }

    fn resolve_children(
        &mut self,
        parent: &GlobalKey,
        elements: &[Element],
        tree_props: &TreeProps,
        previous: Option<&Arc<ResolvedNode>>,
    ) -> Result<Vec<Arc<ResolvedNode>>, ComponentError> {
        let previous_children: HashMap<&GlobalKey, &Arc<ResolvedNode>> = previous
            .map(|previous| {
                previous
                    .children
                    .iter()
                    .map(|child| (child.global_key(), child))
                    .collect()
            })
            .unwrap_or_default();

        let mut keys = SiblingKeys::new();
        let mut children = Vec::with_capacity(elements.len());
        for element in elements {
            let (key, diagnostic) = keys.assign(Some(parent), element.base_key(), element.explicit_key().is_some());
            if let Some(diagnostic) = diagnostic {
                self.report(diagnostic);
            }
            let previous = previous_children.get(&key).copied();
            if let Some(node) = self.resolve_element(element, key, parent, tree_props, previous)? {
                children.push(node);
            }
        }
        Ok(children)
    }

    fn report(&mut self, diagnostic: KeyDiagnostic) {
        match diagnostic.kind {
            DiagnosticKind::DuplicateExplicitKey => warn!("{diagnostic}"),
            DiagnosticKind::DuplicateTypeKey => trace!("{diagnostic}"),
        }
        self.env.diagnostics.push(diagnostic);
    }

    /// Computes the state `component` renders with: committed (or initial)
    /// value folded with every queued update for `key`, in enqueue order.
    fn state_for(
        &mut self,
        key: &GlobalKey,
        component: &Arc<dyn Component>,
        tree_props: &TreeProps,
    ) -> Result<Option<StateValue>, ComponentError> {
        let snapshot = self.env.snapshot.clone();
        let mut value = match snapshot.committed(key) {
            Some(value) => Some(value.clone()),
            None => match self.env.tree_state.initial_state(key) {
                Some(value) => Some(value),
                None => {
                    let scope = InitialStateScope {
                        global_key: key,
                        tree_props,
                    };
                    component
                        .create_initial_state(&scope)
                        .map_err(|error| error.in_phase(LifecyclePhase::InitialState))?
                        .map(|created| self.env.tree_state.initial_state_or_insert(key, created))
                }
            },
        };

        for pending in snapshot.pending_for(key) {
            value = Some(pending.update.apply(value.as_ref())?);
            self.env.local.mark_applied(key, pending.seq);
        }

        if let Some(value) = &value {
            self.env.local.insert(key.clone(), value.clone());
        }
        Ok(value)
    }
}

/// What a component sees while it renders.
pub struct RenderScope<'s, 'e> {
    ctx: &'s mut ResolveContext<'e>,
    key: &'s GlobalKey,
    state: Option<StateValue>,
    tree_props: &'s TreeProps,
}

impl<'s, 'e> RenderScope<'s, 'e> {
    fn new(
        ctx: &'s mut ResolveContext<'e>,
        key: &'s GlobalKey,
        state: Option<StateValue>,
        tree_props: &'s TreeProps,
    ) -> Self {
        Self {
            ctx,
            key,
            state,
            tree_props,
        }
    }

    pub fn global_key(&self) -> &GlobalKey {
        self.key
    }

    /// The component's state after all queued updates were applied.
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.as_ref()?.downcast_ref::<T>()
    }

    pub fn tree_prop<T: Any>(&self) -> Option<&T> {
        self.tree_props.get::<T>()
    }

    pub fn tree_props(&self) -> &TreeProps {
        self.tree_props
    }

    /// Queues an update for this component and requests a follow-up resolve.
    pub fn update_state(&mut self, update: StateUpdate) {
        self.ctx.env.tree_state.enqueue_update(self.key.clone(), update);
        self.ctx.env.state_updates_in_render += 1;
    }

    /// Queues an update without requesting a resolve.
    pub fn update_state_lazy(&mut self, update: StateUpdate) {
        self.ctx.env.tree_state.enqueue_update(self.key.clone(), update);
    }

    /// Resolves and measures `element` as if it were a child of this
    /// component.
    ///
    /// The resolved node is kept for the rest of the pass; returning the
    /// same element instance as a child afterwards reuses it. Repeated
    /// calls with the same specs do not measure again.
    pub fn measure(&mut self, element: &Element, width: SizeSpec, height: SizeSpec) -> Result<Size, ComponentError> {
        let component = element.component().clone();
        if let Some(size) = self.ctx.cache.size(&component, width, height) {
            return Ok(size);
        }
        let measurer = self.ctx.env.measurer.clone().ok_or_else(|| {
            ComponentError::new("measure is unavailable without a layout engine").in_phase(LifecyclePhase::Measure)
        })?;

        let mut scratch = self.ctx.env.scratch();
        let cached = self.ctx.cache.node(&component).map(|(_, node)| node.cloned());
        let was_cached = cached.is_some();
        let key = self.key.child(element.base_key());
        let node = match cached {
            Some(node) => node,
            None => ResolveContext::new(&mut scratch).resolve_element(element, key.clone(), self.key, self.tree_props, None)?,
        };
        let size = match &node {
            Some(node) => measurer.measure(node, width, height, &mut scratch)?,
            None => Size::ZERO,
        };
        self.ctx.env.absorb_side_effects(&mut scratch);
        if !was_cached {
            self.ctx.cache.insert_node(&component, key, node, scratch.local);
        }
        self.ctx.cache.insert_size(&component, width, height, size);
        Ok(size)
    }
}

#[cfg(test)]
#[path = "tests/resolve_tests.rs"]
mod tests;
