//! `ComponentTree`: the future scheduler and commit gate.
//!
//! A tree owns one root element, one pair of size specs and one
//! [`TreeState`]. Callers on any thread ask for a resolve or layout either
//! synchronously (the call returns once the result is committed) or
//! asynchronously (the work is posted to the configured executor).
//!
//! All requests go through versioned futures. An equivalent request that
//! arrives while a future is pending or running attaches to it instead of
//! starting new work; a synchronous caller that finds a pending async
//! future runs it on its own thread. Results are committed under the tree
//! lock and only if their version is newer than the committed one, so a
//! slow, older computation never overwrites a newer result.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};
use trellis_core::{
    resolve_tree, CancelToken, Element, FutureExecutionType, GlobalKey, RenderSource, ResolveInput, ResolveResult,
    StateUpdate, TreeError, TreeProps, TreeState, UpdateMode, VersionedFuture,
};
use trellis_ui_layout::{Size, SizeSpec};

use crate::config::TreeConfig;
use crate::layout::{compute_layout, LayoutEngine, LayoutInput};
use crate::layout_state::LayoutState;
use crate::listeners::{
    FutureExecution, FutureExecutionListener, FuturePhase, Listeners, NewLayoutStateReadyListener, TreeErrorListener,
};

type ResolveFuture = VersionedFuture<Arc<ResolveResult>>;
type LayoutFuture = VersionedFuture<Arc<LayoutState>>;

struct ResolveKey {
    root: Element,
    tree_props: TreeProps,
    state_seq: u64,
}

impl ResolveKey {
    fn is_equivalent_to(&self, other: &ResolveKey) -> bool {
        self.state_seq == other.state_seq && self.tree_props == other.tree_props && self.root.is_equivalent_to(&other.root)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct LayoutKey {
    resolve_version: u64,
    width: SizeSpec,
    height: SizeSpec,
}

/// Futures that callers may still attach to.
struct Registry<K, T> {
    entries: Vec<(K, Arc<VersionedFuture<T>>)>,
}

impl<K, T: Clone> Registry<K, T> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn find(&self, matches: impl Fn(&K) -> bool) -> Option<Arc<VersionedFuture<T>>> {
        self.entries
            .iter()
            .find(|(key, _)| matches(key))
            .map(|(_, future)| future.clone())
    }

    fn insert(&mut self, key: K, future: Arc<VersionedFuture<T>>) {
        self.entries.push((key, future));
    }

    /// Drops one holder and forgets the future once nobody holds it.
    fn release(&mut self, future: &Arc<VersionedFuture<T>>) {
        if future.release() == 0 {
            self.entries.retain(|(_, registered)| !Arc::ptr_eq(registered, future));
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

enum ResolveStep {
    /// The committed resolve already reflects the root, props and state.
    UpToDate,
    Run(Acquired<Arc<ResolveResult>>),
}

struct Acquired<T> {
    future: Arc<VersionedFuture<T>>,
    event: FutureExecution,
}

struct TreeData {
    root: Option<Element>,
    tree_props: TreeProps,
    width: Option<SizeSpec>,
    height: Option<SizeSpec>,
    resolve_version: u64,
    layout_version: u64,
    committed_resolve: Option<Arc<ResolveResult>>,
    committed_layout: Option<Arc<LayoutState>>,
    resolves: Registry<ResolveKey, Arc<ResolveResult>>,
    layouts: Registry<LayoutKey, Arc<LayoutState>>,
    pending_async: Option<CancelToken>,
    render_update_streak: usize,
    released: bool,
}

impl TreeData {
    fn new() -> Self {
        Self {
            root: None,
            tree_props: TreeProps::default(),
            width: None,
            height: None,
            resolve_version: 0,
            layout_version: 0,
            committed_resolve: None,
            committed_layout: None,
            resolves: Registry::new(),
            layouts: Registry::new(),
            pending_async: None,
            render_update_streak: 0,
            released: false,
        }
    }

    fn cancel_pending_async(&mut self) {
        if let Some(token) = self.pending_async.take() {
            token.cancel();
        }
    }
}

struct TreeInner {
    config: TreeConfig,
    tree_state: Arc<TreeState>,
    data: Mutex<TreeData>,
    listeners: Mutex<Listeners>,
}

/// A component tree shared between threads. Cloning is cheap and yields a
/// handle to the same tree.
#[derive(Clone)]
pub struct ComponentTree {
    inner: Arc<TreeInner>,
}

impl ComponentTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                config,
                tree_state: Arc::new(TreeState::new()),
                data: Mutex::new(TreeData::new()),
                listeners: Mutex::new(Listeners::default()),
            }),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.inner.config
    }

    pub fn tree_state(&self) -> &Arc<TreeState> {
        &self.inner.tree_state
    }

    pub fn add_layout_listener(&self, listener: impl NewLayoutStateReadyListener + 'static) {
        self.inner.listeners().layout.push(Arc::new(listener));
    }

    pub fn add_error_listener(&self, listener: impl TreeErrorListener + 'static) {
        self.inner.listeners().errors.push(Arc::new(listener));
    }

    pub fn add_future_execution_listener(&self, listener: impl FutureExecutionListener + 'static) {
        self.inner.listeners().futures.push(Arc::new(listener));
    }

    /// Replaces the root and blocks until the new tree is committed.
    pub fn set_root(&self, root: Element) -> Result<(), TreeError> {
        self.inner.update(|data| data.root = Some(root))?;
        self.inner.render(RenderSource::SetRootSync, None).map(drop)
    }

    pub fn set_root_async(&self, root: Element) -> Result<(), TreeError> {
        self.inner.post(RenderSource::SetRootAsync, |data| data.root = Some(root))
    }

    pub fn set_size_spec(&self, width: SizeSpec, height: SizeSpec) -> Result<(), TreeError> {
        self.inner.update(|data| {
            data.width = Some(width);
            data.height = Some(height);
        })?;
        self.inner.render(RenderSource::SetSizeSpecSync, None).map(drop)
    }

    pub fn set_size_spec_async(&self, width: SizeSpec, height: SizeSpec) -> Result<(), TreeError> {
        self.inner.post(RenderSource::SetSizeSpecAsync, |data| {
            data.width = Some(width);
            data.height = Some(height);
        })
    }

    pub fn set_root_and_size_spec(&self, root: Element, width: SizeSpec, height: SizeSpec) -> Result<(), TreeError> {
        self.inner.update(|data| {
            data.root = Some(root);
            data.width = Some(width);
            data.height = Some(height);
        })?;
        self.inner.render(RenderSource::SetRootSync, None).map(drop)
    }

    /// Tree props visible to the root. Applied with the next resolve.
    pub fn set_tree_props(&self, tree_props: TreeProps) -> Result<(), TreeError> {
        self.inner.update_quietly(|data| data.tree_props = tree_props)
    }

    /// Lays the root out for the given specs, commits the result and
    /// returns the root size.
    pub fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, TreeError> {
        self.inner.update(|data| {
            data.width = Some(width);
            data.height = Some(height);
        })?;
        let layout = self.inner.render(RenderSource::Measure, None)?;
        layout.map(|layout| layout.size()).ok_or(TreeError::NoRoot)
    }

    /// Returns the layout for the current root and specs, computing it if
    /// needed.
    pub fn layout(&self) -> Result<Arc<LayoutState>, TreeError> {
        {
            let data = self.inner.data()?;
            if data.root.is_none() {
                return Err(TreeError::NoRoot);
            }
            if data.width.is_none() || data.height.is_none() {
                return Err(TreeError::NoSizeSpec);
            }
        }
        self.inner
            .render(RenderSource::SetSizeSpecSync, None)?
            .ok_or(TreeError::NoRoot)
    }

    /// Queues `update` and resolves on this thread before returning.
    pub fn update_state_sync(&self, key: &GlobalKey, update: StateUpdate) -> Result<(), TreeError> {
        self.inner.update(|_| ())?;
        self.inner.tree_state.enqueue_update(key.clone(), update);
        self.inner.render(RenderSource::UpdateStateSync, None).map(drop)
    }

    /// Queues `update` and resolves on the executor.
    pub fn update_state_async(&self, key: &GlobalKey, update: StateUpdate) -> Result<(), TreeError> {
        let tree_state = self.inner.tree_state.clone();
        let key = key.clone();
        self.inner.post(RenderSource::UpdateStateAsync, move |_| {
            tree_state.enqueue_update(key, update);
        })
    }

    /// Queues `update` without scheduling anything; it is applied by the
    /// next resolve, whatever triggers it.
    pub fn update_state_lazy(&self, key: &GlobalKey, update: StateUpdate) -> Result<(), TreeError> {
        if self.is_released() {
            return Err(TreeError::Released);
        }
        self.inner.tree_state.enqueue_update(key.clone(), update);
        Ok(())
    }

    /// Queues `update` and delivers it the way `mode` asks for.
    pub fn update_state(&self, key: &GlobalKey, update: StateUpdate, mode: UpdateMode) -> Result<(), TreeError> {
        match mode {
            UpdateMode::Lazy => self.update_state_lazy(key, update),
            UpdateMode::Sync => self.update_state_sync(key, update),
            UpdateMode::Async => self.update_state_async(key, update),
        }
    }

    pub fn root(&self) -> Option<Element> {
        self.inner.data().ok().and_then(|data| data.root.clone())
    }

    pub fn committed_resolve(&self) -> Option<Arc<ResolveResult>> {
        self.inner.data().ok().and_then(|data| data.committed_resolve.clone())
    }

    pub fn committed_layout(&self) -> Option<Arc<LayoutState>> {
        self.inner.data().ok().and_then(|data| data.committed_layout.clone())
    }

    /// Committed state of the component at `key`.
    pub fn committed_state<T: Send + Sync + 'static>(&self, key: &GlobalKey) -> Option<Arc<T>> {
        self.inner.tree_state.committed::<T>(key)
    }

    pub fn is_released(&self) -> bool {
        self.inner.data().is_err()
    }

    /// Tears the tree down. Queued async work is cancelled and every later
    /// call fails with [`TreeError::Released`].
    pub fn release(&self) {
        {
            let mut data = self.inner.lock();
            if data.released {
                return;
            }
            data.released = true;
            data.cancel_pending_async();
            data.resolves.clear();
            data.layouts.clear();
            data.committed_resolve = None;
            data.committed_layout = None;
            data.root = None;
        }
        self.inner.tree_state.clear();
        debug!("component tree released");
    }
}

impl TreeInner {
    fn lock(&self) -> MutexGuard<'_, TreeData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn data(&self) -> Result<MutexGuard<'_, TreeData>, TreeError> {
        let data = self.lock();
        if data.released {
            return Err(TreeError::Released);
        }
        Ok(data)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` for a synchronous request, which supersedes any
    /// queued async request.
    fn update(&self, change: impl FnOnce(&mut TreeData)) -> Result<(), TreeError> {
        let mut data = self.data()?;
        data.cancel_pending_async();
        change(&mut data);
        Ok(())
    }

    fn update_quietly(&self, change: impl FnOnce(&mut TreeData)) -> Result<(), TreeError> {
        change(&mut *self.data()?);
        Ok(())
    }

    /// Applies `change` and posts the render to the executor.
    ///
    /// The resolve future is registered right away so that a synchronous
    /// caller arriving before the task starts can take it over.
    fn post(self: &Arc<Self>, source: RenderSource, change: impl FnOnce(&mut TreeData)) -> Result<(), TreeError> {
        let token = CancelToken::new();
        let step = {
            let mut data = self.data()?;
            data.cancel_pending_async();
            data.pending_async = Some(token.clone());
            change(&mut data);
            self.prepare_resolve(&mut data, source)
        };
        let registered = match step {
            Some(ResolveStep::Run(acquired)) => {
                self.report(acquired.event);
                Some(acquired.future)
            }
            _ => None,
        };

        let inner = self.clone();
        self.config.executor.execute(Box::new(move || {
            if token.is_cancelled() {
                trace!("{source:?}: superseded before it started");
                if let Some(future) = &registered {
                    inner.lock().resolves.release(future);
                }
                return;
            }
            let result = inner.render(source, registered);
            {
                let mut data = inner.lock();
                if data.pending_async.as_ref().is_some_and(|pending| pending.same_token(&token)) {
                    data.pending_async = None;
                }
            }
            if let Err(error) = result {
                inner.report_error(&error, source);
            }
        }));
        Ok(())
    }

    /// Resolves and lays out until no render pass enqueues further state
    /// updates. Returns the layout for the specs current when the layout
    /// was requested, or `None` when there is nothing to lay out.
    fn render(
        &self,
        source: RenderSource,
        mut registered: Option<Arc<ResolveFuture>>,
    ) -> Result<Option<Arc<LayoutState>>, TreeError> {
        loop {
            let future = match registered.take() {
                Some(future) => Some(future),
                None => {
                    let step = {
                        let mut data = self.data()?;
                        self.prepare_resolve(&mut data, source)
                    };
                    match step {
                        None => return Ok(None),
                        Some(ResolveStep::UpToDate) => None,
                        Some(ResolveStep::Run(acquired)) => {
                            self.report(acquired.event);
                            Some(acquired.future)
                        }
                    }
                }
            };

            let resolve_updates = match future {
                Some(future) => self.run_resolve(&future, source)?,
                None => 0,
            };
            let (layout, layout_updates) = self.layout(source)?;
            let updates = resolve_updates + layout_updates;
            if !self.track_render_updates(updates) {
                return Ok(layout);
            }
            trace!("{source:?}: {updates} state updates during render, resolving again");
        }
    }

    /// Decides how the current root gets resolved. `None` without a root.
    fn prepare_resolve(&self, data: &mut TreeData, source: RenderSource) -> Option<ResolveStep> {
        let root = data.root.as_ref()?;
        let up_to_date = self.config.reconciliation_enabled
            && !self.tree_state.has_pending_updates()
            && data.committed_resolve.as_ref().is_some_and(|committed| {
                committed.tree_props() == &data.tree_props && committed.element().is_equivalent_to(root)
            });
        if up_to_date {
            trace!("{source:?}: committed resolve is up to date");
            return Some(ResolveStep::UpToDate);
        }
        self.acquire_resolve(data, source).map(ResolveStep::Run)
    }

    /// Waits for `future`, commits its result and returns the state updates
    /// its render enqueued, or 0 if the result was discarded.
    fn run_resolve(&self, future: &Arc<ResolveFuture>, source: RenderSource) -> Result<usize, TreeError> {
        let resolved = match future.run_and_get() {
            Ok(resolved) => resolved,
            Err(error) => {
                self.lock().resolves.release(future);
                return Err(error);
            }
        };
        let committed = self.commit_resolve(future, &resolved, source)?;
        Ok(if committed { resolved.state_updates_in_render() } else { 0 })
    }

    fn acquire_resolve(&self, data: &mut TreeData, source: RenderSource) -> Option<Acquired<Arc<ResolveResult>>> {
        let root = data.root.clone()?;
        let key = ResolveKey {
            root,
            tree_props: data.tree_props.clone(),
            state_seq: self.tree_state.latest_seq(),
        };

        if self.config.reuse_futures {
            if let Some(future) = data.resolves.find(|registered| registered.is_equivalent_to(&key)) {
                future.acquire();
                trace!("{source:?}: joining resolve v{} ({:?})", future.version(), future.source());
                return Some(Acquired {
                    event: execution(FuturePhase::Resolve, FutureExecutionType::ReuseFuture, source, future.version()),
                    future,
                });
            }
        }

        data.resolve_version += 1;
        let version = data.resolve_version;
        let input = ResolveInput::new(key.root.clone(), self.tree_state.clone())
            .tree_props(key.tree_props.clone())
            .previous(data.committed_resolve.clone())
            .version(version)
            .reconcile(self.config.reconciliation_enabled)
            .measurer(Some(LayoutEngine::shared()));
        let future: Arc<ResolveFuture> = Arc::new(VersionedFuture::new(version, source, move || {
            resolve_tree(input).map(Arc::new).map_err(TreeError::from)
        }));
        future.acquire();
        data.resolves.insert(key, future.clone());
        trace!("{source:?}: new resolve v{version}");
        Some(Acquired {
            event: execution(FuturePhase::Resolve, FutureExecutionType::NewFuture, source, version),
            future,
        })
    }

    /// Commits `resolved` and releases the future that produced it under one
    /// lock, so an equivalent request sees either the future or the commit.
    fn commit_resolve(
        &self,
        future: &Arc<ResolveFuture>,
        resolved: &Arc<ResolveResult>,
        source: RenderSource,
    ) -> Result<bool, TreeError> {
        let mut data = self.lock();
        data.resolves.release(future);
        if data.released {
            return Err(TreeError::Released);
        }
        let committed = data.committed_resolve.as_ref().map_or(0, |committed| committed.version());
        if data.committed_resolve.is_some() && resolved.version() <= committed {
            debug!(
                "{source:?}: discarding resolve v{}, v{committed} is already committed",
                resolved.version()
            );
            return Ok(false);
        }
        self.tree_state.commit_resolve(resolved.local_state());
        data.committed_resolve = Some(resolved.clone());
        debug!(
            "{source:?}: committed resolve v{}{}",
            resolved.version(),
            if resolved.is_reused() { " (reused)" } else { "" }
        );
        Ok(true)
    }

    /// Lays out the committed resolve for the current specs, unless the
    /// committed layout already covers them. Also returns the state updates
    /// a committed new layout enqueued from nested renders.
    fn layout(&self, source: RenderSource) -> Result<(Option<Arc<LayoutState>>, usize), TreeError> {
        let acquired = {
            let mut data = self.data()?;
            let (Some(width), Some(height)) = (data.width, data.height) else {
                return Ok((None, 0));
            };
            let Some(resolve) = data.committed_resolve.clone() else {
                return Ok((None, 0));
            };
            let key = LayoutKey {
                resolve_version: resolve.version(),
                width,
                height,
            };
            if let Some(layout) = data.committed_layout.as_ref().filter(|layout| {
                layout.resolve_version() == key.resolve_version
                    && layout.width_spec() == width
                    && layout.height_spec() == height
            }) {
                return Ok((Some(layout.clone()), 0));
            }
            self.acquire_layout(&mut data, key, resolve, source)
        };
        self.report(acquired.event);

        let future = acquired.future;
        let layout = match future.run_and_get() {
            Ok(layout) => layout,
            Err(error) => {
                self.lock().layouts.release(&future);
                return Err(error);
            }
        };
        let updates = if self.commit_layout(&future, &layout, source)? {
            layout.state_updates_in_render()
        } else {
            0
        };
        Ok((Some(layout), updates))
    }

    fn acquire_layout(
        &self,
        data: &mut TreeData,
        key: LayoutKey,
        resolve: Arc<ResolveResult>,
        source: RenderSource,
    ) -> Acquired<Arc<LayoutState>> {
        if self.config.reuse_futures {
            if let Some(future) = data.layouts.find(|registered| *registered == key) {
                future.acquire();
                trace!("{source:?}: joining layout v{} ({:?})", future.version(), future.source());
                return Acquired {
                    event: execution(FuturePhase::Layout, FutureExecutionType::ReuseFuture, source, future.version()),
                    future,
                };
            }
        }

        data.layout_version += 1;
        let version = data.layout_version;
        let input = LayoutInput::new(resolve, self.tree_state.clone(), key.width, key.height)
            .previous(data.committed_layout.clone())
            .version(version)
            .use_diffing(self.config.use_diffing)
            .reconcile(self.config.reconciliation_enabled);
        let future: Arc<LayoutFuture> = Arc::new(VersionedFuture::new(version, source, move || {
            compute_layout(input).map(Arc::new).map_err(TreeError::from)
        }));
        future.acquire();
        data.layouts.insert(key, future.clone());
        trace!("{source:?}: new layout v{version}");
        Acquired {
            event: execution(FuturePhase::Layout, FutureExecutionType::NewFuture, source, version),
            future,
        }
    }

    fn commit_layout(
        &self,
        future: &Arc<LayoutFuture>,
        layout: &Arc<LayoutState>,
        source: RenderSource,
    ) -> Result<bool, TreeError> {
        {
            let mut data = self.lock();
            data.layouts.release(future);
            if data.released {
                return Err(TreeError::Released);
            }
            if let Some(committed) = &data.committed_layout {
                if layout.version() <= committed.version() || layout.resolve_version() < committed.resolve_version() {
                    debug!(
                        "{source:?}: discarding layout v{}, v{} is already committed",
                        layout.version(),
                        committed.version()
                    );
                    return Ok(false);
                }
            }
            self.tree_state.commit_nested(layout.nested_local_state());
            data.committed_layout = Some(layout.clone());
            debug!(
                "{source:?}: committed layout v{} of resolve v{}",
                layout.version(),
                layout.resolve_version()
            );
        }

        let listeners = self.listeners().layout.clone();
        for listener in listeners {
            listener.on_new_layout_state_ready(layout, source);
        }
        Ok(true)
    }

    /// Records whether the last pass enqueued state updates from render.
    /// Returns true when another pass is needed.
    fn track_render_updates(&self, updates: usize) -> bool {
        let streak = {
            let mut data = self.lock();
            if updates == 0 {
                data.render_update_streak = 0;
                return false;
            }
            data.render_update_streak += 1;
            data.render_update_streak
        };
        let threshold = self.config.state_update_loop_threshold;
        if streak > threshold {
            panic!(
                "state update loop: components kept updating state while rendering for more than {threshold} \
                 consecutive passes"
            );
        }
        true
    }

    fn report(&self, event: FutureExecution) {
        let listeners = self.listeners().futures.clone();
        for listener in listeners {
            listener.on_future_execution(&event);
        }
    }

    fn report_error(&self, error: &TreeError, source: RenderSource) {
        warn!("{source:?} failed: {error}");
        let listeners = self.listeners().errors.clone();
        for listener in listeners {
            listener.on_error(error, source);
        }
    }
}

fn execution(phase: FuturePhase, execution: FutureExecutionType, source: RenderSource, version: u64) -> FutureExecution {
    FutureExecution {
        phase,
        execution,
        source,
        version,
    }
}

#[cfg(test)]
#[path = "tests/tree_tests.rs"]
mod tests;
