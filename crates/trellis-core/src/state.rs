//! Per-tree state storage and the pending update queue.
//!
//! [`TreeState`] is the only cross-thread mutable structure in a tree. It
//! is mutated in exactly two ways: callers enqueue updates, and resolve or
//! layout commits fold a [`LocalState`] back in. Both paths take the same
//! lock. Resolves work on an immutable [`StateSnapshot`] taken when they
//! start, so a slow resolve never observes updates enqueued after it began.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::collections::map::{HashMap, HashSet};
use crate::collections::OrderedMap;
use crate::error::{ComponentError, LifecyclePhase};
use crate::key::GlobalKey;

/// Opaque state container owned by one component.
pub type StateValue = Arc<dyn Any + Send + Sync>;

pub fn state_value<T: Send + Sync + 'static>(value: T) -> StateValue {
    Arc::new(value)
}

type UpdateFn = dyn Fn(Option<&StateValue>) -> Result<StateValue, ComponentError> + Send + Sync;

/// A queued state transition.
///
/// Updates can be applied more than once: a resolve whose result is
/// discarded by the commit gate leaves its updates queued for the next one.
#[derive(Clone)]
pub struct StateUpdate {
    apply: Arc<UpdateFn>,
}

impl StateUpdate {
    /// Update computed from the current value. Fails if the component has
    /// no state of type `T`.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        Self {
            apply: Arc::new(move |current: Option<&StateValue>| {
                match current.and_then(|value| value.downcast_ref::<T>()) {
                    Some(value) => Ok(state_value(f(value))),
                    None => Err(ComponentError::new(format!(
                        "no state of type {} to update",
                        std::any::type_name::<T>()
                    ))
                    .in_phase(LifecyclePhase::StateUpdate)),
                }
            }),
        }
    }

    /// Update replacing the current value, whatever it is.
    pub fn set<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self {
            apply: Arc::new(move |_: Option<&StateValue>| Ok(state_value(value.clone()))),
        }
    }

    pub fn apply(&self, current: Option<&StateValue>) -> Result<StateValue, ComponentError> {
        (self.apply)(current)
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateUpdate")
    }
}

/// How a state update is delivered to the tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateMode {
    /// Stored only; becomes visible with the next resolve, whatever triggers it.
    Lazy,
    /// Stored and resolved on the calling thread before returning.
    Sync,
    /// Stored and resolved on the background executor.
    Async,
}

#[derive(Clone, Debug)]
pub struct PendingUpdate {
    pub seq: u64,
    pub update: StateUpdate,
}

#[derive(Default)]
struct TreeStateInner {
    committed: HashMap<GlobalKey, StateValue>,
    pending: OrderedMap<GlobalKey, Vec<PendingUpdate>>,
    initial: HashMap<GlobalKey, StateValue>,
    next_seq: u64,
}

#[derive(Default)]
pub struct TreeState {
    inner: Mutex<TreeStateInner>,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TreeStateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `update` for `key` and returns its sequence number.
    pub fn enqueue_update(&self, key: GlobalKey, update: StateUpdate) -> u64 {
        let mut inner = self.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.pending.entry(key).or_default().push(PendingUpdate { seq, update });
        seq
    }

    /// Sequence number of the most recently enqueued update.
    pub fn latest_seq(&self) -> u64 {
        self.lock().next_seq
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.lock();
        StateSnapshot {
            committed: inner.committed.clone(),
            pending: inner
                .pending
                .iter()
                .map(|(key, updates)| (key.clone(), updates.clone()))
                .collect(),
            seq: inner.next_seq,
        }
    }

    pub fn committed<T: Any>(&self, key: &GlobalKey) -> Option<Arc<T>>
    where
        T: Send + Sync,
    {
        let value = self.lock().committed.get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn committed_keys(&self) -> Vec<GlobalKey> {
        let mut keys: Vec<_> = self.lock().committed.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the initial state recorded for `key` during an earlier,
    /// uncommitted resolve, or stores `created` as that initial state.
    ///
    /// Two concurrent first resolves thus hand the same initial value to a
    /// component even though only one of them will commit.
    pub fn initial_state_or_insert(&self, key: &GlobalKey, created: StateValue) -> StateValue {
        let mut inner = self.lock();
        inner
            .initial
            .entry(key.clone())
            .or_insert(created)
            .clone()
    }

    pub fn initial_state(&self, key: &GlobalKey) -> Option<StateValue> {
        self.lock().initial.get(key).cloned()
    }

    /// Folds a committed resolve back into the tree state.
    ///
    /// States of components no longer in the tree are pruned, except those
    /// inside nested-tree holders, which are owned by layout commits.
    pub fn commit_resolve(&self, local: &LocalState) {
        let mut inner = self.lock();
        let TreeStateInner {
            committed,
            pending,
            initial,
            ..
        } = &mut *inner;

        committed.retain(|key, _| local.states.contains_key(key) || local.is_under_holder(key));
        for (key, value) in &local.states {
            committed.insert(key.clone(), value.clone());
        }

        drain_applied(pending, local);
        // Updates for keys that left the tree before this resolve started can
        // never be applied.
        pending.retain(|key, updates| {
            local.states.contains_key(key)
                || local.is_under_holder(key)
                || updates.iter().any(|update| update.seq > local.snapshot_seq)
        });

        initial.retain(|key, _| !committed.contains_key(key) && !local.states.contains_key(key));
    }

    /// Folds the states of nested trees resolved during a committed layout.
    ///
    /// Entries inside each holder of `local` are replaced wholesale.
    pub fn commit_nested(&self, local: &LocalState) {
        if local.holders.is_empty() {
            return;
        }
        let mut inner = self.lock();
        let TreeStateInner {
            committed,
            pending,
            initial,
            ..
        } = &mut *inner;

        committed.retain(|key, _| !local.is_under_holder(key) || local.states.contains_key(key));
        for (key, value) in &local.states {
            committed.insert(key.clone(), value.clone());
        }
        drain_applied(pending, local);
        initial.retain(|key, _| !committed.contains_key(key));
    }

    /// Drops everything. Used when the owning tree is released.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.committed.clear();
        inner.pending.clear();
        inner.initial.clear();
    }
}

fn drain_applied(pending: &mut OrderedMap<GlobalKey, Vec<PendingUpdate>>, local: &LocalState) {
    for (key, applied) in &local.applied {
        if let Some(updates) = pending.get_mut(key) {
            updates.retain(|update| update.seq > *applied);
            if updates.is_empty() {
                pending.shift_remove(key);
            }
        }
    }
}

/// Immutable view of the tree state taken when a resolve or layout starts.
#[derive(Clone, Default)]
pub struct StateSnapshot {
    committed: HashMap<GlobalKey, StateValue>,
    pending: Vec<(GlobalKey, Vec<PendingUpdate>)>,
    seq: u64,
}

impl StateSnapshot {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn committed(&self, key: &GlobalKey) -> Option<&StateValue> {
        self.committed.get(key)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns true if `key` or any key below it has queued updates.
    pub fn has_pending_within(&self, key: &GlobalKey) -> bool {
        self.pending.iter().any(|(pending, _)| key.contains(pending))
    }

    pub fn pending_for(&self, key: &GlobalKey) -> &[PendingUpdate] {
        self.pending
            .iter()
            .find(|(pending, _)| pending == key)
            .map(|(_, updates)| updates.as_slice())
            .unwrap_or(&[])
    }
}

/// States produced by one resolve or layout pass, committed with it.
#[derive(Clone, Default)]
pub struct LocalState {
    pub(crate) states: HashMap<GlobalKey, StateValue>,
    // highest applied update seq per key
    pub(crate) applied: HashMap<GlobalKey, u64>,
    pub(crate) holders: HashSet<GlobalKey>,
    pub(crate) snapshot_seq: u64,
}

impl LocalState {
    pub fn new(snapshot_seq: u64) -> Self {
        Self {
            snapshot_seq,
            ..Self::default()
        }
    }

    pub fn state(&self, key: &GlobalKey) -> Option<&StateValue> {
        self.states.get(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// True when nothing was recorded: no states, applied updates or holders.
    pub(crate) fn is_stateless(&self) -> bool {
        self.states.is_empty() && self.applied.is_empty() && self.holders.is_empty()
    }

    pub fn holders(&self) -> impl Iterator<Item = &GlobalKey> {
        self.holders.iter()
    }

    pub(crate) fn insert(&mut self, key: GlobalKey, value: StateValue) {
        self.states.insert(key, value);
    }

    pub(crate) fn mark_applied(&mut self, key: &GlobalKey, seq: u64) {
        let entry = self.applied.entry(key.clone()).or_insert(seq);
        if *entry < seq {
            *entry = seq;
        }
    }

    pub(crate) fn add_holder(&mut self, key: GlobalKey) {
        self.holders.insert(key);
    }

    pub(crate) fn is_under_holder(&self, key: &GlobalKey) -> bool {
        self.holders.iter().any(|holder| holder.contains(key))
    }

    /// Moves everything from `other` into `self`.
    pub fn merge(&mut self, other: LocalState) {
        self.states.extend(other.states);
        for (key, seq) in other.applied {
            self.mark_applied(&key, seq);
        }
        self.holders.extend(other.holders);
    }

    /// Forgets states recorded strictly below `root`.
    pub(crate) fn discard_descendants(&mut self, root: &GlobalKey) {
        self.states.retain(|key, _| !root.is_ancestor_of(key));
        self.applied.retain(|key, _| !root.is_ancestor_of(key));
        self.holders.retain(|key| !root.is_ancestor_of(key));
    }

    /// Forgets states recorded for `root` and everything below it.
    pub(crate) fn discard_subtree(&mut self, root: &GlobalKey) {
        self.states.retain(|key, _| !root.contains(key));
        self.applied.retain(|key, _| !root.contains(key));
        self.holders.retain(|key| !root.contains(key));
    }
}

impl fmt::Debug for LocalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.states.keys().collect();
        keys.sort();
        f.debug_struct("LocalState")
            .field("states", &keys)
            .field("holders", &self.holders.len())
            .field("snapshot_seq", &self.snapshot_seq)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
