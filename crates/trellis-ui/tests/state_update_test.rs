//! State updates: queue order, delivery modes and the render-loop guard.

use std::sync::Arc;

use trellis_core::{
    state_value, Component, ComponentError, ComponentKind, Composite, Element, GlobalKey, InitialStateScope,
    RenderScope, StateUpdate, StateValue, UpdateMode,
};
use trellis_testing::{CallCounter, ManualExecutor};
use trellis_ui::{ComponentTree, Text, TreeConfig};
use trellis_ui_layout::SizeSpec;

/// Shows its counter; optionally bumps it from render until `settle_at`.
#[derive(Debug, PartialEq)]
struct Counter {
    renders: CallCounter,
    settle_at: Option<i32>,
}

impl Counter {
    fn new(renders: &CallCounter) -> Self {
        Self {
            renders: renders.clone(),
            settle_at: None,
        }
    }

    fn bumping_until(renders: &CallCounter, settle_at: i32) -> Self {
        Self {
            renders: renders.clone(),
            settle_at: Some(settle_at),
        }
    }
}

impl Component for Counter {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }

    fn create_initial_state(&self, _: &InitialStateScope<'_>) -> Result<Option<StateValue>, ComponentError> {
        Ok(Some(state_value(0_i32)))
    }
}

impl Composite for Counter {
    fn render(&self, scope: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        self.renders.hit();
        let count = scope.state::<i32>().copied().unwrap_or_default();
        if self.settle_at.is_some_and(|settle_at| count < settle_at) {
            scope.update_state(StateUpdate::new(|count: &i32| count + 1));
        }
        Ok(Some(Element::new(Text::new(count.to_string()))))
    }
}

/// Enqueues an update on every render.
#[derive(Debug, PartialEq)]
struct Restless;

impl Component for Restless {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }

    fn create_initial_state(&self, _: &InitialStateScope<'_>) -> Result<Option<StateValue>, ComponentError> {
        Ok(Some(state_value(0_u64)))
    }
}

impl Composite for Restless {
    fn render(&self, scope: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        scope.update_state(StateUpdate::new(|count: &u64| count + 1));
        Ok(Some(Element::new(Text::new("restless"))))
    }
}

fn counter_key() -> GlobalKey {
    GlobalKey::root("Counter")
}

fn count(tree: &ComponentTree) -> Option<i32> {
    tree.committed_state::<i32>(&counter_key()).map(|count| *count)
}

#[test]
fn queued_updates_fold_once_in_order() {
    let renders = CallCounter::new();
    let tree = ComponentTree::new(TreeConfig::default());
    tree.set_root(Element::new(Counter::new(&renders))).expect("resolve");
    assert_eq!(count(&tree), Some(0));

    tree.update_state_lazy(&counter_key(), StateUpdate::set(5_i32)).expect("enqueue");
    tree.update_state_lazy(&counter_key(), StateUpdate::new(|count: &i32| count + 1))
        .expect("enqueue");
    tree.update_state_sync(&counter_key(), StateUpdate::new(|count: &i32| count * 10))
        .expect("resolve");
    assert_eq!(count(&tree), Some(60));
    assert!(!tree.tree_state().has_pending_updates());

    tree.update_state_sync(&counter_key(), StateUpdate::new(|count: &i32| count + 1))
        .expect("resolve");
    assert_eq!(count(&tree), Some(61));
}

#[test]
fn lazy_updates_wait_for_the_next_request() {
    let renders = CallCounter::new();
    let tree = ComponentTree::new(TreeConfig::default());
    tree.set_root(Element::new(Counter::new(&renders))).expect("resolve");
    let renders_before = renders.get();

    tree.update_state_lazy(&counter_key(), StateUpdate::set(3_i32)).expect("enqueue");
    assert_eq!(renders.get(), renders_before);
    assert_eq!(count(&tree), Some(0));

    tree.set_size_spec(SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED)
        .expect("layout");
    assert_eq!(count(&tree), Some(3));
    assert_eq!(renders.get(), renders_before + 1);
}

#[test]
fn async_updates_run_on_the_executor() {
    let executor = Arc::new(ManualExecutor::new());
    let renders = CallCounter::new();
    let tree = ComponentTree::new(TreeConfig::default().with_executor(executor.clone()));
    tree.set_root(Element::new(Counter::new(&renders))).expect("resolve");

    tree.update_state_async(&counter_key(), StateUpdate::set(9_i32)).expect("post");
    assert_eq!(count(&tree), Some(0));
    assert_eq!(executor.pending(), 1);

    executor.run_pending();
    assert_eq!(count(&tree), Some(9));
}

#[test]
fn update_mode_picks_the_delivery() {
    let executor = Arc::new(ManualExecutor::new());
    let renders = CallCounter::new();
    let tree = ComponentTree::new(TreeConfig::default().with_executor(executor.clone()));
    tree.set_root(Element::new(Counter::new(&renders))).expect("resolve");

    tree.update_state(&counter_key(), StateUpdate::set(1_i32), UpdateMode::Lazy)
        .expect("queue");
    assert_eq!(count(&tree), Some(0));
    assert_eq!(executor.pending(), 0);

    tree.update_state(&counter_key(), StateUpdate::new(|count: &i32| count + 1), UpdateMode::Async)
        .expect("post");
    assert_eq!(count(&tree), Some(0));
    assert_eq!(executor.pending(), 1);
    executor.run_pending();
    assert_eq!(count(&tree), Some(2));

    tree.update_state(&counter_key(), StateUpdate::new(|count: &i32| count * 10), UpdateMode::Sync)
        .expect("resolve");
    assert_eq!(count(&tree), Some(20));
}

#[test]
fn render_updates_resolve_again_until_settled() {
    let renders = CallCounter::new();
    let tree = ComponentTree::new(TreeConfig::default());
    tree.set_root_and_size_spec(
        Element::new(Counter::bumping_until(&renders, 3)),
        SizeSpec::UNSPECIFIED,
        SizeSpec::UNSPECIFIED,
    )
    .expect("render");

    assert_eq!(count(&tree), Some(3));
    assert_eq!(renders.get(), 4);
    let layout = tree.committed_layout().expect("layout");
    let text = layout
        .outputs()
        .iter()
        .find_map(|output| output.component.downcast_ref::<Text>())
        .expect("text output");
    assert_eq!(text.text, "3");
}

#[test]
#[should_panic(expected = "state update loop")]
fn endless_render_updates_are_fatal() {
    let tree = ComponentTree::new(TreeConfig::default().with_state_update_loop_threshold(5));
    let _ = tree.set_root(Element::new(Restless));
}

#[test]
fn updates_for_removed_components_are_dropped() {
    let renders = CallCounter::new();
    let tree = ComponentTree::new(TreeConfig::default());
    tree.set_root(Element::new(Counter::new(&renders))).expect("resolve");
    tree.set_root(Element::new(Text::new("gone"))).expect("resolve");

    assert_eq!(count(&tree), None);
    tree.update_state_lazy(&counter_key(), StateUpdate::set(1_i32)).expect("enqueue");
    tree.set_root(Element::new(Text::new("still gone"))).expect("resolve");
    assert!(!tree.tree_state().has_pending_updates());
}
