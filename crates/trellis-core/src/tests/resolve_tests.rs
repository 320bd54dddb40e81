use super::*;
use crate::component::{Composite, Container, ErrorBoundary, Primitive, SizeDependent};
use crate::state::state_value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone, Default, Debug)]
struct Calls(Arc<AtomicUsize>);

impl Calls {
    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl PartialEq for Calls {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

#[derive(Debug, PartialEq)]
struct Label {
    text: &'static str,
}

impl Component for Label {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Primitive(self)
    }
}

impl Primitive for Label {
    fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, ComponentError> {
        Ok(Size::new(width.resolve(self.text.len() as i32 * 10), height.resolve(10)))
    }
}

#[derive(Debug, PartialEq)]
struct Card {
    title: &'static str,
    renders: Calls,
}

impl Component for Card {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }
}

impl Composite for Card {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        self.renders.hit();
        Ok(Some(Element::new(Label { text: self.title }).width(50)))
    }
}

#[derive(Debug, PartialEq)]
struct List {
    items: Vec<Element>,
    renders: Calls,
}

impl Component for List {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Container(self)
    }
}

impl Container for List {
    fn children(&self, _: &mut RenderScope<'_, '_>) -> Result<Vec<Element>, ComponentError> {
        self.renders.hit();
        Ok(self.items.clone())
    }
}

#[derive(Debug, PartialEq)]
struct Counter {
    renders: Calls,
}

#[derive(Debug, PartialEq)]
struct Count(i32);

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
        let count = scope.state::<i32>().copied().unwrap_or(-1);
        Ok(Some(Element::new(Label { text: "count" }).key(format!("count-{count}"))))
    }
}

#[derive(Debug, PartialEq)]
struct Failing;

impl Component for Failing {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }
}

impl Composite for Failing {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        Err(ComponentError::new("cannot render"))
    }
}

#[derive(Debug, PartialEq)]
struct Wrapper {
    child: Element,
}

impl Component for Wrapper {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }
}

impl Composite for Wrapper {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        Ok(Some(self.child.clone()))
    }
}

#[derive(Default, Debug)]
struct Caught(Arc<Mutex<Vec<String>>>);

impl PartialEq for Caught {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

#[derive(Debug, PartialEq)]
struct Boundary {
    child: Element,
    caught: Caught,
}

impl Component for Boundary {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }

    fn error_boundary(&self) -> Option<&dyn ErrorBoundary> {
        Some(self)
    }
}

impl Composite for Boundary {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        Ok(Some(self.child.clone()))
    }
}

impl ErrorBoundary for Boundary {
    fn on_error(&self, _: &mut ErrorScope<'_>, error: &ComponentError) -> ErrorDisposition {
        if let Ok(mut caught) = self.caught.0.lock() {
            caught.push(error.path());
        }
        ErrorDisposition::Handled {
            replacement: Some(Element::new(Label { text: "fallback" })),
        }
    }
}

#[derive(Debug, PartialEq)]
struct Theme(&'static str);

#[derive(Debug, PartialEq)]
struct ThemeProvider {
    theme: &'static str,
    child: Element,
}

impl Component for ThemeProvider {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }

    fn provide_tree_props(&self, inherited: &TreeProps) -> Option<TreeProps> {
        Some(inherited.with(Theme(self.theme)))
    }
}

impl Composite for ThemeProvider {
    fn render(&self, _: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        Ok(Some(self.child.clone()))
    }
}

#[derive(Debug, PartialEq)]
struct ThemedLabel {
    renders: Calls,
    seen: Caught,
}

impl Component for ThemedLabel {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }
}

impl Composite for ThemedLabel {
    fn render(&self, scope: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        self.renders.hit();
        let theme = scope.tree_prop::<Theme>().map(|theme| theme.0).unwrap_or("none");
        if let Ok(mut seen) = self.seen.0.lock() {
            seen.push(theme.to_string());
        }
        Ok(Some(Element::new(Label { text: "themed" })))
    }
}

#[derive(Debug, PartialEq)]
struct Adaptive;

impl Component for Adaptive {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::SizeDependent(self)
    }
}

impl SizeDependent for Adaptive {
    fn render_with_size(
        &self,
        _: &mut RenderScope<'_, '_>,
        width: SizeSpec,
        _: SizeSpec,
    ) -> Result<Option<Element>, ComponentError> {
        let text = if width.size() > 100 { "wide" } else { "narrow" };
        Ok(Some(Element::new(Label { text })))
    }
}

#[derive(Debug, PartialEq)]
struct SelfUpdating;

impl Component for SelfUpdating {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }
}

impl Composite for SelfUpdating {
    fn render(&self, scope: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        scope.update_state(StateUpdate::set(1_u8));
        Ok(Some(Element::new(Label { text: "again" })))
    }
}

#[derive(Debug, PartialEq)]
struct Measuring {
    child: Element,
    measured: Caught,
}

impl Component for Measuring {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Container(self)
    }
}

impl Container for Measuring {
    fn children(&self, scope: &mut RenderScope<'_, '_>) -> Result<Vec<Element>, ComponentError> {
        let first = scope.measure(&self.child, SizeSpec::at_most(100), SizeSpec::UNSPECIFIED)?;
        let second = scope.measure(&self.child, SizeSpec::at_most(100), SizeSpec::UNSPECIFIED)?;
        if let Ok(mut measured) = self.measured.0.lock() {
            measured.push(format!("{}x{}", first.width, first.height));
            measured.push(format!("{}x{}", second.width, second.height));
        }
        Ok(vec![self.child.clone()])
    }
}

/// Measures `measured`, then returns it after a sibling of the same type.
#[derive(Debug, PartialEq)]
struct MeasuredLast {
    first: Element,
    measured: Element,
}

impl Component for MeasuredLast {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Container(self)
    }
}

impl Container for MeasuredLast {
    fn children(&self, scope: &mut RenderScope<'_, '_>) -> Result<Vec<Element>, ComponentError> {
        scope.measure(&self.measured, SizeSpec::at_most(100), SizeSpec::UNSPECIFIED)?;
        Ok(vec![self.first.clone(), self.measured.clone()])
    }
}

struct FixedMeasurer(Calls);

impl MeasureDelegate for FixedMeasurer {
    fn measure(
        &self,
        _: &Arc<ResolvedNode>,
        _: SizeSpec,
        _: SizeSpec,
        _: &mut NestedEnv,
    ) -> Result<Size, ComponentError> {
        self.0.hit();
        Ok(Size::new(40, 12))
    }
}

fn resolve(root: &Element, state: &Arc<TreeState>, previous: Option<Arc<ResolveResult>>) -> Arc<ResolveResult> {
    let input = ResolveInput::new(root.clone(), state.clone()).previous(previous);
    let result = Arc::new(resolve_tree(input).expect("resolve succeeds"));
    state.commit_resolve(result.local_state());
    result
}

fn child_keys(node: &ResolvedNode) -> Vec<String> {
    node.children()
        .iter()
        .map(|child| child.global_key().last_segment().to_string())
        .collect()
}

#[test]
fn unkeyed_siblings_of_one_type_get_suffixed_keys() {
    let root = Element::new(List {
        items: vec![Element::new(Label { text: "a" }), Element::new(Label { text: "b" })],
        renders: Calls::default(),
    });
    let state = Arc::new(TreeState::new());
    let result = resolve(&root, &state, None);

    let node = result.root().expect("root node");
    assert_eq!(child_keys(node), vec!["Label", "Label!1"]);
    assert_eq!(result.diagnostics().len(), 1);
    assert_eq!(result.diagnostics()[0].kind, DiagnosticKind::DuplicateTypeKey);
}

#[test]
fn duplicate_explicit_keys_are_rewritten_and_reported() {
    let root = Element::new(List {
        items: vec![
            Element::new(Label { text: "a" }).key("row"),
            Element::new(Label { text: "b" }).key("row"),
            Element::new(Label { text: "c" }).key("row"),
        ],
        renders: Calls::default(),
    });
    let state = Arc::new(TreeState::new());
    let result = resolve(&root, &state, None);

    let node = result.root().expect("root node");
    assert_eq!(child_keys(node), vec!["row", "row!1", "row!2"]);
    assert!(result
        .diagnostics()
        .iter()
        .all(|diagnostic| diagnostic.kind == DiagnosticKind::DuplicateExplicitKey));
}

#[test]
fn unchanged_root_reuses_whole_tree_without_rendering() {
    let renders = Calls::default();
    let root = Element::new(Card {
        title: "hello",
        renders: renders.clone(),
    });
    let state = Arc::new(TreeState::new());
    let first = resolve(&root, &state, None);

    let same = Element::new(Card {
        title: "hello",
        renders: renders.clone(),
    });
    let second = resolve(&same, &state, Some(first.clone()));

    assert!(second.is_reused());
    assert_eq!(renders.get(), 1);
    assert!(Arc::ptr_eq(
        first.root().expect("first root"),
        second.root().expect("second root")
    ));
}

#[test]
fn unchanged_sibling_subtrees_are_shared() {
    let list_renders = Calls::default();
    let stable_renders = Calls::default();
    let changed_renders = Calls::default();
    let build = |title: &'static str| {
        Element::new(List {
            items: vec![
                Element::new(Card {
                    title: "stable",
                    renders: stable_renders.clone(),
                })
                .key("stable"),
                Element::new(Card {
                    title,
                    renders: changed_renders.clone(),
                })
                .key("changing"),
            ],
            renders: list_renders.clone(),
        })
    };
    let state = Arc::new(TreeState::new());
    let first = resolve(&build("one"), &state, None);
    let second = resolve(&build("two"), &state, Some(first.clone()));

    let before = first.root().expect("first root");
    let after = second.root().expect("second root");
    assert!(!second.is_reused());
    assert!(Arc::ptr_eq(&before.children()[0], &after.children()[0]));
    assert!(!Arc::ptr_eq(&before.children()[1], &after.children()[1]));
    assert_eq!(stable_renders.get(), 1);
    assert_eq!(changed_renders.get(), 2);
    assert_eq!(list_renders.get(), 2);
}

#[test]
fn delegation_chain_merges_props_outer_first() {
    let root = Element::new(Card {
        title: "chain",
        renders: Calls::default(),
    })
    .width(80)
    .height(20);
    let state = Arc::new(TreeState::new());
    let result = resolve(&root, &state, None);

    let node = result.root().expect("root node");
    assert_eq!(node.chain().len(), 2);
    assert_eq!(node.global_key().as_str(), "Card");
    assert_eq!(node.tail().global_key.as_str(), "Card,Label");
    assert_eq!(node.props().width, Some(80));
    assert_eq!(node.props().height, Some(20));
    assert_eq!(node.kind(), NodeKind::Primitive);
}

#[test]
fn queued_updates_apply_and_block_reuse() {
    let renders = Calls::default();
    let root = Element::new(Counter {
        renders: renders.clone(),
    });
    let state = Arc::new(TreeState::new());
    let first = resolve(&root, &state, None);
    let counter_key = GlobalKey::root("Counter");
    assert_eq!(state.committed::<i32>(&counter_key).as_deref(), Some(&0));

    state.enqueue_update(counter_key.clone(), StateUpdate::new(|count: &i32| count + 1));
    state.enqueue_update(counter_key.clone(), StateUpdate::new(|count: &i32| count * 5));
    let second = resolve(&root, &state, Some(first));

    assert!(!second.is_reused());
    assert_eq!(renders.get(), 2);
    assert_eq!(state.committed::<i32>(&counter_key).as_deref(), Some(&5));
    assert!(!state.has_pending_updates());
    let node = second.root().expect("root node");
    assert_eq!(node.tail().global_key.last_segment(), "count-5");
}

#[test]
fn removed_components_lose_their_state() {
    let state = Arc::new(TreeState::new());
    let with_counter = Element::new(List {
        items: vec![Element::new(Counter {
            renders: Calls::default(),
        })],
        renders: Calls::default(),
    });
    let first = resolve(&with_counter, &state, None);
    assert_eq!(state.committed_keys().len(), 1);

    let without = Element::new(List {
        items: vec![Element::new(Label { text: "plain" })],
        renders: Calls::default(),
    });
    resolve(&without, &state, Some(first));
    assert!(state.committed_keys().is_empty());
}

#[test]
fn boundary_replaces_failing_subtree() {
    let caught = Caught::default();
    let log = caught.0.clone();
    let root = Element::new(Boundary {
        child: Element::new(Wrapper {
            child: Element::new(Failing),
        }),
        caught,
    });
    let state = Arc::new(TreeState::new());
    let result = resolve(&root, &state, None);

    let paths = log.lock().expect("log").clone();
    assert_eq!(paths, vec!["Boundary > Wrapper > Failing".to_string()]);
    let node = result.root().expect("replacement node");
    assert_eq!(node.tail().global_key.as_str(), "Boundary,Label");
}

#[test]
fn unhandled_errors_carry_the_component_stack() {
    let root = Element::new(Wrapper {
        child: Element::new(Failing),
    });
    let state = Arc::new(TreeState::new());
    let error = resolve_tree(ResolveInput::new(root, state)).expect_err("render fails");

    assert_eq!(error.path(), "Wrapper > Failing");
    assert_eq!(error.phase(), Some(LifecyclePhase::Render));
}

#[test]
fn tree_props_reach_descendants_and_gate_reuse() {
    let renders = Calls::default();
    let seen = Caught::default();
    let log = seen.0.clone();
    let build = |theme: &'static str| {
        Element::new(ThemeProvider {
            theme,
            child: Element::new(ThemedLabel {
                renders: renders.clone(),
                seen: Caught(log.clone()),
            }),
        })
    };
    let state = Arc::new(TreeState::new());
    let first = resolve(&build("dark"), &state, None);
    resolve(&build("light"), &state, Some(first));

    assert_eq!(renders.get(), 2);
    assert_eq!(*log.lock().expect("log"), vec!["dark".to_string(), "light".to_string()]);
}

#[test]
fn size_dependent_components_become_holders() {
    let root = Element::new(List {
        items: vec![Element::new(Adaptive)],
        renders: Calls::default(),
    });
    let state = Arc::new(TreeState::new());
    let result = resolve(&root, &state, None);
    let holder = result.root().expect("root").children()[0].clone();
    assert!(holder.is_nested_tree_holder());
    assert_eq!(result.local_state().holders().count(), 1);

    let mut env = NestedEnv::new(state.clone(), Arc::new(state.snapshot()), true, None);
    let wide = resolve_nested(&holder, SizeSpec::exactly(200), SizeSpec::UNSPECIFIED, None, &mut env)
        .expect("nested resolve")
        .expect("nested root");
    let narrow = resolve_nested(&holder, SizeSpec::exactly(50), SizeSpec::UNSPECIFIED, None, &mut env)
        .expect("nested resolve")
        .expect("nested root");

    let wide_label = wide.tail().component.downcast_ref::<Label>().map(|label| label.text);
    let narrow_label = narrow.tail().component.downcast_ref::<Label>().map(|label| label.text);
    assert_eq!(wide_label, Some("wide"));
    assert_eq!(narrow_label, Some("narrow"));
    assert_eq!(wide.global_key().as_str(), "List,Adaptive,Label");
}

#[test]
fn render_phase_updates_are_counted() {
    let state = Arc::new(TreeState::new());
    let result = resolve_tree(ResolveInput::new(Element::new(SelfUpdating), state.clone())).expect("resolve");
    assert_eq!(result.state_updates_in_render(), 1);
    assert!(state.has_pending_updates());
}

#[test]
fn measure_during_render_is_memoized() {
    let measured = Caught::default();
    let log = measured.0.clone();
    let card_renders = Calls::default();
    let measures = Calls::default();
    let root = Element::new(Measuring {
        child: Element::new(Card {
            title: "probe",
            renders: card_renders.clone(),
        }),
        measured,
    });
    let state = Arc::new(TreeState::new());
    let measurer: Arc<dyn MeasureDelegate> = Arc::new(FixedMeasurer(measures.clone()));
    let result = resolve_tree(ResolveInput::new(root, state).measurer(Some(measurer))).expect("resolve");

    assert_eq!(*log.lock().expect("log"), vec!["40x12".to_string(), "40x12".to_string()]);
    assert_eq!(measures.get(), 1);
    // the measured child is reused rather than rendered again
    assert_eq!(card_renders.get(), 1);
    assert_eq!(result.root().expect("root").children().len(), 1);
}

#[test]
fn measured_child_moved_to_a_suffixed_key_is_not_rendered_again() {
    let first_renders = Calls::default();
    let measured_renders = Calls::default();
    let root = Element::new(MeasuredLast {
        first: Element::new(Card {
            title: "first",
            renders: first_renders.clone(),
        }),
        measured: Element::new(Card {
            title: "measured",
            renders: measured_renders.clone(),
        }),
    });
    let state = Arc::new(TreeState::new());
    let measurer: Arc<dyn MeasureDelegate> = Arc::new(FixedMeasurer(Calls::default()));
    let result = resolve_tree(ResolveInput::new(root, state).measurer(Some(measurer))).expect("resolve");

    assert_eq!(first_renders.get(), 1);
    assert_eq!(measured_renders.get(), 1);
    let moved = &result.root().expect("root").children()[1];
    let keys: Vec<&str> = moved.chain().iter().map(|scoped| scoped.global_key.as_str()).collect();
    assert_eq!(keys, vec!["MeasuredLast,Card!1", "MeasuredLast,Card!1,Label"]);
}

#[test]
fn stateful_measured_child_under_a_suffixed_key_is_resolved_again() {
    let measured_renders = Calls::default();
    let root = Element::new(MeasuredLast {
        first: Element::new(Counter { renders: Calls::default() }),
        measured: Element::new(Counter {
            renders: measured_renders.clone(),
        }),
    });
    let state = Arc::new(TreeState::new());
    let measurer: Arc<dyn MeasureDelegate> = Arc::new(FixedMeasurer(Calls::default()));
    let result = resolve_tree(ResolveInput::new(root, state).measurer(Some(measurer))).expect("resolve");

    assert_eq!(measured_renders.get(), 2);
    let moved = &result.root().expect("root").children()[1];
    assert_eq!(moved.global_key().as_str(), "MeasuredLast,Counter!1");
    assert!(result.local_state().state(moved.global_key()).is_some());
}

#[test]
fn measure_without_layout_engine_fails() {
    let root = Element::new(Measuring {
        child: Element::new(Label { text: "x" }),
        measured: Caught::default(),
    });
    let state = Arc::new(TreeState::new());
    let error = resolve_tree(ResolveInput::new(root, state)).expect_err("no measurer");
    assert_eq!(error.phase(), Some(LifecyclePhase::Measure));
    assert_eq!(error.failing_component(), Some("Measuring"));
}
