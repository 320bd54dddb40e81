use super::*;
use crate::layout::{compute_layout, LayoutEngine, LayoutInput};
use crate::output::UpdateState;
use crate::widgets::{Column, Spacer, Text};
use trellis_core::{resolve_tree, Element, EventHandler, ResolveInput, ResolveResult, TreeState};

struct Harness {
    state: Arc<TreeState>,
    resolve: Option<Arc<ResolveResult>>,
    layout: Option<Arc<LayoutState>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            state: Arc::new(TreeState::new()),
            resolve: None,
            layout: None,
        }
    }

    fn lay_out(&mut self, root: Element, width: SizeSpec) -> Arc<LayoutState> {
        let input = ResolveInput::new(root, self.state.clone())
            .previous(self.resolve.clone())
            .measurer(Some(LayoutEngine::shared()));
        let resolve = Arc::new(resolve_tree(input).expect("resolve"));
        let input = LayoutInput::new(resolve.clone(), self.state.clone(), width, SizeSpec::UNSPECIFIED)
            .previous(self.layout.clone());
        let layout = Arc::new(compute_layout(input).expect("layout"));
        self.resolve = Some(resolve);
        self.layout = Some(layout.clone());
        layout
    }
}

fn content_id(layout: &LayoutState, key: &GlobalKey) -> OutputId {
    layout
        .outputs_for(key)
        .find(|output| output.kind == OutputKind::Content)
        .map(|output| output.id)
        .expect("content output")
}

fn column(children: impl IntoIterator<Item = Element>) -> Element {
    Element::new(Column::new(children))
}

#[test]
fn root_host_gets_the_reserved_id() {
    let mut harness = Harness::new();
    let layout = harness.lay_out(
        column([Element::new(Spacer::new(1, 1)), Element::new(Spacer::new(1, 1))]),
        SizeSpec::UNSPECIFIED,
    );

    let root = &layout.outputs()[0];
    assert_eq!(root.id, ROOT_HOST_ID);
    assert_eq!(root.kind, OutputKind::Host);
    assert_eq!(root.parent, None);

    let ids: HashSet<OutputId> = layout.outputs().iter().map(|output| output.id).collect();
    assert_eq!(ids.len(), layout.outputs().len());
    assert!(layout.outputs()[1..].iter().all(|output| output.id != ROOT_HOST_ID));
    assert!(layout.outputs()[1..].iter().all(|output| output.parent == Some(0)));
}

#[test]
fn colliding_sibling_keys_get_suffixes() {
    let mut harness = Harness::new();
    let layout = harness.lay_out(
        column([Element::new(Spacer::new(1, 1)), Element::new(Spacer::new(2, 2))]),
        SizeSpec::UNSPECIFIED,
    );

    let keys: Vec<&str> = layout.outputs()[1..]
        .iter()
        .map(|output| output.global_key.as_str())
        .collect();
    assert_eq!(keys, vec!["Column,Spacer", "Column,Spacer!1"]);
}

#[test]
fn ids_follow_keys_across_insertions() {
    let mut harness = Harness::new();
    let before = harness.lay_out(
        column([Element::new(Text::new("a")).key("a"), Element::new(Text::new("b")).key("b")]),
        SizeSpec::UNSPECIFIED,
    );
    let a = GlobalKey::root("Column").child("a");
    let b = GlobalKey::root("Column").child("b");
    let c = GlobalKey::root("Column").child("c");
    let (a_id, b_id) = (content_id(&before, &a), content_id(&before, &b));

    let after = harness.lay_out(
        column([
            Element::new(Text::new("a")).key("a"),
            Element::new(Text::new("c")).key("c"),
            Element::new(Text::new("b")).key("b"),
        ]),
        SizeSpec::UNSPECIFIED,
    );
    assert_eq!(content_id(&after, &a), a_id);
    assert_eq!(content_id(&after, &b), b_id);
    let c_id = content_id(&after, &c);
    assert!(c_id != a_id && c_id != b_id && c_id != ROOT_HOST_ID);
    assert_eq!(after.output(b_id).map(|output| output.bounds.top), Some(32));
}

#[test]
fn ids_of_a_new_tree_are_derived_from_keys() {
    let root = || column([Element::new(Text::new("x")).key("x")]);
    let first = Harness::new().lay_out(root(), SizeSpec::UNSPECIFIED);
    let second = Harness::new().lay_out(root(), SizeSpec::UNSPECIFIED);
    let ids = |layout: &LayoutState| layout.outputs().iter().map(|output| output.id).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn update_state_reflects_changes() {
    let mut harness = Harness::new();
    let first = harness.lay_out(
        column([Element::new(Text::new("same")).key("same"), Element::new(Text::new("old")).key("edit")]),
        SizeSpec::UNSPECIFIED,
    );
    assert!(first.outputs().iter().all(|output| output.update_state == UpdateState::Unknown));

    let second = harness.lay_out(
        column([Element::new(Text::new("same")).key("same"), Element::new(Text::new("new")).key("edit")]),
        SizeSpec::UNSPECIFIED,
    );
    let state_of = |key: &str| {
        second
            .outputs_for(&GlobalKey::root("Column").child(key))
            .map(|output| output.update_state)
            .next()
    };
    assert_eq!(state_of("same"), Some(UpdateState::Unchanged));
    assert_eq!(state_of("edit"), Some(UpdateState::Updated));
}

#[test]
fn orderings_break_ties_by_index() {
    let mut harness = Harness::new();
    let layout = harness.lay_out(
        column([
            Element::new(Spacer::new(5, 10)),
            Element::new(Spacer::new(5, 0)),
            Element::new(Spacer::new(5, 10)),
        ]),
        SizeSpec::UNSPECIFIED,
    );

    // root 0..20, spacers 0..10, 10..10, 10..20
    assert_eq!(layout.by_top(), &[0, 1, 2, 3]);
    assert_eq!(layout.by_bottom(), &[2, 1, 3, 0]);
    let tops: Vec<i32> = layout.outputs_by_top().map(|output| output.bounds.top).collect();
    assert_eq!(tops, vec![0, 0, 10, 10]);
}

#[test]
fn visible_outputs_overlap_the_viewport() {
    let mut harness = Harness::new();
    let layout = harness.lay_out(
        column([
            Element::new(Spacer::new(5, 10)),
            Element::new(Spacer::new(5, 0)),
            Element::new(Spacer::new(5, 10)),
        ]),
        SizeSpec::UNSPECIFIED,
    );

    let visible: Vec<usize> = layout
        .visible_outputs(Rect::new(0, 12, 100, 30))
        .into_iter()
        .map(|output| output.index)
        .collect();
    assert_eq!(visible, vec![0, 3]);
}

#[test]
fn handlers_and_transitions_live_on_hosts() {
    let mut harness = Harness::new();
    let card = Element::new(Column::new([Element::new(Spacer::new(10, 10))]))
        .key("card")
        .on(EventHandler::new("click", 1, |_| {}))
        .global_transition_key("hero");
    let layout = harness.lay_out(column([Element::new(Spacer::new(10, 4)), card]), SizeSpec::UNSPECIFIED);

    let card_key = GlobalKey::root("Column").child("card");
    let host = layout.outputs_for(&card_key).next().expect("card host");
    assert_eq!(host.kind, OutputKind::Host);
    assert_eq!(host.handlers.len(), 1);
    assert_eq!(host.transition, Some(TransitionId::Global("hero".into())));

    let inner = layout.outputs().last().expect("card content");
    assert_eq!(inner.parent, Some(host.index));
    assert!(inner.handlers.is_empty());
    assert_eq!(
        layout.transitions().get(&TransitionId::Global("hero".into())),
        Some(&Rect::new(0, 4, 10, 14))
    );
}

#[test]
fn primitives_keep_their_own_handlers() {
    let mut harness = Harness::new();
    let layout = harness.lay_out(
        column([Element::new(Spacer::new(3, 3)).on(EventHandler::new("click", 2, |_| {}))]),
        SizeSpec::UNSPECIFIED,
    );

    let leaf = &layout.outputs()[1];
    assert_eq!(leaf.kind, OutputKind::Content);
    assert_eq!(leaf.handlers.len(), 1);
}
