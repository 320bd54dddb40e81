use super::*;
use crate::layout::{compute_layout, LayoutEngine, LayoutInput};
use crate::widgets::{Column, Spacer, Text};
use trellis_core::{resolve_tree, Element, ResolveInput, TreeState};

fn resolve_root(root: Element) -> Arc<ResolvedNode> {
    let input = ResolveInput::new(root, Arc::new(TreeState::new())).measurer(Some(LayoutEngine::shared()));
    resolve_tree(input)
        .expect("resolve")
        .root()
        .cloned()
        .expect("root node")
}

fn record(node: &Arc<ResolvedNode>, width: SizeSpec, size: Size) -> DiffNode {
    let mut diff = DiffNode::new(node.clone(), width, SizeSpec::UNSPECIFIED, None);
    diff.size = size;
    diff
}

#[test]
fn records_without_predecessor_are_unknown() {
    let node = resolve_root(Element::new(Spacer::new(10, 10)));
    let diff = DiffNode::new(node, SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED, None);
    assert_eq!(diff.update_state(), UpdateState::Unknown);
    assert_eq!(diff.host_id(), None);
    assert_eq!(diff.content_id(), None);
}

#[test]
fn identical_nodes_are_unchanged_and_keep_their_ids() {
    let node = resolve_root(Element::new(Spacer::new(10, 10)));
    let mut previous = record(&node, SizeSpec::UNSPECIFIED, Size::new(10, 10));
    previous.host_id = Some(7);
    previous.content_id = Some(8);

    let next = DiffNode::new(node.clone(), SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED, Some(&previous));
    assert_eq!(next.update_state(), UpdateState::Unchanged);
    assert_eq!(next.host_id(), Some(7));
    assert_eq!(next.content_id(), Some(8));
}

#[test]
fn changed_components_are_updated() {
    let before = resolve_root(Element::new(Spacer::new(10, 10)));
    let after = resolve_root(Element::new(Spacer::new(20, 10)));
    let previous = record(&before, SizeSpec::UNSPECIFIED, Size::new(10, 10));

    assert!(previous.matches(&after));
    let next = DiffNode::new(after, SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED, Some(&previous));
    assert_eq!(next.update_state(), UpdateState::Updated);
}

#[test]
fn matching_requires_key_and_component_type() {
    let spacer = resolve_root(Element::new(Spacer::new(10, 10)).key("item"));
    let text = resolve_root(Element::new(Text::new("hi")).key("item"));
    let other_key = resolve_root(Element::new(Spacer::new(10, 10)).key("other"));
    let previous = record(&spacer, SizeSpec::UNSPECIFIED, Size::new(10, 10));

    assert!(!previous.matches(&text));
    assert!(!previous.matches(&other_key));
}

#[test]
fn measurement_reuse_follows_spec_compatibility() {
    let node = resolve_root(Element::new(Text::new("abcd")));
    let previous = record(&node, SizeSpec::UNSPECIFIED, Size::new(32, 16));

    assert!(previous.can_reuse_measurement(&node, SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED));
    assert!(previous.can_reuse_measurement(&node, SizeSpec::at_most(50), SizeSpec::UNSPECIFIED));
    assert!(previous.can_reuse_measurement(&node, SizeSpec::exactly(32), SizeSpec::UNSPECIFIED));
    assert!(!previous.can_reuse_measurement(&node, SizeSpec::at_most(20), SizeSpec::UNSPECIFIED));
    assert!(!previous.can_reuse_measurement(&node, SizeSpec::exactly(40), SizeSpec::UNSPECIFIED));

    let other = resolve_root(Element::new(Text::new("abcdef")));
    assert!(!previous.can_reuse_measurement(&other, SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED));
}

#[test]
fn reused_copies_are_marked_unchanged_throughout() {
    let state = Arc::new(TreeState::new());
    let root = Element::new(Column::new([
        Element::new(Spacer::new(1, 1)),
        Element::new(Spacer::new(2, 2)),
    ]));
    let resolved = Arc::new(
        resolve_tree(ResolveInput::new(root, state.clone()).measurer(Some(LayoutEngine::shared()))).expect("resolve"),
    );
    let laid_out = compute_layout(LayoutInput::new(resolved, state, SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED))
        .expect("layout");
    let root = laid_out.diff_root().expect("root");

    assert_eq!(root.record_count(), 3);
    assert_eq!(root.update_state(), UpdateState::Unknown);
    let copy = root.reused();
    assert_eq!(copy.update_state(), UpdateState::Unchanged);
    assert!(copy
        .children()
        .iter()
        .all(|child| child.update_state() == UpdateState::Unchanged));
    assert_eq!(copy.children()[1].host_id(), root.children()[1].host_id());
    assert_eq!(copy.children()[1].content_id(), root.children()[1].content_id());
}

#[test]
fn previous_children_are_indexed_by_key() {
    let state = Arc::new(TreeState::new());
    let root = Element::new(Column::new([
        Element::new(Spacer::new(1, 1)),
        Element::new(Spacer::new(2, 2)),
    ]));
    let resolved = Arc::new(
        resolve_tree(ResolveInput::new(root, state.clone()).measurer(Some(LayoutEngine::shared()))).expect("resolve"),
    );
    let laid_out = compute_layout(LayoutInput::new(resolved, state, SizeSpec::UNSPECIFIED, SizeSpec::UNSPECIFIED))
        .expect("layout");

    let index = previous_children(laid_out.diff_root());
    let first = GlobalKey::root("Column").child("Spacer");
    let second = GlobalKey::root("Column").child("Spacer!1");
    assert_eq!(index.len(), 2);
    assert_eq!(index[&first].size(), Size::new(1, 1));
    assert_eq!(index[&second].size(), Size::new(2, 2));
    assert!(previous_children(None).is_empty());
}
