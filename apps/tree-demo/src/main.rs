use std::sync::{Arc, Mutex};

use log::{info, warn};
use trellis_runtime_std::ThreadPoolExecutor;
use trellis_ui::prelude::*;
use trellis_ui::{transition_changes, NewLayoutStateReadyListener, OutputKind};

/// A labelled counter kept in component state.
#[derive(Debug, PartialEq)]
struct Counter {
    label: &'static str,
}

impl Component for Counter {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Composite(self)
    }

    fn create_initial_state(&self, _: &InitialStateScope<'_>) -> Result<Option<StateValue>, ComponentError> {
        Ok(Some(state_value(0_u32)))
    }
}

impl Composite for Counter {
    fn render(&self, scope: &mut RenderScope<'_, '_>) -> Result<Option<Element>, ComponentError> {
        let count = scope.state::<u32>().copied().unwrap_or_default();
        let bar = Element::new(Spacer::new(4 * count as i32, 8)).transition_key("bar");
        Ok(Some(Element::new(
            Row::new([Element::new(Text::new(format!("{}: {count}", self.label))), bar]).spaced_by(6),
        )))
    }
}

fn app() -> Element {
    Element::new(
        Column::new([
            Element::new(Text::new("Trellis tree demo")),
            Element::new(Counter { label: "clicks" }).key("clicks"),
            Element::new(Counter { label: "taps" }).key("taps"),
        ])
        .spaced_by(4),
    )
    .padding(Edges::uniform(8))
}

/// Logs every committed layout and the transitions it implies.
#[derive(Default)]
struct LayoutLogger {
    previous: Mutex<Option<Arc<LayoutState>>>,
}

impl NewLayoutStateReadyListener for LayoutLogger {
    fn on_new_layout_state_ready(&self, layout: &Arc<LayoutState>, source: RenderSource) {
        let mut previous = self.previous.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        info!(
            "layout v{} ({source:?}): {}x{}, {} outputs",
            layout.version(),
            layout.size().width,
            layout.size().height,
            layout.outputs().len()
        );
        for change in transition_changes(previous.as_deref(), layout).iter().filter(|change| change.is_changed()) {
            info!("  transition {}: {:?} -> {:?}", change.id, change.before, change.after);
        }
        *previous = Some(layout.clone());
    }
}

fn print_outputs(layout: &LayoutState) {
    println!("{:>4}  {:<8} {:<24} {:<28} update", "id", "kind", "bounds", "key");
    for output in layout.outputs_by_top() {
        let kind = match output.kind {
            OutputKind::Host => "host",
            OutputKind::Content => "content",
        };
        let bounds = format!(
            "({}, {}, {}, {})",
            output.bounds.left, output.bounds.top, output.bounds.right, output.bounds.bottom
        );
        println!(
            "{:>4}  {:<8} {:<24} {:<28} {:?}",
            output.id, kind, bounds, output.global_key, output.update_state
        );
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let pool = Arc::new(ThreadPoolExecutor::default());
    let tree = ComponentTree::new(TreeConfig::default().with_executor(pool.clone()));
    tree.add_layout_listener(LayoutLogger::default());
    tree.add_error_listener(|error: &TreeError, source: RenderSource| warn!("{source:?} failed: {error}"));

    if let Err(error) = tree.set_root_and_size_spec(app(), SizeSpec::at_most(320), SizeSpec::UNSPECIFIED) {
        warn!("initial render failed: {error}");
        return;
    }

    let clicks = GlobalKey::root("Column").child("clicks");
    let taps = GlobalKey::root("Column").child("taps");
    for _ in 0..3 {
        let _ = tree.update_state_async(&clicks, StateUpdate::new(|count: &u32| count + 1));
    }
    let _ = tree.update_state(&taps, StateUpdate::set(5_u32), UpdateMode::Lazy);
    let _ = tree.set_size_spec_async(SizeSpec::at_most(240), SizeSpec::UNSPECIFIED);
    pool.wait_until_idle();

    match tree.layout() {
        Ok(layout) => print_outputs(&layout),
        Err(error) => warn!("no layout: {error}"),
    }
    tree.release();
}
