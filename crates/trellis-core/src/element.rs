use std::any::Any;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use trellis_ui_layout::{Edges, LayoutProps};

use crate::component::Component;
use crate::key::GlobalKey;

/// A component instance plus the per-use attributes its parent gave it.
#[derive(Clone)]
pub struct Element {
    component: Arc<dyn Component>,
    key: Option<Arc<str>>,
    props: LayoutProps,
    handlers: SmallVec<[EventHandler; 1]>,
    transition: Option<TransitionKey>,
}

impl Element {
    pub fn new(component: impl Component) -> Self {
        Self::from_arc(Arc::new(component))
    }

    pub fn from_arc(component: Arc<dyn Component>) -> Self {
        Self {
            component,
            key: None,
            props: LayoutProps::default(),
            handlers: SmallVec::new(),
            transition: None,
        }
    }

    pub fn key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn width(mut self, width: i32) -> Self {
        self.props.width = Some(width);
        self
    }

    pub fn height(mut self, height: i32) -> Self {
        self.props.height = Some(height);
        self
    }

    pub fn margin(mut self, margin: Edges) -> Self {
        self.props.margin = Some(margin);
        self
    }

    pub fn padding(mut self, padding: Edges) -> Self {
        self.props.padding = Some(padding);
        self
    }

    pub fn on(mut self, handler: EventHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn transition_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.transition = Some(TransitionKey {
            scope: TransitionScope::Local,
            key: key.into(),
        });
        self
    }

    pub fn global_transition_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.transition = Some(TransitionKey {
            scope: TransitionScope::Global,
            key: key.into(),
        });
        self
    }

    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }

    pub fn explicit_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Explicit key if present, otherwise the component's type name.
    pub fn base_key(&self) -> &str {
        match &self.key {
            Some(key) => key,
            None => self.component.type_name(),
        }
    }

    pub fn props(&self) -> &LayoutProps {
        &self.props
    }

    pub fn handlers(&self) -> &[EventHandler] {
        &self.handlers
    }

    pub fn transition(&self) -> Option<&TransitionKey> {
        self.transition.as_ref()
    }

    pub fn is_equivalent_to(&self, other: &Element) -> bool {
        (Arc::ptr_eq(&self.component, &other.component)
            || self.component.is_equivalent_to(other.component.as_ref()))
            && self.key == other.key
            && self.props == other.props
            && self.handlers == other.handlers
            && self.transition == other.transition
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.is_equivalent_to(other)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Element");
        s.field("component", &self.component);
        if let Some(key) = &self.key {
            s.field("key", key);
        }
        if !self.props.is_empty() {
            s.field("props", &self.props);
        }
        if !self.handlers.is_empty() {
            s.field("handlers", &self.handlers);
        }
        if let Some(transition) = &self.transition {
            s.field("transition", transition);
        }
        s.finish()
    }
}

type HandlerFn = dyn Fn(&dyn Any) + Send + Sync;

/// Event handler binding. Two handlers are equal when they share the event
/// name and id; the callback itself is not compared.
#[derive(Clone)]
pub struct EventHandler {
    event: &'static str,
    id: u64,
    callback: Arc<HandlerFn>,
}

impl EventHandler {
    pub fn new(event: &'static str, id: u64, callback: impl Fn(&dyn Any) + Send + Sync + 'static) -> Self {
        Self {
            event,
            id,
            callback: Arc::new(callback),
        }
    }

    pub fn event(&self) -> &'static str {
        self.event
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dispatch(&self, payload: &dyn Any) {
        (self.callback)(payload);
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.event == other.event && self.id == other.id
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({}#{})", self.event, self.id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionScope {
    /// Unique among the elements created by the same owner.
    Local,
    /// Unique across the whole tree.
    Global,
}

/// Transition key declared on an element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    pub scope: TransitionScope,
    pub key: Arc<str>,
}

/// A transition key resolved against its owner. Local keys are qualified by
/// the global key of the component that created the element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransitionId {
    Global(Arc<str>),
    Local { owner: GlobalKey, key: Arc<str> },
}

impl TransitionId {
    pub fn resolve(key: &TransitionKey, owner: &GlobalKey) -> Self {
        match key.scope {
            TransitionScope::Global => TransitionId::Global(key.key.clone()),
            TransitionScope::Local => TransitionId::Local {
                owner: owner.clone(),
                key: key.key.clone(),
            },
        }
    }

    pub fn key(&self) -> &str {
        match self {
            TransitionId::Global(key) => key,
            TransitionId::Local { key, .. } => key,
        }
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionId::Global(key) => write!(f, "global:{key}"),
            TransitionId::Local { owner, key } => write!(f, "{owner}:{key}"),
        }
    }
}
