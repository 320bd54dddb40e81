//! Typed values a component provides to its whole subtree.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::collections::map::HashMap;

trait PropValue: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_value(&self, other: &dyn PropValue) -> bool;
}

impl<T: PartialEq + fmt::Debug + Send + Sync + 'static> PropValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_value(&self, other: &dyn PropValue) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

/// Immutable type-indexed map. Adding a value copies the map, so a subtree
/// holding a `TreeProps` never observes changes made further down.
#[derive(Clone, Default)]
pub struct TreeProps {
    values: Arc<HashMap<TypeId, Arc<dyn PropValue>>>,
}

impl TreeProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of these props with `value` set for its type.
    pub fn with<T: PartialEq + fmt::Debug + Send + Sync + 'static>(&self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|value| value.as_any().downcast_ref::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for TreeProps {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.values, &other.values) {
            return true;
        }
        self.values.len() == other.values.len()
            && self.values.iter().all(|(type_id, value)| {
                other
                    .values
                    .get(type_id)
                    .is_some_and(|other| value.eq_value(other.as_ref()))
            })
    }
}

impl fmt::Debug for TreeProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.values()).finish()
    }
}
