//! Stable identities for components in a resolved tree.
//!
//! A [`GlobalKey`] is the path of per-sibling keys from the root down to a
//! component, joined with [`KEY_SEPARATOR`]. A component's own key is its
//! explicit key if it has one, otherwise its type name. Siblings that end
//! up with the same key are disambiguated in document order by appending
//! `!N`, where `N` counts the earlier occurrences.

use std::fmt;
use std::sync::Arc;

use crate::collections::map::{HashMap, HashSet};

/// Separates the segments of a global key.
pub const KEY_SEPARATOR: char = ',';

/// Introduces the numeric disambiguator on a colliding sibling key.
pub const DUPLICATE_KEY_MARKER: char = '!';

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalKey(Arc<str>);

impl GlobalKey {
    /// Key of a tree root.
    pub fn root(key: &str) -> Self {
        Self(Arc::from(key))
    }

    /// Key of a child of `self` whose own key is `key`.
    pub fn child(&self, key: &str) -> Self {
        let mut joined = String::with_capacity(self.0.len() + 1 + key.len());
        joined.push_str(&self.0);
        joined.push(KEY_SEPARATOR);
        joined.push_str(key);
        Self(Arc::from(joined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when `other` lives strictly below `self`.
    pub fn is_ancestor_of(&self, other: &GlobalKey) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&*self.0)
            && other.0[self.0.len()..].starts_with(KEY_SEPARATOR)
    }

    /// Returns true when `other` is `self` or lives below it.
    pub fn contains(&self, other: &GlobalKey) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    pub fn parent(&self) -> Option<GlobalKey> {
        self.0
            .rfind(KEY_SEPARATOR)
            .map(|index| Self(Arc::from(&self.0[..index])))
    }

    /// The last path segment, i.e. the component's own (possibly rewritten) key.
    pub fn last_segment(&self) -> &str {
        match self.0.rfind(KEY_SEPARATOR) {
            Some(index) => &self.0[index + 1..],
            None => &self.0,
        }
    }

    /// Moves `self` from below `from` to the same place below `to`.
    /// `None` when `self` is not within `from`.
    pub fn rebased(&self, from: &GlobalKey, to: &GlobalKey) -> Option<GlobalKey> {
        if !from.contains(self) {
            return None;
        }
        let mut joined = String::with_capacity(to.0.len() + self.0.len() - from.0.len());
        joined.push_str(&to.0);
        joined.push_str(&self.0[from.0.len()..]);
        Some(Self(Arc::from(joined)))
    }

    pub fn depth(&self) -> usize {
        self.0.matches(KEY_SEPARATOR).count()
    }
}

impl fmt::Debug for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalKey({})", self.0)
    }
}

impl fmt::Display for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Two siblings were given the same explicit key.
    DuplicateExplicitKey,
    /// Two unkeyed siblings share a component type.
    DuplicateTypeKey,
}

/// Record of a sibling key that had to be rewritten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDiagnostic {
    pub kind: DiagnosticKind,
    pub parent: Option<GlobalKey>,
    pub key: Arc<str>,
    pub rewritten: GlobalKey,
    pub occurrence: usize,
}

impl fmt::Display for KeyDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parent = self
            .parent
            .as_ref()
            .map(GlobalKey::as_str)
            .unwrap_or("<root>");
        match self.kind {
            DiagnosticKind::DuplicateExplicitKey => write!(
                f,
                "found another component with key '{}' under '{}'; using '{}'",
                self.key, parent, self.rewritten
            ),
            DiagnosticKind::DuplicateTypeKey => write!(
                f,
                "unkeyed sibling of type '{}' under '{}' renamed to '{}'",
                self.key, parent, self.rewritten
            ),
        }
    }
}

/// Hands out collision-free keys for the children of one parent.
#[derive(Default)]
pub struct SiblingKeys {
    taken: HashSet<Arc<str>>,
    next_suffix: HashMap<Arc<str>, usize>,
}

impl SiblingKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the global key for the next child in document order.
    ///
    /// `base` is the child's explicit key or type name. The first child with
    /// a given base keeps it unchanged; later ones get `base!1`, `base!2`...
    /// A suffixed candidate that is itself already taken is skipped.
    pub fn assign(
        &mut self,
        parent: Option<&GlobalKey>,
        base: &str,
        explicit: bool,
    ) -> (GlobalKey, Option<KeyDiagnostic>) {
        if !self.taken.contains(base) {
            self.taken.insert(Arc::from(base));
            return (join(parent, base), None);
        }

        let mut occurrence = self.next_suffix.get(base).copied().unwrap_or(1);
        let unique = loop {
            let candidate = format!("{base}{DUPLICATE_KEY_MARKER}{occurrence}");
            if !self.taken.contains(candidate.as_str()) {
                break candidate;
            }
            occurrence += 1;
        };
        self.next_suffix.insert(Arc::from(base), occurrence + 1);
        self.taken.insert(Arc::from(unique.as_str()));

        let rewritten = join(parent, &unique);
        let diagnostic = KeyDiagnostic {
            kind: if explicit {
                DiagnosticKind::DuplicateExplicitKey
            } else {
                DiagnosticKind::DuplicateTypeKey
            },
            parent: parent.cloned(),
            key: Arc::from(base),
            rewritten: rewritten.clone(),
            occurrence,
        };
        (rewritten, Some(diagnostic))
    }
}

fn join(parent: Option<&GlobalKey>, key: &str) -> GlobalKey {
    match parent {
        Some(parent) => parent.child(key),
        None => GlobalKey::root(key),
    }
}

#[cfg(test)]
#[path = "tests/key_tests.rs"]
mod tests;
