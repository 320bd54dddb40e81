//! Layout properties accumulated on a resolved node

use crate::{Edges, SizeSpec};

/// Layout-affecting properties attached to an element.
///
/// Every field is optional so that the properties of a delegating component
/// can be layered over the ones its rendered child declared: the outer
/// element wins wherever it set a value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayoutProps {
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub margin: Option<Edges>,
    pub padding: Option<Edges>,
}

impl LayoutProps {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layers `outer` over `self`.
    pub fn merged_with(&self, outer: &LayoutProps) -> LayoutProps {
        LayoutProps {
            width: outer.width.or(self.width),
            height: outer.height.or(self.height),
            margin: outer.margin.or(self.margin),
            padding: outer.padding.or(self.padding),
        }
    }

    pub fn margin(&self) -> Edges {
        self.margin.unwrap_or_default()
    }

    pub fn padding(&self) -> Edges {
        self.padding.unwrap_or_default()
    }

    /// Applies an explicit width, if any, on top of the spec the parent offered.
    pub fn width_spec(&self, offered: SizeSpec) -> SizeSpec {
        match self.width {
            Some(width) => SizeSpec::exactly(width),
            None => offered,
        }
    }

    /// Applies an explicit height, if any, on top of the spec the parent offered.
    pub fn height_spec(&self, offered: SizeSpec) -> SizeSpec {
        match self.height {
            Some(height) => SizeSpec::exactly(height),
            None => offered,
        }
    }
}
