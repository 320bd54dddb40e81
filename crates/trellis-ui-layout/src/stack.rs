//! Stacking policy for the built-in Row/Column containers

use crate::{Axis, Edges, Point, Size, SizeSpec};

/// Places children one after another along an axis.
///
/// This is intentionally simple: children are offered the container's
/// cross-axis space as an upper bound and unbounded main-axis space, and
/// are stacked with a fixed spacing. Real flex semantics belong to the
/// pluggable measure capability of each node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Stack {
    pub axis: Axis,
    pub spacing: i32,
}

impl Stack {
    pub fn column() -> Self {
        Self {
            axis: Axis::Vertical,
            spacing: 0,
        }
    }

    pub fn row() -> Self {
        Self {
            axis: Axis::Horizontal,
            spacing: 0,
        }
    }

    pub fn spaced_by(self, spacing: i32) -> Self {
        Self {
            spacing: spacing.max(0),
            ..self
        }
    }

    /// Specs offered to a child with the given margin.
    pub fn child_specs(
        &self,
        width: SizeSpec,
        height: SizeSpec,
        padding: Edges,
        margin: Edges,
    ) -> (SizeSpec, SizeSpec) {
        let cross_width = width
            .shrink(padding.horizontal_sum())
            .shrink(margin.horizontal_sum())
            .loosen();
        let cross_height = height
            .shrink(padding.vertical_sum())
            .shrink(margin.vertical_sum())
            .loosen();
        match self.axis {
            Axis::Vertical => (cross_width, SizeSpec::UNSPECIFIED),
            Axis::Horizontal => (SizeSpec::UNSPECIFIED, cross_height),
        }
    }

    /// Computes child offsets (relative to the container's origin) and the
    /// content size including padding.
    pub fn arrange(&self, padding: Edges, children: &[(Size, Edges)], out: &mut [Point]) -> Size {
        debug_assert_eq!(children.len(), out.len());
        let mut cursor = match self.axis {
            Axis::Vertical => padding.top,
            Axis::Horizontal => padding.left,
        };
        let mut cross: i32 = 0;
        for (index, ((size, margin), position)) in children.iter().zip(out.iter_mut()).enumerate() {
            if index > 0 {
                cursor = cursor.saturating_add(self.spacing);
            }
            match self.axis {
                Axis::Vertical => {
                    let y = cursor.saturating_add(margin.top);
                    *position = Point::new(padding.left.saturating_add(margin.left), y);
                    cursor = y.saturating_add(size.height).saturating_add(margin.bottom);
                    cross = cross.max(size.width.saturating_add(margin.horizontal_sum()));
                }
                Axis::Horizontal => {
                    let x = cursor.saturating_add(margin.left);
                    *position = Point::new(x, padding.top.saturating_add(margin.top));
                    cursor = x.saturating_add(size.width).saturating_add(margin.right);
                    cross = cross.max(size.height.saturating_add(margin.vertical_sum()));
                }
            }
        }
        match self.axis {
            Axis::Vertical => Size::new(
                cross.saturating_add(padding.horizontal_sum()),
                cursor.saturating_add(padding.bottom),
            ),
            Axis::Horizontal => Size::new(
                cursor.saturating_add(padding.right),
                cross.saturating_add(padding.vertical_sum()),
            ),
        }
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::column()
    }
}

#[cfg(test)]
#[path = "tests/stack_tests.rs"]
mod tests;
