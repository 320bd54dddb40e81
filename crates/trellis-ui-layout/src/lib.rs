//! Layout contracts & policies for Trellis
//!
//! Everything in this crate is plain `Copy` data plus the arithmetic the
//! layout engine needs: size specs, integer geometry, per-node layout
//! properties and the stacking policy used by the built-in containers.

mod axis;
mod geometry;
mod props;
mod size_spec;
mod stack;

pub use axis::*;
pub use geometry::*;
pub use props::*;
pub use size_spec::*;
pub use stack::*;

pub mod prelude {
    pub use crate::axis::Axis;
    pub use crate::geometry::{Edges, Point, Rect, Size};
    pub use crate::props::LayoutProps;
    pub use crate::size_spec::{is_size_spec_compatible, SizeMode, SizeSpec};
    pub use crate::stack::Stack;
}
