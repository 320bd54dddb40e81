//! Built-in components.

use trellis_core::{
    Component, ComponentError, ComponentKind, Container, Element, Primitive, RenderScope,
};
use trellis_ui_layout::{Size, SizeSpec, Stack};

/// Stacks its children top to bottom.
#[derive(Debug, Default, PartialEq)]
pub struct Column {
    children: Vec<Element>,
    spacing: i32,
}

impl Column {
    pub fn new(children: impl IntoIterator<Item = Element>) -> Self {
        Self {
            children: children.into_iter().collect(),
            spacing: 0,
        }
    }

    pub fn spaced_by(mut self, spacing: i32) -> Self {
        self.spacing = spacing;
        self
    }
}

impl Component for Column {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Container(self)
    }
}

impl Container for Column {
    fn stack(&self) -> Stack {
        Stack::column().spaced_by(self.spacing)
    }

    fn children(&self, _: &mut RenderScope<'_, '_>) -> Result<Vec<Element>, ComponentError> {
        Ok(self.children.clone())
    }
}

/// Stacks its children left to right.
#[derive(Debug, Default, PartialEq)]
pub struct Row {
    children: Vec<Element>,
    spacing: i32,
}

impl Row {
    pub fn new(children: impl IntoIterator<Item = Element>) -> Self {
        Self {
            children: children.into_iter().collect(),
            spacing: 0,
        }
    }

    pub fn spaced_by(mut self, spacing: i32) -> Self {
        self.spacing = spacing;
        self
    }
}

impl Component for Row {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Container(self)
    }
}

impl Container for Row {
    fn stack(&self) -> Stack {
        Stack::row().spaced_by(self.spacing)
    }

    fn children(&self, _: &mut RenderScope<'_, '_>) -> Result<Vec<Element>, ComponentError> {
        Ok(self.children.clone())
    }
}

/// Empty leaf with a preferred size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Spacer {
    pub size: Size,
}

impl Spacer {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            size: Size::new(width, height),
        }
    }
}

impl Component for Spacer {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Primitive(self)
    }
}

impl Primitive for Spacer {
    fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, ComponentError> {
        Ok(Size::new(width.resolve(self.size.width), height.resolve(self.size.height)))
    }
}

/// Single line of monospaced text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Text {
    pub text: String,
    pub glyph_width: i32,
    pub line_height: i32,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            glyph_width: 8,
            line_height: 16,
        }
    }
}

impl Component for Text {
    fn kind(&self) -> ComponentKind<'_> {
        ComponentKind::Primitive(self)
    }
}

impl Primitive for Text {
    fn measure(&self, width: SizeSpec, height: SizeSpec) -> Result<Size, ComponentError> {
        let glyphs = i32::try_from(self.text.chars().count()).unwrap_or(i32::MAX);
        let content = glyphs.saturating_mul(self.glyph_width);
        Ok(Size::new(width.resolve(content), height.resolve(self.line_height)))
    }
}

#[cfg(test)]
#[path = "tests/widgets_tests.rs"]
mod tests;
