//! # Geometry Provider
//!
//! The engine never shapes text. Everything it knows about sizes comes from a
//! [`GeometryProvider`]: block rectangles, line boxes and the computed style
//! values that affect vertical placement. In a browser host this is backed by
//! `getBoundingClientRect`/`getClientRects`; [`monospace::MonospaceGeometry`]
//! is a deterministic stand-in used by the CLI and the tests.

pub mod monospace;

use std::ops::Range;

use serde::Serialize;

use crate::model::Block;

/// An axis-aligned rectangle in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, bottom: f64, right: f64) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// A rectangle with no extent cannot be trusted for placement.
    pub fn is_degenerate(&self) -> bool {
        let h = self.height();
        !(h.is_finite() && h > 0.0)
    }
}

/// One rendered line (or, for containers, one child element) of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFragment {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
    /// Text covered by this fragment, in the block's byte offsets.
    pub range: Range<usize>,
}

impl LineFragment {
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// How a block participates in flow layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Display {
    #[default]
    Block,
    ListItem,
    Table,
    /// Not rendered; takes no space.
    None,
}

/// White-space handling that affects line breaking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum WhiteSpace {
    #[default]
    Normal,
    Pre,
    PreWrap,
    NoWrap,
}

/// The computed style values the layout engine reads.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComputedStyle {
    pub display: Display,
    pub white_space: WhiteSpace,
    pub margin_top: f64,
    pub margin_bottom: f64,
}

/// External measurement service.
///
/// Rectangles are relative to the block itself (top of the border box at 0).
/// Returning `None`, or a degenerate rectangle, is a measurement failure;
/// the engine treats it as "no space available" rather than an error.
pub trait GeometryProvider {
    /// Outer rectangle of `block` rendered at `width`.
    fn block_rect(&self, block: &Block, width: f64) -> Option<Rect>;

    fn computed_style(&self, block: &Block) -> ComputedStyle;

    /// Line boxes of `block` rendered at `width`, top to bottom.
    fn line_fragments(&self, block: &Block, width: f64) -> Vec<LineFragment>;

    /// Rectangle of a footer list item showing `content` with label `number`.
    fn footnote_rect(&self, content: &str, number: u32, width: f64) -> Option<Rect>;

    /// Height of a footer list holding items of the given heights.
    fn footer_height(&self, item_heights: &[f64]) -> f64 {
        item_heights.iter().sum()
    }

    /// Wait for pending surface mutations to be reflected in geometry.
    fn settle(&self) {}
}
