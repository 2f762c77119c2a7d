//! A fixed-advance geometry provider.
//!
//! Every character advances by the same width and every line has the same
//! height, so heights are exact and predictable. Lines break at UAX #14
//! opportunities. Block-level children stack vertically; a table row is a
//! single unit as tall as its tallest cell.

use std::ops::Range;

use unicode_linebreak::{linebreaks, BreakOpportunity};

use super::{ComputedStyle, Display, GeometryProvider, LineFragment, Rect, WhiteSpace};
use crate::model::{Block, Content, Node};

#[derive(Debug, Clone)]
pub struct MonospaceGeometry {
    pub char_width: f64,
    pub line_height: f64,
    /// Line height inside footer list items.
    pub footnote_line_height: f64,
    /// Vertical space between consecutive footer list items.
    pub item_spacing: f64,
    /// Bottom margin of paragraphs, lists and tables; also the top margin
    /// of headings.
    pub block_margin: f64,
}

impl Default for MonospaceGeometry {
    fn default() -> Self {
        Self::new(6.0, 14.0)
    }
}

impl MonospaceGeometry {
    pub fn new(char_width: f64, line_height: f64) -> Self {
        Self {
            char_width,
            line_height,
            footnote_line_height: line_height,
            item_spacing: 0.0,
            block_margin: 0.0,
        }
    }

    pub fn with_footnote_line_height(mut self, height: f64) -> Self {
        self.footnote_line_height = height;
        self
    }

    pub fn with_item_spacing(mut self, spacing: f64) -> Self {
        self.item_spacing = spacing;
        self
    }

    pub fn with_block_margin(mut self, margin: f64) -> Self {
        self.block_margin = margin;
        self
    }

    fn columns(&self, width: f64) -> usize {
        if self.char_width <= 0.0 {
            return usize::MAX;
        }
        ((width / self.char_width).floor() as usize).max(1)
    }

    /// Lines of `block`, with tops relative to `top` and ranges shifted by
    /// `base`.
    fn lines_at(&self, block: &Block, width: f64, top: f64, base: usize) -> Vec<LineFragment> {
        let style = self.computed_style(block);
        if style.display == Display::None {
            return Vec::new();
        }
        if block.tag == "TR" {
            return self.row_line(block, width, top, base);
        }
        let has_block_children = !block.block_children().is_empty();
        if !has_block_children {
            let text = block.plain_text();
            let hidden = hidden_ranges(block, 0);
            return wrap(&text, &hidden, self.columns(width), style.white_space)
                .into_iter()
                .enumerate()
                .map(|(i, range)| {
                    let line_top = top + i as f64 * self.line_height;
                    let chars = width_of(&text, range.clone(), &hidden);
                    LineFragment {
                        top: line_top,
                        bottom: line_top + self.line_height,
                        left: 0.0,
                        right: (chars as f64 * self.char_width).min(width),
                        range: range.start + base..range.end + base,
                    }
                })
                .collect();
        }

        let Content::Nodes(nodes) = &block.content else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut y = top;
        let mut offset = base;
        let mut inline_run = String::new();
        let mut inline_hidden = Vec::new();
        let mut inline_start = offset;
        for node in nodes {
            match node {
                Node::Block(child) if child.is_block_level() => {
                    y = self.flush_inline(&inline_run, &inline_hidden, inline_start, width, y, &mut out);
                    inline_run.clear();
                    inline_hidden.clear();
                    let child_style = self.computed_style(child);
                    y += child_style.margin_top;
                    let lines = self.lines_at(child, width, y, offset);
                    if let Some(last) = lines.last() {
                        y = last.bottom;
                    }
                    y += child_style.margin_bottom;
                    out.extend(lines);
                    offset += child.text_len();
                    inline_start = offset;
                }
                other => {
                    if inline_run.is_empty() {
                        inline_start = offset;
                    }
                    match other {
                        Node::Text(s) => inline_run.push_str(s),
                        Node::Block(b) => {
                            inline_hidden.extend(hidden_ranges(b, inline_run.len()));
                            inline_run.push_str(&b.plain_text());
                        }
                    }
                    offset += other.text_len();
                }
            }
        }
        self.flush_inline(&inline_run, &inline_hidden, inline_start, width, y, &mut out);
        out
    }

    fn flush_inline(
        &self,
        text: &str,
        hidden: &[Range<usize>],
        base: usize,
        width: f64,
        top: f64,
        out: &mut Vec<LineFragment>,
    ) -> f64 {
        let mut y = top;
        for range in wrap(text, hidden, self.columns(width), WhiteSpace::Normal) {
            let chars = width_of(text, range.clone(), hidden);
            out.push(LineFragment {
                top: y,
                bottom: y + self.line_height,
                left: 0.0,
                right: (chars as f64 * self.char_width).min(width),
                range: range.start + base..range.end + base,
            });
            y += self.line_height;
        }
        y
    }

    fn row_line(&self, row: &Block, width: f64, top: f64, base: usize) -> Vec<LineFragment> {
        let cells = row.block_children();
        if cells.is_empty() || row.text_len() == 0 {
            return Vec::new();
        }
        let cell_width = width / cells.len() as f64;
        let tallest = cells
            .iter()
            .map(|cell| {
                self.lines_at(cell, cell_width, 0.0, 0)
                    .last()
                    .map_or(0.0, |l| l.bottom)
            })
            .fold(self.line_height, f64::max);
        vec![LineFragment {
            top,
            bottom: top + tallest,
            left: 0.0,
            right: width,
            range: base..base + row.text_len(),
        }]
    }
}

/// Text ranges of hidden markers inside `block`, shifted by `base`. Hidden
/// text keeps its offsets but takes no columns.
fn hidden_ranges(block: &Block, base: usize) -> Vec<Range<usize>> {
    block
        .markers()
        .into_iter()
        .filter(|m| m.hidden)
        .map(|m| base + m.range.start..base + m.range.end)
        .collect()
}

/// Columns taken by `text[range]`, without trailing spaces and hidden text.
fn width_of(text: &str, range: Range<usize>, hidden: &[Range<usize>]) -> usize {
    let start = range.start;
    text[range]
        .trim_end()
        .char_indices()
        .filter(|(i, _)| !hidden.iter().any(|h| h.contains(&(start + i))))
        .count()
}

/// Greedy line breaking over UAX #14 opportunities. The returned ranges
/// cover `text` completely and contiguously.
fn wrap(
    text: &str,
    hidden: &[Range<usize>],
    columns: usize,
    white_space: WhiteSpace,
) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    if text.is_empty() {
        return lines;
    }
    let wraps = matches!(white_space, WhiteSpace::Normal | WhiteSpace::PreWrap);
    let mut line_start = 0;
    let mut last_allowed: Option<usize> = None;

    for (pos, opportunity) in linebreaks(text) {
        if wraps {
            loop {
                let visible = width_of(text, line_start..pos, hidden);
                if visible <= columns {
                    break;
                }
                match last_allowed.take() {
                    Some(b) if b > line_start => {
                        lines.push(line_start..b);
                        line_start = b;
                    }
                    _ => break,
                }
            }
        }
        match opportunity {
            BreakOpportunity::Mandatory => {
                if pos > line_start {
                    lines.push(line_start..pos);
                }
                line_start = pos;
                last_allowed = None;
            }
            BreakOpportunity::Allowed => last_allowed = Some(pos),
        }
    }
    if line_start < text.len() {
        lines.push(line_start..text.len());
    }
    lines
}

impl GeometryProvider for MonospaceGeometry {
    fn block_rect(&self, block: &Block, width: f64) -> Option<Rect> {
        let lines = self.lines_at(block, width, 0.0, 0);
        let last = lines.last()?;
        Some(Rect::new(0.0, 0.0, last.bottom, width))
    }

    fn computed_style(&self, block: &Block) -> ComputedStyle {
        let display = if block.hidden {
            Display::None
        } else {
            match block.tag.as_str() {
                "LI" => Display::ListItem,
                "TABLE" => Display::Table,
                _ => Display::Block,
            }
        };
        let white_space = match block.tag.as_str() {
            "PRE" => WhiteSpace::Pre,
            _ => WhiteSpace::Normal,
        };
        let (margin_top, margin_bottom) = match block.tag.as_str() {
            "H1" | "H2" | "H3" | "H4" | "H5" | "H6" => (self.block_margin, self.block_margin),
            "P" | "UL" | "OL" | "TABLE" | "BLOCKQUOTE" | "PRE" => (0.0, self.block_margin),
            _ => (0.0, 0.0),
        };
        ComputedStyle {
            display,
            white_space,
            margin_top,
            margin_bottom,
        }
    }

    fn line_fragments(&self, block: &Block, width: f64) -> Vec<LineFragment> {
        self.lines_at(block, width, 0.0, 0)
    }

    fn footnote_rect(&self, content: &str, number: u32, width: f64) -> Option<Rect> {
        let item = format!("{number}. {content}");
        let lines = wrap(&item, &[], self.columns(width), WhiteSpace::Normal).len();
        if lines == 0 {
            return None;
        }
        Some(Rect::new(
            0.0,
            0.0,
            lines as f64 * self.footnote_line_height,
            width,
        ))
    }

    fn footer_height(&self, item_heights: &[f64]) -> f64 {
        let gaps = item_heights.len().saturating_sub(1) as f64;
        item_heights.iter().sum::<f64>() + gaps * self.item_spacing
    }
}
