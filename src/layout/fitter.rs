//! # Content Fitter
//!
//! Decides how much of one block fits in a vertical budget. A fragment is
//! first tried whole, using its measured height. When that does not fit, it
//! is decomposed into lines (once per pass, since that needs a measurement
//! query) and units are removed from its end until the rest fits:
//!
//! - the trailing footnote, when its marker is not on the last remaining
//!   line: the footnote moves to a later page than its marker, which is
//!   allowed;
//! - otherwise the trailing line, together with every footnote it marks, so
//!   a footnote never lands on a page before its marker.
//!
//! Removed units collect in the skipped buffers and become the fragment that
//! seeds the next page.

use std::ops::Range;

use log::trace;

use crate::model::FootnoteId;

/// Tolerance for floating point height comparisons.
pub(crate) const EPSILON: f64 = 0.01;

/// One line (or child element) of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    /// Distance from the top of this line to the top of the next one.
    pub height: f64,
    pub range: Range<usize>,
    /// Footnotes whose marker sits on this line.
    pub footnotes: Vec<FootnoteId>,
}

/// A footnote travelling with a fragment, with its estimated item height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingFootnote {
    pub id: FootnoteId,
    pub height: f64,
}

/// The working record for one block, or the remainder of one, during a pass.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// Index of the block in the article.
    pub block: usize,
    /// Text covered by this fragment.
    pub range: Range<usize>,
    /// Measured height; `None` when the rectangle cannot be trusted.
    pub height: Option<f64>,
    pub margin_top: f64,
    pub margin_bottom: f64,
    /// Line decomposition, computed lazily.
    pub lines: Option<Vec<LineRecord>>,
    /// Footnotes to be placed on the same page as this fragment, in marker
    /// order.
    pub footnotes: Vec<PendingFootnote>,
    /// Removed lines, last line first.
    pub skipped_lines: Vec<LineRecord>,
    /// Removed footnotes, last footnote first.
    pub skipped_footnotes: Vec<PendingFootnote>,
    pub skipped_height: f64,
    /// No rectangle and no lines: the block could not be measured.
    pub unmeasurable: bool,
}

impl Fragment {
    pub fn new(block: usize, range: Range<usize>, height: Option<f64>) -> Self {
        Self {
            block,
            range,
            height,
            margin_top: 0.0,
            margin_bottom: 0.0,
            lines: None,
            footnotes: Vec::new(),
            skipped_lines: Vec::new(),
            skipped_footnotes: Vec::new(),
            skipped_height: 0.0,
            unmeasurable: false,
        }
    }

    pub fn with_margins(mut self, top: f64, bottom: f64) -> Self {
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }

    /// Height of the flow content still in this fragment.
    pub fn content_height(&self) -> f64 {
        match &self.lines {
            Some(lines) => lines.iter().map(|l| l.height).sum(),
            None => self.height.unwrap_or(f64::INFINITY),
        }
    }

    pub fn footnote_height(&self) -> f64 {
        self.footnotes.iter().map(|f| f.height).sum()
    }

    pub fn has_skipped(&self) -> bool {
        !self.skipped_lines.is_empty() || !self.skipped_footnotes.is_empty()
    }

    /// Nothing left to place on this page.
    pub fn is_exhausted(&self) -> bool {
        self.footnotes.is_empty() && self.lines.as_ref().is_some_and(|l| l.is_empty())
    }

    /// Text range still held by this fragment.
    pub fn kept_range(&self) -> Range<usize> {
        match &self.lines {
            Some(lines) => match (lines.first(), lines.last()) {
                (Some(first), Some(last)) => first.range.start.max(self.range.start)..last.range.end,
                _ => self.range.start..self.range.start,
            },
            None => self.range.clone(),
        }
    }

    /// Vertical space this fragment needs: margins, content, its footnotes,
    /// and the footer gap when it opens the footer.
    pub fn required(&self, footer_is_empty: bool, footer_gap: f64) -> f64 {
        let margin_bottom = if self.skipped_lines.is_empty() {
            self.margin_bottom
        } else {
            0.0
        };
        let gap = if footer_is_empty && !self.footnotes.is_empty() {
            footer_gap
        } else {
            0.0
        };
        self.margin_top + self.content_height() + margin_bottom + self.footnote_height() + gap
    }

    fn ensure_lines(&mut self, measure: impl FnOnce() -> Vec<LineRecord>) {
        if self.lines.is_some() {
            return;
        }
        let lines = measure();
        if lines.is_empty() && self.height.is_none() {
            self.unmeasurable = true;
        }
        self.lines = Some(lines);
    }

    /// Shrink the fragment until it fits `space_available`. Returns the space
    /// the kept part requires, or 0 when nothing could be kept (the caller
    /// must start a new page for this fragment).
    pub fn crop_content(
        &mut self,
        space_available: f64,
        footer_is_empty: bool,
        footer_gap: f64,
        measure: impl FnOnce() -> Vec<LineRecord>,
    ) -> f64 {
        let required = self.required(footer_is_empty, footer_gap);
        if required <= space_available + EPSILON {
            return required;
        }

        self.ensure_lines(measure);
        if self.unmeasurable {
            return 0.0;
        }

        loop {
            let required = self.required(footer_is_empty, footer_gap);
            if required <= space_available + EPSILON {
                return required;
            }
            if self.is_exhausted() {
                return 0.0;
            }
            self.remove_unit();
        }
    }

    /// Remove one unit from the end: a detachable footnote, or the last line
    /// with its footnotes.
    fn remove_unit(&mut self) {
        let lines = self.lines.get_or_insert_with(Vec::new);
        let last_line_marks = lines.last().map(|l| l.footnotes.as_slice()).unwrap_or(&[]);

        if let Some(trailing) = self.footnotes.last() {
            if !last_line_marks.contains(&trailing.id) || lines.is_empty() {
                trace!("cropping footnote {} from block {}", trailing.id.0, self.block);
                if let Some(f) = self.footnotes.pop() {
                    self.skipped_footnotes.push(f);
                }
                return;
            }
        }

        if let Some(line) = lines.pop() {
            trace!("cropping line {:?} from block {}", line.range, self.block);
            let (moved, kept): (Vec<_>, Vec<_>) = self
                .footnotes
                .drain(..)
                .partition(|f| line.footnotes.contains(&f.id));
            self.footnotes = kept;
            self.skipped_footnotes.extend(moved.into_iter().rev());
            self.skipped_height += line.height;
            self.skipped_lines.push(line);
        }
    }

    /// Move the first skipped unit back so an empty page always makes
    /// progress, even when that unit alone overflows the page.
    pub fn keep_minimum(&mut self) {
        let lines = self.lines.get_or_insert_with(Vec::new);
        if lines.is_empty() {
            if let Some(line) = self.skipped_lines.pop() {
                self.skipped_height -= line.height;
                let marks = line.footnotes.clone();
                lines.push(line);
                // Deferred footnotes from earlier pages precede the line's own.
                while let Some(f) = self.skipped_footnotes.last().copied() {
                    let deferred = !self
                        .skipped_lines
                        .iter()
                        .any(|l| l.footnotes.contains(&f.id));
                    if marks.contains(&f.id) || deferred {
                        self.skipped_footnotes.pop();
                        self.footnotes.push(f);
                    } else {
                        break;
                    }
                }
                return;
            }
        }
        if self.footnotes.is_empty() {
            if let Some(f) = self.skipped_footnotes.pop() {
                self.footnotes.push(f);
            }
        }
    }

    /// Build the fragment for the next page out of the skipped buffers.
    pub fn take_spillover(&mut self) -> Option<Fragment> {
        if !self.has_skipped() {
            return None;
        }
        let mut lines: Vec<LineRecord> = self.skipped_lines.drain(..).collect();
        lines.reverse();
        let mut footnotes: Vec<PendingFootnote> = self.skipped_footnotes.drain(..).collect();
        footnotes.reverse();
        let start = lines.first().map_or(self.range.end, |l| l.range.start);
        self.skipped_height = 0.0;
        let margin_bottom = if lines.is_empty() {
            0.0
        } else {
            std::mem::take(&mut self.margin_bottom)
        };
        let mut rest = Fragment::new(self.block, start..self.range.end, None);
        rest.margin_bottom = margin_bottom;
        rest.lines = Some(lines);
        rest.footnotes = footnotes;
        if let Some(last) = self.lines.as_ref().and_then(|l| l.last()) {
            self.range.end = last.range.end;
        } else {
            self.range.end = self.range.start;
        }
        Some(rest)
    }
}
