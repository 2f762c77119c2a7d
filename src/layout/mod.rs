//! # Paginated Footnote Layout
//!
//! Pages are fixed rectangles and the footer of each page grows from the
//! bottom up, so every footnote placed on a page takes space away from the
//! flow content of that same page. That is a cycle: where a block breaks
//! depends on which footnotes share its page, and which footnotes share its
//! page depends on where it breaks.
//!
//! ## How a relayout works
//!
//! 1. Open page 0 and walk the article block by block.
//! 2. Ask the [`fitter`] how much of the block, together with the footnotes
//!    it marks, fits in the space left above the footer reserved so far.
//! 3. Place what fits, assign the kept footnotes to this page's footer and
//!    carry the rest to a new page.
//! 4. When the flow is exhausted, trim trailing empty pages and let
//!    [`LayoutSession::adjust_footer_position`] measure every footer.
//! 5. If a footer height or a footnote's page changed, run another pass with
//!    what was learned. Stop after `max_passes`; the last layout stands.
//!
//! From pass `hysteresis_after + 1` on, the [`placement`] rules keep
//! footnotes from bouncing back to an earlier page. Those pins carry over to
//! the next relayout, so running it again on an unchanged article gives the
//! same pages. A pin that pushes flow content into its footer is dropped.

pub mod fitter;
pub mod pages;
pub(crate) mod placement;

use std::ops::Range;

use log::{debug, warn};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::footnotes::FootnoteStore;
use crate::geometry::{Display, GeometryProvider, Rect};
use crate::model::{Block, FootnoteId};
use fitter::{Fragment, LineRecord, PendingFootnote};
use placement::{Pin, Placer};

/// Base direction of a footer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
}

/// A block, or part of one, placed on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedFragment {
    /// Index of the block in the article.
    pub block: usize,
    /// Text of the block shown on this page.
    pub range: Range<usize>,
    /// Top edge in surface coordinates.
    pub top: f64,
    pub height: f64,
}

#[derive(Debug, Clone)]
pub struct Footer {
    /// Footnotes shown in this footer, in marker order.
    pub footnotes: Vec<FootnoteId>,
    /// Rendered height of the footer list.
    pub height: f64,
    /// Filler between the last flow line and the footer list.
    pub pusher: f64,
    /// Part of `height` not accounted for by the items themselves (spacing
    /// between items). Learned from the previous pass.
    pub overhead: f64,
    pub direction: TextDirection,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    /// The sheet of paper in surface coordinates.
    pub paper_rect: Rect,
    /// The paper minus its margins.
    pub content_area: Rect,
    /// The content area minus the footer and its gap.
    pub available_area: Rect,
    pub footer: Footer,
    pub fragments: Vec<PlacedFragment>,
}

/// Outcome of one relayout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutReport {
    pub passes: usize,
    pub converged: bool,
}

/// The pages, footers and footnote records of one document.
#[derive(Debug, Clone)]
pub struct LayoutSession {
    config: EngineConfig,
    pub(crate) footnotes: FootnoteStore,
    pub(crate) pages: Vec<Page>,
    /// Pins of the current layout, re-applied by the next relayout.
    pins: Vec<Pin>,
}

/// Tracks where we are on the current page during a pass.
#[derive(Debug, Clone)]
struct PassCursor {
    pass: usize,
    page: usize,
    /// Flow height used on the current page, margins included.
    y: f64,
    /// Estimated height of the footer items placed on the current page.
    notes_height: f64,
    /// Flow units placed on the current page. Pinned footnotes do not count.
    units: usize,
}

impl LayoutSession {
    pub fn new(config: EngineConfig) -> Self {
        let first = Page::new(0, &config.page);
        Self {
            footnotes: FootnoteStore::new(config.recycle_bin_cap),
            pages: vec![first],
            pins: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn footnotes(&self) -> &FootnoteStore {
        &self.footnotes
    }

    pub fn footnotes_mut(&mut self) -> &mut FootnoteStore {
        &mut self.footnotes
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Page and item index of a footnote's footer entry.
    pub fn footnote_location(&self, id: FootnoteId) -> Option<(usize, usize)> {
        self.pages.iter().find_map(|page| {
            page.footer
                .footnotes
                .iter()
                .position(|f| *f == id)
                .map(|item| (page.index, item))
        })
    }

    /// The parts of the article placed on `page`, in order.
    pub fn page_blocks(&self, page: usize, article: &[Block]) -> Vec<Block> {
        let Some(page) = self.pages.get(page) else {
            return Vec::new();
        };
        page.fragments
            .iter()
            .filter_map(|f| article.get(f.block)?.slice(f.range.clone()))
            .collect()
    }

    /// Height of the footer item for `id`, measured once per number.
    pub(crate) fn measure_footnote(
        &mut self,
        id: FootnoteId,
        geometry: &dyn GeometryProvider,
        width: f64,
        fallback: f64,
    ) -> f64 {
        let Some(record) = self.footnotes.get_mut(id) else {
            return 0.0;
        };
        if let Some((number, height)) = record.measured {
            if number == record.number {
                return height;
            }
        }
        let height = match geometry
            .footnote_rect(&record.content, record.number, width)
            .filter(|r| !r.is_degenerate())
        {
            Some(rect) => rect.height(),
            None => {
                warn!("footnote {} could not be measured", id.0);
                fallback
            }
        };
        record.measured = Some((record.number, height));
        height
    }

    /// Lay out `article` until footers and footnote pages stop changing.
    pub fn relayout(&mut self, article: &[Block], geometry: &dyn GeometryProvider) -> LayoutReport {
        let max_passes = self.config.max_passes.max(1);
        let carried = std::mem::take(&mut self.pins);
        let mut placer = Placer::new(&self.footnotes, self.config.hysteresis_after, carried);
        let mut report = LayoutReport {
            passes: max_passes,
            converged: false,
        };
        for pass in 1..=max_passes {
            placer.begin_pass(pass);
            let changed = self.run_pass(pass, article, geometry, &mut placer);
            debug!(
                "layout pass {pass}: {} pages, {}",
                self.pages.len(),
                if changed { "changed" } else { "stable" }
            );
            if !changed {
                report = LayoutReport {
                    passes: pass,
                    converged: true,
                };
                break;
            }
        }
        if !report.converged {
            warn!("layout did not settle after {max_passes} passes; keeping the last one");
        }
        self.pins = placer.into_pins();
        report
    }

    /// One full pass over the article. Returns whether another pass is
    /// needed.
    fn run_pass(
        &mut self,
        pass: usize,
        article: &[Block],
        geometry: &dyn GeometryProvider,
        placer: &mut Placer,
    ) -> bool {
        let width = self.config.page.content_width();
        let content_height = self.config.page.content_height();
        let gap = self.config.page.footer_gap;

        let live: Vec<FootnoteId> = self.footnotes.live().map(|f| f.id).collect();
        for id in live {
            if let Some(record) = self.footnotes.get_mut(id) {
                record.page = None;
            }
        }

        let mut cursor = PassCursor {
            pass,
            page: self.start_new_page(0),
            y: 0.0,
            notes_height: 0.0,
            units: 0,
        };

        for (index, block) in article.iter().enumerate() {
            let Some((mut frag, markers)) = self.fragment_for(index, block, geometry, width) else {
                continue;
            };
            loop {
                placer.admit(&mut frag.footnotes, cursor.page);
                let footer = &self.pages[cursor.page].footer;
                let footer_is_empty = footer.is_empty();
                let overhead = footer.overhead;
                let reserved = if footer_is_empty {
                    0.0
                } else {
                    cursor.notes_height + gap + overhead
                };
                let space = content_height - cursor.y - reserved;
                frag.crop_content(space, footer_is_empty, gap + overhead, || {
                    line_records(geometry, block, width, &markers)
                });

                if frag.unmeasurable || (frag.is_exhausted() && !frag.has_skipped()) {
                    if frag.unmeasurable {
                        warn!("block {index} could not be measured; placing it without height");
                    }
                    if cursor.units > 0 {
                        self.next_page(&mut cursor, geometry, placer);
                    }
                    self.place_whole(&mut cursor, &frag);
                    break;
                }

                if frag.is_exhausted() {
                    if cursor.units > 0 {
                        let Some(rest) = frag.take_spillover() else {
                            break;
                        };
                        frag = rest;
                        self.next_page(&mut cursor, geometry, placer);
                        continue;
                    }
                    debug!("block {index} overflows page {}", cursor.page);
                    frag.keep_minimum();
                }

                self.place_kept(&mut cursor, &frag);
                match frag.take_spillover() {
                    Some(rest) => {
                        frag = rest;
                        self.next_page(&mut cursor, geometry, placer);
                    }
                    None => break,
                }
            }
        }

        // Footnotes pinned past the end of the content still get their page.
        while placer.has_pinned() {
            self.next_page(&mut cursor, geometry, placer);
        }
        self.finish_page(&cursor);
        self.trim_pages(cursor.page);

        let mut changed = false;
        for index in 0..self.pages.len() {
            changed |= self.adjust_footer_position(index, geometry);
        }
        let overflowing: Vec<usize> = self
            .pages
            .iter()
            .filter(|p| p.overflows())
            .map(|p| p.index)
            .collect();
        placer.end_pass(&self.footnotes, changed, &overflowing)
    }

    /// The working fragment for a whole block, with its live markers and
    /// their text offsets. `None` for blocks that take no space.
    fn fragment_for(
        &mut self,
        index: usize,
        block: &Block,
        geometry: &dyn GeometryProvider,
        width: f64,
    ) -> Option<(Fragment, Vec<(FootnoteId, usize)>)> {
        let style = geometry.computed_style(block);
        if style.display == Display::None || block.text_len() == 0 {
            return None;
        }
        let height = geometry
            .block_rect(block, width)
            .filter(|r| !r.is_degenerate())
            .map(|r| r.height());
        let markers: Vec<(FootnoteId, usize)> = block
            .markers()
            .into_iter()
            .filter(|m| !m.hidden && self.footnotes.get(m.id).is_some_and(|f| !f.deleted))
            .map(|m| (m.id, m.range.start))
            .collect();

        let fallback = self.config.page.content_height();
        let mut frag = Fragment::new(index, 0..block.text_len(), height)
            .with_margins(style.margin_top, style.margin_bottom);
        frag.footnotes = markers
            .iter()
            .map(|(id, _)| PendingFootnote {
                id: *id,
                height: self.measure_footnote(*id, geometry, width, fallback),
            })
            .collect();
        Some((frag, markers))
    }

    fn place_kept(&mut self, cursor: &mut PassCursor, frag: &Fragment) {
        let range = frag.kept_range();
        if !range.is_empty() {
            let content = frag.content_height();
            let margin_bottom = if frag.skipped_lines.is_empty() {
                frag.margin_bottom
            } else {
                0.0
            };
            let page = &mut self.pages[cursor.page];
            page.fragments.push(PlacedFragment {
                block: frag.block,
                range,
                top: page.content_area.top + cursor.y + frag.margin_top,
                height: content,
            });
            cursor.y += frag.margin_top + content + margin_bottom;
        }
        self.place_footnotes(cursor, &frag.footnotes);
        cursor.units += 1;
    }

    /// Place a fragment that cannot be split, with every footnote it holds.
    fn place_whole(&mut self, cursor: &mut PassCursor, frag: &Fragment) {
        let height = frag.height.unwrap_or(0.0);
        let page = &mut self.pages[cursor.page];
        page.fragments.push(PlacedFragment {
            block: frag.block,
            range: frag.range.clone(),
            top: page.content_area.top + cursor.y + frag.margin_top,
            height,
        });
        cursor.y += frag.margin_top + height + frag.margin_bottom;
        let mut notes = frag.footnotes.clone();
        notes.extend(frag.skipped_footnotes.iter().rev().copied());
        self.place_footnotes(cursor, &notes);
        cursor.units += 1;
    }

    fn place_footnotes(&mut self, cursor: &mut PassCursor, notes: &[PendingFootnote]) {
        for note in notes {
            if let Some(record) = self.footnotes.get_mut(note.id) {
                record.page = Some(cursor.page);
            }
            self.pages[cursor.page].footer.footnotes.push(note.id);
            cursor.notes_height += note.height;
        }
    }

    fn next_page(
        &mut self,
        cursor: &mut PassCursor,
        geometry: &dyn GeometryProvider,
        placer: &mut Placer,
    ) {
        self.finish_page(cursor);
        cursor.page = self.start_new_page(cursor.page + 1);
        cursor.y = 0.0;
        cursor.notes_height = 0.0;
        cursor.units = 0;
        if cursor.pass == 1 && cursor.page == 1 {
            // Let the host show the first page before the rest is laid out.
            geometry.settle();
        }
        let budget = self.config.page.content_height() - self.config.page.footer_gap;
        let pinned = placer.take_pinned(cursor.page, budget);
        self.place_footnotes(cursor, &pinned);
    }

    fn finish_page(&mut self, cursor: &PassCursor) {
        let content_height = self.config.page.content_height();
        let gap = self.config.page.footer_gap;
        if let Some(page) = self.pages.get_mut(cursor.page) {
            page.footer.pusher = if page.footer.is_empty() {
                0.0
            } else {
                (content_height - cursor.y - cursor.notes_height - gap - page.footer.overhead)
                    .max(0.0)
            };
        }
    }

    /// Serializable snapshot of the current layout.
    pub fn info(&self, article: &[Block]) -> LayoutInfo {
        LayoutInfo {
            pages: self
                .pages
                .iter()
                .map(|page| PageInfo {
                    index: page.index,
                    paper_rect: page.paper_rect,
                    content_area: page.content_area,
                    available_area: page.available_area,
                    fragments: page
                        .fragments
                        .iter()
                        .map(|f| FragmentInfo {
                            block: f.block,
                            start: f.range.start,
                            end: f.range.end,
                            top: f.top,
                            height: f.height,
                            text: article
                                .get(f.block)
                                .and_then(|b| b.slice(f.range.clone()))
                                .map(|b| b.plain_text())
                                .unwrap_or_default(),
                        })
                        .collect(),
                    footer: FooterInfo {
                        height: page.footer.height,
                        direction: page.footer.direction,
                        items: page
                            .footer
                            .footnotes
                            .iter()
                            .filter_map(|id| self.footnotes.get(*id))
                            .map(|f| FooterItemInfo {
                                id: f.id.0,
                                number: f.number,
                                content: f.content.clone(),
                            })
                            .collect(),
                    },
                })
                .collect(),
        }
    }
}

/// Decompose a block into line records. Each line's height runs to the top
/// of the next one, so the records add up to the block height. A marker
/// belongs to the last line starting at or before it.
fn line_records(
    geometry: &dyn GeometryProvider,
    block: &Block,
    width: f64,
    markers: &[(FootnoteId, usize)],
) -> Vec<LineRecord> {
    let lines = geometry.line_fragments(block, width);
    let Some(last) = lines.last() else {
        return Vec::new();
    };
    let bottom = geometry
        .block_rect(block, width)
        .filter(|r| !r.is_degenerate())
        .map_or(last.bottom, |r| r.height().max(last.bottom));

    let mut records: Vec<LineRecord> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let start = if i == 0 { 0.0 } else { line.top };
            let end = lines.get(i + 1).map_or(bottom, |next| next.top);
            LineRecord {
                height: (end - start).max(0.0),
                range: line.range.clone(),
                footnotes: Vec::new(),
            }
        })
        .collect();
    for (id, offset) in markers {
        let i = records
            .iter()
            .rposition(|l| l.range.start <= *offset)
            .unwrap_or(0);
        records[i].footnotes.push(*id);
    }
    records
}

// ── Serializable layout snapshot (for the CLI and host overlays) ────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutInfo {
    pub pages: Vec<PageInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub index: usize,
    pub paper_rect: Rect,
    pub content_area: Rect,
    pub available_area: Rect,
    pub fragments: Vec<FragmentInfo>,
    pub footer: FooterInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentInfo {
    pub block: usize,
    pub start: usize,
    pub end: usize,
    pub top: f64,
    pub height: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FooterInfo {
    pub height: f64,
    pub direction: TextDirection,
    pub items: Vec<FooterItemInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FooterItemInfo {
    pub id: u32,
    pub number: u32,
    pub content: String,
}
