//! # Page Allocator
//!
//! Pages and their footers are kept across passes and across relayouts: a
//! pass walks the existing pages from the top, reusing each record, and only
//! creates a new one when content overflows the last. Trailing pages left
//! without content and without footnotes are trimmed at the end, but a
//! document always keeps at least one page.

use log::debug;
use unicode_bidi::{get_base_direction, Direction};

use super::fitter::EPSILON;
use super::{Footer, LayoutSession, Page, TextDirection};
use crate::geometry::{GeometryProvider, Rect};
use crate::model::PageConfig;

impl Page {
    pub(crate) fn new(index: usize, config: &PageConfig) -> Self {
        let (width, height) = config.size.dimensions();
        let top = index as f64 * (height + config.page_gap);
        let paper_rect = Rect::new(top, 0.0, top + height, width);
        let content_area = Rect::new(
            top + config.margin.top,
            config.margin.left,
            top + height - config.margin.bottom,
            width - config.margin.right,
        );
        Self {
            index,
            paper_rect,
            content_area,
            available_area: content_area,
            footer: Footer::new(),
            fragments: Vec::new(),
        }
    }

    /// Clear placement results before a pass. Footer height is kept so the
    /// pass can tell whether it changed.
    pub(crate) fn reset(&mut self) {
        self.fragments.clear();
        self.footer.footnotes.clear();
        self.footer.pusher = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && self.footer.footnotes.is_empty()
    }

    /// Flow content reaches into the footer's space.
    pub fn overflows(&self) -> bool {
        self.fragments
            .last()
            .is_some_and(|f| f.top + f.height > self.available_area.bottom + EPSILON)
    }
}

impl Footer {
    /// A footer is a list plus a pusher that keeps flow content clear of it.
    pub(crate) fn new() -> Self {
        Self {
            footnotes: Vec::new(),
            height: 0.0,
            pusher: 0.0,
            overhead: 0.0,
            direction: TextDirection::Ltr,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.footnotes.is_empty()
    }
}

impl LayoutSession {
    /// Make page `index` ready for placement, reusing an existing record when
    /// there is one. A new page comes with an empty footer. Returns the index.
    pub(crate) fn start_new_page(&mut self, index: usize) -> usize {
        if let Some(page) = self.pages.get_mut(index) {
            page.reset();
        } else {
            debug!("creating page {index}");
            self.pages.push(Page::new(index, &self.config.page));
        }
        index
    }

    /// Drop pages past `last_used` and any trailing empty pages, keeping at
    /// least one.
    pub(crate) fn trim_pages(&mut self, last_used: usize) {
        self.pages.truncate(last_used + 1);
        while self.pages.len() > 1 && self.pages.last().is_some_and(Page::is_empty) {
            self.pages.pop();
        }
        if self.pages.is_empty() {
            self.pages.push(Page::new(0, &self.config.page));
        }
    }

    /// Recompute the footer height of a page from its items and derive the
    /// content and available areas. Returns whether the footer height
    /// changed.
    pub fn adjust_footer_position(&mut self, index: usize, geometry: &dyn GeometryProvider) -> bool {
        let width = self.config.page.content_width();
        let gap = self.config.page.footer_gap;
        let fallback = self.config.page.content_height();
        let Some(ids) = self.pages.get(index).map(|p| p.footer.footnotes.clone()) else {
            return false;
        };

        let heights: Vec<f64> = ids
            .iter()
            .map(|id| self.measure_footnote(*id, geometry, width, fallback))
            .collect();
        let texts: Vec<String> = ids
            .iter()
            .filter_map(|id| self.footnotes.get(*id).map(|f| f.content.clone()))
            .collect();

        let Some(page) = self.pages.get_mut(index) else {
            return false;
        };
        let rendered = if heights.is_empty() {
            0.0
        } else {
            geometry.footer_height(&heights)
        };
        let changed = (rendered - page.footer.height).abs() > EPSILON;
        page.footer.height = rendered;
        page.footer.overhead = (rendered - heights.iter().sum::<f64>()).max(0.0);
        page.footer.direction = footer_direction(&texts);

        page.available_area = page.content_area;
        if !page.footer.is_empty() {
            page.available_area.bottom = page.content_area.bottom - rendered - gap;
        }
        changed
    }

    /// Top edge of a footer item in surface coordinates. Items are stacked
    /// upwards from the bottom of the content area.
    pub fn footer_item_top(
        &mut self,
        page: usize,
        item: usize,
        geometry: &dyn GeometryProvider,
    ) -> Option<f64> {
        let ids = self.pages.get(page)?.footer.footnotes.clone();
        let below = ids.get(item..).filter(|rest| !rest.is_empty())?;
        let width = self.config.page.content_width();
        let fallback = self.config.page.content_height();
        let heights: Vec<f64> = below
            .iter()
            .map(|id| self.measure_footnote(*id, geometry, width, fallback))
            .collect();
        let bottom = self.pages[page].content_area.bottom;
        Some(bottom - geometry.footer_height(&heights))
    }
}

/// Base direction of a footer: that of the first item with a strong
/// character.
pub(crate) fn footer_direction(texts: &[String]) -> TextDirection {
    for text in texts {
        match get_base_direction(text.as_str()) {
            Direction::Ltr => return TextDirection::Ltr,
            Direction::Rtl => return TextDirection::Rtl,
            Direction::Mixed => continue,
        }
    }
    TextDirection::Ltr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::geometry::monospace::MonospaceGeometry;
    use crate::layout::PlacedFragment;
    use crate::model::{Edges, FootnoteData, PageSize};

    fn session() -> LayoutSession {
        let mut config = EngineConfig::default();
        config.page.size = PageSize::Custom {
            width: 200.0,
            height: 300.0,
        };
        config.page.margin = Edges::uniform(10.0);
        config.page.footer_gap = 5.0;
        config.page.page_gap = 20.0;
        LayoutSession::new(config)
    }

    #[test]
    fn paper_rects_stack_with_gap() {
        let config = session().config().page.clone();
        let page = Page::new(2, &config);
        assert_eq!(page.paper_rect.top, 640.0);
        assert_eq!(page.content_area.top, 650.0);
        assert_eq!(page.content_area.bottom, 930.0);
    }

    #[test]
    fn start_new_page_reuses_records() {
        let mut s = session();
        assert_eq!(s.pages.len(), 1);
        s.start_new_page(1);
        assert_eq!(s.pages.len(), 2);
        s.pages[1].footer.height = 42.0;
        s.start_new_page(1);
        assert_eq!(s.pages.len(), 2);
        assert_eq!(s.pages[1].footer.height, 42.0);
    }

    #[test]
    fn new_page_has_an_empty_footer() {
        let mut s = session();
        s.start_new_page(1);
        let page = &s.pages[1];
        assert!(page.footer.is_empty());
        assert_eq!(page.footer.height, 0.0);
        assert_eq!(page.available_area, page.content_area);
    }

    #[test]
    fn flow_below_the_footer_top_overflows() {
        let mut s = session();
        let geo = MonospaceGeometry::new(6.0, 14.0).with_footnote_line_height(10.0);
        let id = s.footnotes.create(FootnoteData {
            content: "note".into(),
            ..Default::default()
        });
        s.footnotes.renumber(&[id]);
        s.pages[0].footer.footnotes.push(id);
        s.adjust_footer_position(0, &geo);
        s.pages[0].fragments.push(PlacedFragment {
            block: 0,
            range: 0..10,
            top: 10.0,
            height: 265.0,
        });
        assert!(!s.pages[0].overflows());
        s.pages[0].fragments[0].height = 266.0;
        assert!(s.pages[0].overflows());
    }

    #[test]
    fn trim_keeps_one_page() {
        let mut s = session();
        s.start_new_page(1);
        s.start_new_page(2);
        s.trim_pages(2);
        assert_eq!(s.pages.len(), 1);
    }

    #[test]
    fn footer_shrinks_available_area() {
        let mut s = session();
        let geo = MonospaceGeometry::new(6.0, 14.0).with_footnote_line_height(10.0);
        let id = s.footnotes.create(FootnoteData {
            content: "note".into(),
            ..Default::default()
        });
        s.footnotes.renumber(&[id]);
        s.pages[0].footer.footnotes.push(id);
        assert!(s.adjust_footer_position(0, &geo));
        let page = &s.pages[0];
        assert_eq!(page.footer.height, 10.0);
        assert_eq!(page.available_area.bottom, 290.0 - 10.0 - 5.0);
        assert!(!s.adjust_footer_position(0, &geo));
    }

    #[test]
    fn footer_items_stack_from_the_bottom() {
        let mut s = session();
        let geo = MonospaceGeometry::new(6.0, 14.0)
            .with_footnote_line_height(10.0)
            .with_item_spacing(2.0);
        let ids: Vec<_> = ["one", "two"]
            .iter()
            .map(|t| {
                s.footnotes.create(FootnoteData {
                    content: t.to_string(),
                    ..Default::default()
                })
            })
            .collect();
        s.footnotes.renumber(&ids);
        s.pages[0].footer.footnotes = ids;
        assert_eq!(s.footer_item_top(0, 1, &geo), Some(280.0));
        assert_eq!(s.footer_item_top(0, 0, &geo), Some(268.0));
        assert_eq!(s.footer_item_top(0, 2, &geo), None);
    }

    #[test]
    fn rtl_footer_direction() {
        assert_eq!(footer_direction(&["שלום".to_string()]), TextDirection::Rtl);
        assert_eq!(footer_direction(&["123".to_string(), "abc".to_string()]), TextDirection::Ltr);
        assert_eq!(footer_direction(&[]), TextDirection::Ltr);
    }
}
