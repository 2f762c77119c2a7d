//! # Editable Surface
//!
//! The live, user-editable rendition of a document: the article (flow
//! blocks) and one footer list per page. It behaves like a content-editable
//! host: edits are applied in place and reported only as coarse mutation
//! records, never as a diff. In particular, deleting a footer item moves the
//! text of every later item up by one and removes the last node, so item
//! identity does not survive an edit.
//!
//! The reflow engine writes back through the same surface (rebuilt footer
//! lists, marker labels, hidden markers). Those writes produce records too;
//! the engine drains and discards them with [`EditableSurface::take_records`].

use std::ops::Range;

use crate::error::{PagenoteError, Result};
use crate::model::{Block, Content, FootnoteId, MarkerSpan, Node};

/// A change observed on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationRecord {
    /// Text or structure of an article block changed.
    ArticleText { block: usize },
    /// The set of footnote markers in the article changed.
    MarkerSet { block: usize },
    /// Items of a footer list were edited, added or removed.
    FooterContent { page: usize },
    /// A block's class attribute changed.
    ClassAttribute { block: usize },
}

/// Where a caret sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Article { block: usize },
    Footer { page: usize, item: usize },
}

/// A collapsed selection: a container plus a byte offset into its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caret {
    pub container: Container,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EditableSurface {
    article: Vec<Block>,
    footers: Vec<Vec<String>>,
    records: Vec<MutationRecord>,
    selection: Option<Caret>,
    scroll_top: f64,
}

impl EditableSurface {
    pub fn new(article: Vec<Block>) -> Self {
        Self {
            article,
            ..Default::default()
        }
    }

    pub fn article(&self) -> &[Block] {
        &self.article
    }

    pub fn footers(&self) -> &[Vec<String>] {
        &self.footers
    }

    pub fn footer(&self, page: usize) -> &[String] {
        self.footers.get(page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drain the pending mutation records.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn selection(&self) -> Option<Caret> {
        self.selection
    }

    pub fn set_selection(&mut self, caret: Option<Caret>) {
        self.selection = caret;
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn set_scroll_top(&mut self, scroll_top: f64) {
        self.scroll_top = scroll_top.max(0.0);
    }

    /// All markers of the article, hidden ones included, in document order.
    pub fn markers(&self) -> Vec<MarkerSpan> {
        self.article.iter().flat_map(Block::markers).collect()
    }

    // ── User edits ──────────────────────────────────────────────────

    pub fn replace_block(&mut self, index: usize, block: Block) -> Result<()> {
        let slot = self
            .article
            .get_mut(index)
            .ok_or_else(|| no_block(index))?;
        let old = std::mem::replace(slot, block);
        self.records.push(MutationRecord::ArticleText { block: index });
        if marker_ids(&old) != marker_ids(&self.article[index]) {
            self.records.push(MutationRecord::MarkerSet { block: index });
        }
        Ok(())
    }

    pub fn insert_block(&mut self, index: usize, block: Block) -> Result<()> {
        if index > self.article.len() {
            return Err(no_block(index));
        }
        let has_markers = !block.markers().is_empty();
        self.article.insert(index, block);
        self.records.push(MutationRecord::ArticleText { block: index });
        if has_markers {
            self.records.push(MutationRecord::MarkerSet { block: index });
        }
        Ok(())
    }

    pub fn remove_block(&mut self, index: usize) -> Result<Block> {
        if index >= self.article.len() {
            return Err(no_block(index));
        }
        let block = self.article.remove(index);
        self.records.push(MutationRecord::ArticleText { block: index });
        if !block.markers().is_empty() {
            self.records.push(MutationRecord::MarkerSet { block: index });
        }
        Ok(block)
    }

    /// Type `text` at `offset` of a block.
    pub fn insert_text(&mut self, index: usize, offset: usize, text: &str) -> Result<()> {
        let block = self.block_at(index, offset..offset)?;
        match splice(block, offset..offset, Some(Node::Text(text.to_string()))) {
            Some(edited) => self.replace_block(index, edited),
            None => Ok(()),
        }
    }

    /// Delete a text range of a block. Markers inside the range go with it;
    /// a block left empty is removed.
    pub fn delete_text(&mut self, index: usize, range: Range<usize>) -> Result<()> {
        let block = self.block_at(index, range.clone())?;
        match splice(block, range, None) {
            Some(edited) => self.replace_block(index, edited),
            None => self.remove_block(index).map(|_| ()),
        }
    }

    /// Set or clear a block's class attribute (junk marking in cleanup mode).
    pub fn set_class(&mut self, index: usize, class: Option<String>) -> Result<()> {
        let block = self
            .article
            .get_mut(index)
            .ok_or_else(|| no_block(index))?;
        block.class = class;
        self.records.push(MutationRecord::ClassAttribute { block: index });
        Ok(())
    }

    pub fn edit_footer_item(&mut self, page: usize, item: usize, text: &str) -> Result<()> {
        let slot = self
            .footers
            .get_mut(page)
            .and_then(|f| f.get_mut(item))
            .ok_or_else(|| no_item(page, item))?;
        *slot = text.to_string();
        self.records.push(MutationRecord::FooterContent { page });
        Ok(())
    }

    /// Delete a footer item the way a content-editable list does it: the
    /// text of every later item moves up one slot and the last node goes.
    pub fn delete_footer_item(&mut self, page: usize, item: usize) -> Result<()> {
        let list = self
            .footers
            .get_mut(page)
            .filter(|f| item < f.len())
            .ok_or_else(|| no_item(page, item))?;
        for i in item..list.len() - 1 {
            list.swap(i, i + 1);
        }
        list.pop();
        self.records.push(MutationRecord::FooterContent { page });
        Ok(())
    }

    /// Insert a footer item, as an undo of a deletion does.
    pub fn insert_footer_item(&mut self, page: usize, item: usize, text: &str) -> Result<()> {
        let list = self
            .footers
            .get_mut(page)
            .filter(|f| item <= f.len())
            .ok_or_else(|| no_item(page, item))?;
        list.insert(item, text.to_string());
        self.records.push(MutationRecord::FooterContent { page });
        Ok(())
    }

    // ── Engine writes ───────────────────────────────────────────────

    /// Make the number of footer lists match the number of pages.
    pub(crate) fn set_page_count(&mut self, pages: usize) {
        if self.footers.len() != pages {
            self.footers.resize_with(pages, Vec::new);
            self.records.push(MutationRecord::FooterContent {
                page: pages.saturating_sub(1),
            });
        }
    }

    pub(crate) fn replace_footer_children(&mut self, page: usize, items: Vec<String>) {
        if page >= self.footers.len() {
            self.footers.resize_with(page + 1, Vec::new);
        }
        self.footers[page] = items;
        self.records.push(MutationRecord::FooterContent { page });
    }

    /// Insert a marker node at a text offset of a block.
    pub(crate) fn insert_marker(&mut self, index: usize, offset: usize, marker: Block) -> Result<()> {
        self.block_at(index, offset..offset)?;
        if !self.article[index].insert_marker(offset, marker) {
            return Err(PagenoteError::InvalidEdit(format!(
                "offset {offset} is outside block {index}"
            )));
        }
        self.records.push(MutationRecord::ArticleText { block: index });
        self.records.push(MutationRecord::MarkerSet { block: index });
        Ok(())
    }

    /// Remove the marker node for `id` entirely.
    pub(crate) fn remove_marker(&mut self, id: FootnoteId) -> bool {
        for (index, block) in self.article.iter_mut().enumerate() {
            if remove_marker_node(block, id) {
                self.records.push(MutationRecord::MarkerSet { block: index });
                return true;
            }
        }
        false
    }

    /// Rewrite the label of every marker for `id`. Returns whether anything
    /// changed.
    pub(crate) fn set_marker_label(&mut self, id: FootnoteId, label: &str) -> bool {
        self.update_markers(id, |marker| {
            if marker.plain_text() == label {
                return false;
            }
            marker.content = Content::Text(label.to_string());
            true
        })
    }

    pub(crate) fn set_marker_hidden(&mut self, id: FootnoteId, hidden: bool) -> bool {
        self.update_markers(id, |marker| {
            let changed = marker.hidden != hidden;
            marker.hidden = hidden;
            changed
        })
    }

    /// Turn markers for `id` into plain superscript text.
    pub(crate) fn unlink_marker(&mut self, id: FootnoteId) -> bool {
        self.update_markers(id, |marker| {
            marker.marker = None;
            true
        })
    }

    /// Unlink every marker whose id already appeared earlier in the article
    /// (a pasted copy). Returns the number of markers unlinked.
    pub(crate) fn unlink_duplicate_markers(&mut self) -> usize {
        let mut seen: Vec<FootnoteId> = Vec::new();
        let mut unlinked = 0;
        for (index, block) in self.article.iter_mut().enumerate() {
            let before = unlinked;
            block.for_each_marker_mut(&mut |marker| {
                let Some(id) = marker.marker else { return };
                if seen.contains(&id) {
                    marker.marker = None;
                    unlinked += 1;
                } else {
                    seen.push(id);
                }
            });
            if unlinked > before {
                self.records.push(MutationRecord::MarkerSet { block: index });
            }
        }
        unlinked
    }

    fn update_markers(&mut self, id: FootnoteId, mut f: impl FnMut(&mut Block) -> bool) -> bool {
        let mut any = false;
        for (index, block) in self.article.iter_mut().enumerate() {
            let mut changed = false;
            block.for_each_marker_mut(&mut |marker| {
                if marker.marker == Some(id) {
                    changed |= f(marker);
                }
            });
            if changed {
                self.records.push(MutationRecord::ArticleText { block: index });
                any = true;
            }
        }
        any
    }

    fn block_at(&self, index: usize, range: Range<usize>) -> Result<&Block> {
        let block = self.article.get(index).ok_or_else(|| no_block(index))?;
        let text = block.plain_text();
        let valid = range.start <= range.end
            && range.end <= text.len()
            && text.is_char_boundary(range.start)
            && text.is_char_boundary(range.end);
        if !valid {
            return Err(PagenoteError::InvalidEdit(format!(
                "range {range:?} is not valid in block {index}"
            )));
        }
        Ok(block)
    }
}

fn no_block(index: usize) -> PagenoteError {
    PagenoteError::InvalidEdit(format!("no block at index {index}"))
}

fn no_item(page: usize, item: usize) -> PagenoteError {
    PagenoteError::InvalidEdit(format!("no footer item {item} on page {page}"))
}

fn marker_ids(block: &Block) -> Vec<(FootnoteId, bool)> {
    block.markers().into_iter().map(|m| (m.id, m.hidden)).collect()
}

/// Replace `range` of a block's text with `insert`, keeping the structure
/// around it. `None` when nothing is left.
fn splice(block: &Block, range: Range<usize>, insert: Option<Node>) -> Option<Block> {
    let len = block.text_len();
    let mut nodes = Vec::new();
    if let Some(head) = block.slice(0..range.start) {
        nodes.extend(into_nodes(head));
    }
    nodes.extend(insert);
    if let Some(tail) = block.slice(range.end..len) {
        nodes.extend(into_nodes(tail));
    }
    Block {
        content: Content::Nodes(nodes),
        ..block.clone()
    }
    .normalize()
}

fn into_nodes(block: Block) -> Vec<Node> {
    match block.content {
        Content::Text(s) => vec![Node::Text(s)],
        Content::Nodes(nodes) => nodes,
    }
}

fn remove_marker_node(block: &mut Block, id: FootnoteId) -> bool {
    let Content::Nodes(nodes) = &mut block.content else {
        return false;
    };
    let before = nodes.len();
    nodes.retain(|n| !matches!(n, Node::Block(b) if b.marker == Some(id)));
    if nodes.len() != before {
        return true;
    }
    nodes.iter_mut().any(|n| match n {
        Node::Block(b) => remove_marker_node(b, id),
        Node::Text(_) => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_with_marker() -> EditableSurface {
        let mut p = Block::text("P", "Some text");
        p.insert_marker(4, Block::marker(FootnoteId(1), "1"));
        let mut surface = EditableSurface::new(vec![p, Block::text("P", "More")]);
        surface.replace_footer_children(0, vec!["a".into(), "b".into(), "c".into()]);
        surface.take_records();
        surface
    }

    #[test]
    fn deleting_a_footer_item_shifts_later_items() {
        let mut s = surface_with_marker();
        s.delete_footer_item(0, 0).unwrap();
        assert_eq!(s.footer(0), ["b", "c"]);
        assert_eq!(s.take_records(), vec![MutationRecord::FooterContent { page: 0 }]);
        assert!(s.delete_footer_item(0, 5).is_err());
    }

    #[test]
    fn deleting_marker_text_reports_marker_change() {
        let mut s = surface_with_marker();
        s.delete_text(0, 3..5).unwrap();
        assert_eq!(s.article()[0].plain_text(), "Som text");
        let records = s.take_records();
        assert!(records.contains(&MutationRecord::ArticleText { block: 0 }));
        assert!(records.contains(&MutationRecord::MarkerSet { block: 0 }));
        assert!(s.markers().is_empty());
    }

    #[test]
    fn typing_keeps_markers() {
        let mut s = surface_with_marker();
        s.insert_text(0, 0, "Here is ").unwrap();
        assert_eq!(s.article()[0].plain_text(), "Here is Some1 text");
        assert_eq!(s.take_records(), vec![MutationRecord::ArticleText { block: 0 }]);
        assert_eq!(s.markers()[0].range, 12..13);
    }

    #[test]
    fn deleting_a_whole_block_removes_it() {
        let mut s = surface_with_marker();
        s.delete_text(1, 0..4).unwrap();
        assert_eq!(s.article().len(), 1);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let mut s = EditableSurface::new(vec![Block::text("P", "héllo")]);
        assert!(s.delete_text(0, 1..2).is_err());
        assert!(s.insert_text(0, 99, "x").is_err());
        assert!(s.insert_text(3, 0, "x").is_err());
    }

    #[test]
    fn engine_writes_are_recorded() {
        let mut s = surface_with_marker();
        assert!(s.set_marker_hidden(FootnoteId(1), true));
        assert!(!s.set_marker_hidden(FootnoteId(1), true));
        assert!(s.set_marker_label(FootnoteId(1), "2"));
        assert_eq!(s.take_records().len(), 2);
        assert!(s.markers()[0].hidden);
    }

    #[test]
    fn pasted_marker_copies_are_unlinked() {
        let mut s = surface_with_marker();
        let copy = s.article()[0].clone();
        s.insert_block(1, copy).unwrap();
        assert_eq!(s.unlink_duplicate_markers(), 1);
        assert_eq!(s.markers().len(), 1);
    }

    #[test]
    fn class_changes_are_their_own_kind() {
        let mut s = surface_with_marker();
        s.set_class(1, Some("junk".into())).unwrap();
        assert!(s.article()[1].has_class("junk"));
        assert_eq!(s.take_records(), vec![MutationRecord::ClassAttribute { block: 1 }]);
    }
}
