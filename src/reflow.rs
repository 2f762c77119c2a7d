//! # Reflow Controller
//!
//! Owns one document: its [`LayoutSession`], its [`EditableSurface`] and the
//! geometry and storage collaborators. After the user edits the surface,
//! [`ReflowController::process`] drains the mutation records and decides
//! what has to be redone:
//!
//! | change            | work                                                        |
//! |-------------------|-------------------------------------------------------------|
//! | article text      | relayout, autosave                                          |
//! | marker set        | renumber; relayout if anything changed; autosave            |
//! | footer content    | reconcile identity; on add/remove renumber and relayout,    |
//! |                   | else relayout if the footer height changed, else only       |
//! |                   | re-derive the footer direction; autosave                    |
//! | class attribute   | autosave                                                    |
//!
//! Within a batch, marker changes go first, then footer changes, then the
//! relayout. The controller's own writes back to the surface (footer lists,
//! labels, hidden markers) are drained and dropped at the end, so they never
//! trigger another round. A caret inside a footer follows its footnote
//! through the rebuild, and the view scrolls so the caret stays put on
//! screen.

use std::ops::{Deref, DerefMut};
use std::time::Instant;

use log::{debug, error, warn};

use crate::autosave::{Autosave, DocumentStore};
use crate::config::EngineConfig;
use crate::error::{PagenoteError, Result};
use crate::footnotes::{marker_order, FootnoteStore, Reconciliation};
use crate::geometry::GeometryProvider;
use crate::layout::{LayoutReport, LayoutSession};
use crate::model::{Block, Content, FootnoteData, FootnoteId, Node, SavedDocument};
use crate::surface::{Caret, Container, EditableSurface, MutationRecord};

/// What one call to [`ReflowController::process`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReflowOutcome {
    /// Footnote numbers changed.
    pub renumbered: bool,
    /// Footer lists that were reconciled, by page.
    pub reconciled: Vec<(usize, Reconciliation)>,
    /// Set when a relayout ran.
    pub layout: Option<LayoutReport>,
    pub save_scheduled: bool,
}

/// The record kinds of one batch, folded together.
#[derive(Debug, Default)]
struct Batch {
    article: bool,
    markers: bool,
    footers: Vec<usize>,
    classes: bool,
}

impl Batch {
    fn from_records(records: &[MutationRecord]) -> Self {
        let mut batch = Batch::default();
        for record in records {
            match record {
                MutationRecord::ArticleText { .. } => batch.article = true,
                MutationRecord::MarkerSet { .. } => batch.markers = true,
                MutationRecord::FooterContent { page } => batch.footers.push(*page),
                MutationRecord::ClassAttribute { .. } => batch.classes = true,
            }
        }
        batch.footers.sort_unstable();
        batch.footers.dedup();
        batch
    }

    fn is_empty(&self) -> bool {
        !self.article && !self.markers && self.footers.is_empty() && !self.classes
    }
}

/// A footer caret captured before a rebuild.
#[derive(Debug, Clone, Copy)]
struct CursorAnchor {
    page: usize,
    item: usize,
    offset: usize,
    /// Item top before the rebuild, in surface coordinates.
    top: f64,
    footnote: Option<FootnoteId>,
}

pub struct ReflowController<G: GeometryProvider, S: DocumentStore> {
    session: LayoutSession,
    surface: EditableSurface,
    geometry: G,
    store: S,
    autosave: Autosave,
    title: String,
    lang: Option<String>,
}

impl<G: GeometryProvider, S: DocumentStore> ReflowController<G, S> {
    /// Load a saved document and lay it out.
    pub fn new(doc: SavedDocument, config: EngineConfig, geometry: G, store: S) -> Self {
        let autosave = Autosave::new(config.autosave_delay());
        let mut session = LayoutSession::new(config);
        let article = load_article(doc.content, &mut session);
        let mut controller = Self {
            session,
            surface: EditableSurface::new(article),
            geometry,
            store,
            autosave,
            title: doc.title,
            lang: doc.lang,
        };
        let report = controller
            .session
            .relayout(controller.surface.article(), &controller.geometry);
        debug!(
            "opened \"{}\": {} pages after {} passes",
            controller.title,
            controller.session.pages().len(),
            report.passes
        );
        controller.render();
        controller.surface.take_records();
        controller
    }

    /// Load the document stored under `key`.
    pub fn open(key: &str, config: EngineConfig, geometry: G, store: S) -> Result<Self> {
        let doc = store.load_document(key)?;
        Ok(Self::new(doc, config, geometry, store))
    }

    pub fn session(&self) -> &LayoutSession {
        &self.session
    }

    pub fn surface(&self) -> &EditableSurface {
        &self.surface
    }

    /// The surface, for user edits. Call [`process`](Self::process)
    /// afterwards.
    pub fn surface_mut(&mut self) -> &mut EditableSurface {
        &mut self.surface
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn autosave(&self) -> &Autosave {
        &self.autosave
    }

    /// Handle every change recorded on the surface since the last call.
    pub fn process(&mut self, now: Instant) -> ReflowOutcome {
        let batch = Batch::from_records(&self.surface.take_records());
        let mut outcome = ReflowOutcome::default();
        if batch.is_empty() {
            return outcome;
        }
        debug!("processing batch {batch:?}");
        let mut anchor = self.capture_cursor();
        let mut relayout = batch.article;

        if batch.markers {
            let (renumbered, membership) = self.sync_markers();
            outcome.renumbered |= renumbered;
            relayout |= renumbered || membership;
        }

        for &page in &batch.footers {
            let rec = self.reconcile_footer(page);
            if let Some(a) = anchor.as_mut().filter(|a| a.page == page) {
                a.footnote = rec.owners.get(a.item).copied().flatten();
            }
            if rec.membership_changed() {
                outcome.renumbered |= self.renumber();
                relayout = true;
            } else if !relayout {
                // Also re-derives the footer's text direction.
                relayout |= self.session.adjust_footer_position(page, &self.geometry);
            }
            outcome.reconciled.push((page, rec));
        }

        if let Some(a) = anchor.as_mut().filter(|a| a.footnote.is_none()) {
            if !batch.footers.contains(&a.page) {
                a.footnote = self.footnote_at(a.page, a.item);
            }
        }

        if relayout {
            outcome.layout = Some(self.session.relayout(self.surface.article(), &self.geometry));
        }
        self.render();
        if let Some(anchor) = anchor {
            self.restore_cursor(anchor);
        }
        let own = self.surface.take_records();
        debug!("dropped {} records from corrective writes", own.len());

        self.autosave.schedule(now);
        outcome.save_scheduled = true;
        outcome
    }

    /// Insert a new footnote marker at `offset` of block `block`.
    ///
    /// A recycled footnote whose hidden marker sits at the same place is
    /// discarded for good: the new footnote takes its slot.
    pub fn annotate(
        &mut self,
        block: usize,
        offset: usize,
        data: FootnoteData,
        now: Instant,
    ) -> Result<FootnoteId> {
        let markers = self
            .surface
            .article()
            .get(block)
            .ok_or_else(|| PagenoteError::InvalidEdit(format!("no block at index {block}")))?
            .markers();
        let bin = self.session.footnotes().bin();
        let slot = markers
            .iter()
            .find(|m| m.hidden && m.range.start == offset && bin.contains(&m.id))
            .map(|m| m.id);
        if let Some(old) = slot {
            debug!("footnote {} discarded; its slot is reused", old.0);
            self.surface.remove_marker(old);
            self.session.footnotes_mut().discard(old);
        }

        let id = self.session.footnotes_mut().create(data);
        if let Err(e) = self.surface.insert_marker(block, offset, Block::marker(id, "")) {
            self.session.footnotes_mut().discard(id);
            return Err(e);
        }
        self.process(now);
        Ok(id)
    }

    /// The document as it should be saved: live markers carry their
    /// footnote payload, recycled ones are left out.
    pub fn to_document(&self) -> SavedDocument {
        let store = self.session.footnotes();
        SavedDocument {
            title: self.title.clone(),
            lang: self.lang.clone(),
            content: self
                .surface
                .article()
                .iter()
                .filter_map(|b| export_block(b, store))
                .collect(),
        }
    }

    /// Save if the debounce period has elapsed. Returns whether a save ran.
    pub fn poll(&mut self, now: Instant) -> Result<bool> {
        if !self.autosave.take_due(now) {
            return Ok(false);
        }
        self.save().map(|_| true)
    }

    /// Save now if anything is pending.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.autosave.take_pending() {
            return Ok(false);
        }
        self.save().map(|_| true)
    }

    /// Wrap the controller so that a pending save is flushed when the
    /// wrapper goes out of scope.
    pub fn close_guard(&mut self) -> CloseGuard<'_, G, S> {
        CloseGuard { controller: self }
    }

    fn save(&mut self) -> Result<()> {
        let doc = self.to_document();
        self.store.save_document(&doc)
    }

    // ── Markers and numbering ───────────────────────────────────────

    /// Bring footnote records in line with the markers in the article.
    /// Returns (numbers changed, set of live footnotes changed).
    fn sync_markers(&mut self) -> (bool, bool) {
        self.surface.unlink_duplicate_markers();
        self.drop_orphan_markers();
        let present = self.surface.markers();
        let mut membership = false;

        for marker in present.iter().filter(|m| !m.hidden) {
            let deleted = self
                .session
                .footnotes()
                .get(marker.id)
                .is_some_and(|f| f.deleted);
            if deleted && self.session.footnotes_mut().restore(marker.id) {
                membership = true;
            }
        }

        let live: Vec<FootnoteId> = self.session.footnotes().live().map(|f| f.id).collect();
        for id in live {
            if !present.iter().any(|m| m.id == id) {
                self.session.footnotes_mut().recycle(id);
                membership = true;
            }
        }
        self.drop_orphan_markers();

        (self.renumber(), membership)
    }

    /// Markers whose record no longer exists: hidden ones are removed,
    /// visible ones become plain superscript text.
    fn drop_orphan_markers(&mut self) {
        for marker in self.surface.markers() {
            if self.session.footnotes().get(marker.id).is_some() {
                continue;
            }
            if marker.hidden {
                self.surface.remove_marker(marker.id);
            } else {
                warn!("marker for unknown footnote {}; unlinking", marker.id.0);
                self.surface.unlink_marker(marker.id);
            }
        }
    }

    fn renumber(&mut self) -> bool {
        let order = marker_order(self.surface.article());
        let changed = self.session.footnotes_mut().renumber(&order);
        if changed {
            self.update_labels();
        }
        changed
    }

    fn update_labels(&mut self) {
        let labels: Vec<(FootnoteId, String)> = self
            .session
            .footnotes()
            .live()
            .map(|f| (f.id, f.number.to_string()))
            .collect();
        for (id, label) in labels {
            self.surface.set_marker_label(id, &label);
        }
    }

    // ── Footers ─────────────────────────────────────────────────────

    fn reconcile_footer(&mut self, page: usize) -> Reconciliation {
        let expected = self
            .session
            .pages()
            .get(page)
            .map(|p| p.footer.footnotes.clone())
            .unwrap_or_default();
        let items = self.surface.footer(page).to_vec();
        let bin = self.session.footnotes().bin();
        let restorable: Vec<FootnoteId> = self
            .surface
            .markers()
            .into_iter()
            .filter(|m| m.hidden && bin.contains(&m.id))
            .map(|m| m.id)
            .collect();

        let rec = self
            .session
            .footnotes_mut()
            .reconcile(&expected, &items, &restorable);
        for id in &rec.recycled {
            self.surface.set_marker_hidden(*id, true);
        }
        for id in &rec.restored {
            self.surface.set_marker_hidden(*id, false);
        }
        self.drop_orphan_markers();
        rec
    }

    /// Make the footer lists on the surface show exactly the records the
    /// layout assigned to each page.
    fn render(&mut self) {
        let pages = self.session.pages().len();
        self.surface.set_page_count(pages);
        for page in 0..pages {
            let texts: Vec<String> = self.session.pages()[page]
                .footer
                .footnotes
                .iter()
                .filter_map(|id| self.session.footnotes().get(*id))
                .map(|f| f.content.clone())
                .collect();
            if self.surface.footer(page) != texts.as_slice() {
                self.surface.replace_footer_children(page, texts);
            }
        }
    }

    fn footnote_at(&self, page: usize, item: usize) -> Option<FootnoteId> {
        self.session
            .pages()
            .get(page)?
            .footer
            .footnotes
            .get(item)
            .copied()
    }

    // ── Cursor ──────────────────────────────────────────────────────

    fn capture_cursor(&mut self) -> Option<CursorAnchor> {
        let caret = self.surface.selection()?;
        let Container::Footer { page, item } = caret.container else {
            return None;
        };
        let top = self
            .session
            .footer_item_top(page, item, &self.geometry)
            .unwrap_or_else(|| self.session.pages().get(page).map_or(0.0, |p| p.available_area.bottom));
        Some(CursorAnchor {
            page,
            item,
            offset: caret.offset,
            top,
            footnote: None,
        })
    }

    fn restore_cursor(&mut self, anchor: CursorAnchor) {
        let target = anchor
            .footnote
            .and_then(|id| self.session.footnote_location(id))
            .or_else(|| {
                let len = self.surface.footer(anchor.page).len();
                (len > 0).then(|| (anchor.page, anchor.item.min(len - 1)))
            });
        let Some((page, item)) = target else {
            self.surface.set_selection(None);
            return;
        };

        let text = self.surface.footer(page).get(item).map_or("", String::as_str);
        let mut offset = anchor.offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        self.surface.set_selection(Some(Caret {
            container: Container::Footer { page, item },
            offset,
        }));

        if let Some(top) = self.session.footer_item_top(page, item, &self.geometry) {
            let scroll = self.surface.scroll_top() + (top - anchor.top);
            self.surface.set_scroll_top(scroll);
        }
    }
}

/// Scoped close: flushes a pending save when dropped. Errors can only be
/// logged here; call [`ReflowController::flush`] to handle them.
pub struct CloseGuard<'a, G: GeometryProvider, S: DocumentStore> {
    controller: &'a mut ReflowController<G, S>,
}

impl<G: GeometryProvider, S: DocumentStore> Deref for CloseGuard<'_, G, S> {
    type Target = ReflowController<G, S>;

    fn deref(&self) -> &Self::Target {
        &*self.controller
    }
}

impl<G: GeometryProvider, S: DocumentStore> DerefMut for CloseGuard<'_, G, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.controller
    }
}

impl<G: GeometryProvider, S: DocumentStore> Drop for CloseGuard<'_, G, S> {
    fn drop(&mut self) {
        if let Err(e) = self.controller.flush() {
            error!("saving on close failed: {e}");
        }
    }
}

/// Normalize saved content and turn its markers into runtime ones, numbered
/// and labelled.
pub(crate) fn load_article(content: Vec<Block>, session: &mut LayoutSession) -> Vec<Block> {
    let mut article: Vec<Block> = content.into_iter().filter_map(Block::normalize).collect();
    let store = session.footnotes_mut();
    store.ingest(&mut article);
    store.renumber(&marker_order(&article));
    for block in &mut article {
        block.for_each_marker_mut(&mut |marker| {
            if let Some(record) = marker.marker.and_then(|id| store.get(id)) {
                marker.content = Content::Text(record.number.to_string());
            }
        });
    }
    article
}

fn export_block(block: &Block, store: &FootnoteStore) -> Option<Block> {
    if let Some(id) = block.marker {
        let record = store.get(id).filter(|f| !f.deleted && !block.hidden)?;
        let mut saved = block.clone();
        saved.marker = None;
        saved.hidden = false;
        saved.footnote = Some(record.data());
        return Some(saved);
    }
    let mut out = block.clone();
    if let Content::Nodes(nodes) = &block.content {
        out.content = Content::Nodes(
            nodes
                .iter()
                .filter_map(|node| match node {
                    Node::Text(s) => Some(Node::Text(s.clone())),
                    Node::Block(b) => export_block(b, store).map(Node::Block),
                })
                .collect(),
        );
    }
    out.normalize()
}
