//! # Footnote Records
//!
//! Runtime footnote state for one document: the records themselves, their
//! numbering, and the recycling bin that lets a deleted footnote come back
//! verbatim when the user undoes the deletion.
//!
//! Records are never owned by pages. A page's footer refers to records by
//! [`FootnoteId`], and each record remembers which page it was placed on.

pub mod matcher;

use std::collections::HashMap;

use log::{debug, warn};

use crate::model::{Block, FootnoteData, FootnoteExtra, FootnoteId};
use matcher::{match_items, MatchKind};

/// A footnote record.
#[derive(Debug, Clone, PartialEq)]
pub struct Footnote {
    pub id: FootnoteId,
    /// 1-based position of the marker among live footnotes.
    pub number: u32,
    pub content: String,
    pub extra: FootnoteExtra,
    /// Page whose footer holds this footnote, once laid out.
    pub page: Option<usize>,
    /// In the recycling bin; its marker is hidden.
    pub deleted: bool,
    /// Last measured height of the footer item and the number it was
    /// measured with.
    pub measured: Option<(u32, f64)>,
}

impl Footnote {
    pub fn data(&self) -> FootnoteData {
        FootnoteData {
            content: self.content.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// All footnote records of a session plus the recycling bin.
#[derive(Debug, Clone)]
pub struct FootnoteStore {
    records: HashMap<FootnoteId, Footnote>,
    /// Live and deleted ids in marker order, as of the last renumbering.
    order: Vec<FootnoteId>,
    /// Recycled ids, most recently deleted last.
    bin: Vec<FootnoteId>,
    /// Maximum bin size; 0 means unbounded.
    bin_cap: usize,
    next_id: u32,
}

/// Outcome of reconciling one footer list against the surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Footnote shown by each surviving item, in item order.
    pub items: Vec<FootnoteId>,
    /// Records whose item disappeared; now in the recycling bin.
    pub recycled: Vec<FootnoteId>,
    /// Records brought back from the recycling bin.
    pub restored: Vec<FootnoteId>,
    /// Some item text differed from its record.
    pub edited: bool,
    /// The positional rule had to be used.
    pub positional: bool,
    /// For each surface item, the record it now belongs to. Folded items
    /// point at the record they were folded into.
    pub owners: Vec<Option<FootnoteId>>,
}

impl Reconciliation {
    /// Whether the set of live footnotes changed.
    pub fn membership_changed(&self) -> bool {
        !self.recycled.is_empty() || !self.restored.is_empty()
    }
}

impl FootnoteStore {
    pub fn new(bin_cap: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            bin: Vec::new(),
            bin_cap,
            next_id: 1,
        }
    }

    /// Create a new live record. It gets a number at the next renumbering.
    pub fn create(&mut self, data: FootnoteData) -> FootnoteId {
        let id = FootnoteId(self.next_id);
        self.next_id += 1;
        self.records.insert(
            id,
            Footnote {
                id,
                number: 0,
                content: data.content,
                extra: data.extra,
                page: None,
                deleted: false,
                measured: None,
            },
        );
        id
    }

    pub fn get(&self, id: FootnoteId) -> Option<&Footnote> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: FootnoteId) -> Option<&mut Footnote> {
        self.records.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live records in marker order.
    pub fn live(&self) -> impl Iterator<Item = &Footnote> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|f| !f.deleted)
    }

    pub fn live_count(&self) -> usize {
        self.live().count()
    }

    /// Recycled ids, most recently deleted last.
    pub fn bin(&self) -> &[FootnoteId] {
        &self.bin
    }

    /// Move a record to the recycling bin. Returns ids evicted from the bin
    /// to respect its cap; those records are gone for good.
    pub fn recycle(&mut self, id: FootnoteId) -> Vec<FootnoteId> {
        let Some(record) = self.records.get_mut(&id) else {
            return Vec::new();
        };
        record.deleted = true;
        record.page = None;
        self.bin.retain(|b| *b != id);
        self.bin.push(id);
        debug!("footnote {} recycled (bin size {})", id.0, self.bin.len());

        let mut evicted = Vec::new();
        while self.bin_cap > 0 && self.bin.len() > self.bin_cap {
            let oldest = self.bin.remove(0);
            self.records.remove(&oldest);
            self.order.retain(|o| *o != oldest);
            evicted.push(oldest);
        }
        evicted
    }

    /// Bring a record back from the recycling bin.
    pub fn restore(&mut self, id: FootnoteId) -> bool {
        let Some(pos) = self.bin.iter().position(|b| *b == id) else {
            return false;
        };
        self.bin.remove(pos);
        if let Some(record) = self.records.get_mut(&id) {
            record.deleted = false;
        }
        debug!("footnote {} restored from bin", id.0);
        true
    }

    /// Drop a record permanently.
    pub fn discard(&mut self, id: FootnoteId) -> Option<Footnote> {
        self.bin.retain(|b| *b != id);
        self.order.retain(|o| *o != id);
        self.records.remove(&id)
    }

    /// Recompute numbers from the marker order of the document. Ids with no
    /// record are skipped. Returns whether any live number changed.
    pub fn renumber(&mut self, marker_order: &[FootnoteId]) -> bool {
        self.order = marker_order
            .iter()
            .copied()
            .filter(|id| self.records.contains_key(id))
            .collect();
        let mut changed = false;
        let mut number = 0;
        for id in &self.order {
            let Some(record) = self.records.get_mut(id) else {
                continue;
            };
            if record.deleted {
                continue;
            }
            number += 1;
            if record.number != number {
                record.number = number;
                changed = true;
            }
        }
        changed
    }

    /// Turn saved markers into runtime ones: every `footnote` payload
    /// becomes a record and its marker node is linked to it. Returns the new
    /// ids in document order. Numbers are assigned by the next
    /// [`renumber`](Self::renumber).
    pub fn ingest(&mut self, blocks: &mut [Block]) -> Vec<FootnoteId> {
        let mut created = Vec::new();
        for block in blocks.iter_mut() {
            block.for_each_saved_marker_mut(&mut |marker| {
                if let Some(data) = marker.footnote.take() {
                    let id = self.create(data);
                    marker.marker = Some(id);
                    created.push(id);
                }
            });
        }
        debug!("ingested {} saved footnotes", created.len());
        created
    }

    /// Match the items currently shown in one footer list against the
    /// records that footer is supposed to show.
    ///
    /// Records with no surviving item are recycled. Extra items re-adopt
    /// recycled records listed in `restorable` (those whose marker is still
    /// in the flow), last deleted first. Items that match nothing at
    /// all are folded into the neighbouring record, so the number of items
    /// always equals the number of records after the footer is rebuilt.
    pub fn reconcile(
        &mut self,
        expected: &[FootnoteId],
        items: &[String],
        restorable: &[FootnoteId],
    ) -> Reconciliation {
        let mut result = Reconciliation::default();
        let item_texts: Vec<&str> = items.iter().map(|s| s.trim()).collect();
        let expected_texts: Vec<String> = expected
            .iter()
            .map(|id| self.records.get(id).map(|f| f.content.clone()).unwrap_or_default())
            .collect();
        let expected_refs: Vec<&str> = expected_texts.iter().map(|s| s.trim()).collect();

        let mut assigned: Vec<Option<FootnoteId>> = vec![None; items.len()];
        // Positional matching only makes sense when items went missing or
        // were rewritten in place; extra items are tried against the bin.
        let allow_positional = items.len() <= expected.len();
        for m in match_items(&item_texts, &expected_refs, allow_positional) {
            assigned[m.item] = Some(expected[m.candidate]);
            result.positional |= m.kind == MatchKind::Positional;
        }

        let matched_expected: Vec<FootnoteId> = assigned.iter().flatten().copied().collect();
        let unmatched_expected: Vec<FootnoteId> = expected
            .iter()
            .copied()
            .filter(|id| !matched_expected.contains(id))
            .collect();

        // Leftover items: expected records that were not claimed come first
        // (an edit rewrote them), then the bin, most recent first.
        let leftover: Vec<usize> = (0..items.len()).filter(|i| assigned[*i].is_none()).collect();
        if !leftover.is_empty() {
            let leftover_texts: Vec<&str> = leftover.iter().map(|i| item_texts[*i]).collect();
            let bin_ids: Vec<FootnoteId> = self
                .bin
                .iter()
                .rev()
                .copied()
                .filter(|id| restorable.contains(id))
                .collect();
            let mut pool = unmatched_expected.clone();
            pool.extend(bin_ids.iter().copied());
            let pool_texts: Vec<String> = pool
                .iter()
                .map(|id| self.records.get(id).map(|f| f.content.clone()).unwrap_or_default())
                .collect();
            let pool_refs: Vec<&str> = pool_texts.iter().map(|s| s.trim()).collect();
            for m in match_items(&leftover_texts, &pool_refs, true) {
                let id = pool[m.candidate];
                assigned[leftover[m.item]] = Some(id);
                result.positional |= m.kind == MatchKind::Positional;
                if bin_ids.contains(&id) {
                    self.restore(id);
                    result.restored.push(id);
                }
            }
        }

        for (i, id) in assigned.iter().enumerate() {
            let Some(id) = id else { continue };
            if let Some(record) = self.records.get_mut(id) {
                if record.content.trim() != item_texts[i] && !result.restored.contains(id) {
                    record.content = item_texts[i].to_string();
                    record.measured = None;
                    result.edited = true;
                }
            }
        }

        // Items still without a record were split off a neighbour.
        let mut owners = assigned.clone();
        for i in 0..items.len() {
            if assigned[i].is_some() {
                continue;
            }
            let neighbour = assigned[..i]
                .iter()
                .rev()
                .flatten()
                .next()
                .or_else(|| assigned[i + 1..].iter().flatten().next())
                .copied();
            match neighbour {
                Some(id) => {
                    warn!("footer item {i} matches no footnote; folding into footnote {}", id.0);
                    owners[i] = Some(id);
                    if let Some(record) = self.records.get_mut(&id) {
                        record.measured = None;
                        if !item_texts[i].is_empty() {
                            if !record.content.is_empty() {
                                record.content.push(' ');
                            }
                            record.content.push_str(item_texts[i]);
                        }
                    }
                    result.edited = true;
                }
                None => warn!("footer item {i} matches no footnote and has no neighbour; dropped"),
            }
        }

        let claimed: Vec<FootnoteId> = assigned.iter().flatten().copied().collect();
        for id in expected {
            if !claimed.contains(id) {
                self.recycle(*id);
                result.recycled.push(*id);
            }
        }
        result.items = claimed;
        result.owners = owners;

        if result.positional {
            warn!("footer reconciliation fell back to positional matching");
        }
        debug!(
            "reconciled footer: {} items, {} recycled, {} restored",
            result.items.len(),
            result.recycled.len(),
            result.restored.len()
        );
        result
    }
}

/// Footnote ids of all markers in `blocks`, hidden ones included, in
/// document order. Only the first marker for an id counts.
pub fn marker_order(blocks: &[Block]) -> Vec<FootnoteId> {
    let mut order: Vec<FootnoteId> = Vec::new();
    for marker in blocks.iter().flat_map(Block::markers) {
        if !order.contains(&marker.id) {
            order.push(marker.id);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(text: &str) -> FootnoteData {
        FootnoteData {
            content: text.to_string(),
            extra: FootnoteExtra::default(),
        }
    }

    fn store_with(texts: &[&str]) -> (FootnoteStore, Vec<FootnoteId>) {
        let mut store = FootnoteStore::new(0);
        let ids: Vec<_> = texts.iter().map(|t| store.create(note(t))).collect();
        store.renumber(&ids);
        (store, ids)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numbering_skips_deleted() {
        let (mut store, ids) = store_with(&["a", "b", "c"]);
        assert_eq!(store.get(ids[2]).unwrap().number, 3);
        store.recycle(ids[0]);
        assert!(store.renumber(&ids));
        assert_eq!(store.get(ids[1]).unwrap().number, 1);
        assert_eq!(store.get(ids[2]).unwrap().number, 2);
        assert!(!store.renumber(&ids));
    }

    #[test]
    fn numbering_follows_marker_order() {
        let (mut store, ids) = store_with(&["a", "b"]);
        store.renumber(&[ids[1], ids[0]]);
        assert_eq!(store.get(ids[1]).unwrap().number, 1);
        assert_eq!(store.get(ids[0]).unwrap().number, 2);
    }

    #[test]
    fn reconcile_recycles_deleted_item() {
        let (mut store, ids) = store_with(&["first", "second", "third"]);
        let result = store.reconcile(&ids, &strings(&["first", "third"]), &[]);
        assert_eq!(result.items, vec![ids[0], ids[2]]);
        assert_eq!(result.recycled, vec![ids[1]]);
        assert!(store.get(ids[1]).unwrap().deleted);
        assert_eq!(store.bin(), &[ids[1]]);
    }

    #[test]
    fn reconcile_restores_last_deleted_first() {
        let (mut store, ids) = store_with(&["same", "same", "other"]);
        store.recycle(ids[0]);
        store.recycle(ids[1]);
        let result = store.reconcile(&[ids[2]], &strings(&["same", "other"]), &[ids[0], ids[1]]);
        assert_eq!(result.restored, vec![ids[1]]);
        assert_eq!(result.items, vec![ids[1], ids[2]]);
        assert!(!store.get(ids[1]).unwrap().deleted);
        assert_eq!(store.bin(), &[ids[0]]);
    }

    #[test]
    fn reconcile_applies_edits() {
        let (mut store, ids) = store_with(&["A note"]);
        let result = store.reconcile(&ids, &strings(&["A note with more"]), &[]);
        assert!(result.edited);
        assert!(!result.membership_changed());
        assert_eq!(store.get(ids[0]).unwrap().content, "A note with more");
    }

    #[test]
    fn reconcile_folds_unmatched_extra_item() {
        let (mut store, ids) = store_with(&["alpha"]);
        let result = store.reconcile(&ids, &strings(&["alpha", "beta"]), &[]);
        assert_eq!(result.items, vec![ids[0]]);
        assert_eq!(store.get(ids[0]).unwrap().content, "alpha beta");
    }

    #[test]
    fn folded_item_is_owned_by_its_neighbour() {
        let (mut store, ids) = store_with(&["alpha"]);
        let result = store.reconcile(&ids, &strings(&["zzz", "alpha"]), &[]);
        assert_eq!(result.owners, vec![Some(ids[0]), Some(ids[0])]);
    }

    #[test]
    fn ingest_links_saved_markers() {
        let mut sup = Block::text("SUP", "1");
        sup.footnote = Some(note("saved note"));
        let mut blocks = vec![Block::container("P", vec!["Text".into(), sup.into()])];
        let mut store = FootnoteStore::new(0);
        let ids = store.ingest(&mut blocks);
        assert_eq!(ids.len(), 1);
        store.renumber(&marker_order(&blocks));
        let record = store.get(ids[0]).unwrap();
        assert_eq!(record.content, "saved note");
        assert_eq!(record.number, 1);
        assert_eq!(blocks[0].markers()[0].id, ids[0]);
    }

    #[test]
    fn bin_cap_evicts_oldest() {
        let mut store = FootnoteStore::new(2);
        let ids: Vec<_> = ["a", "b", "c"].iter().map(|t| store.create(note(t))).collect();
        store.renumber(&ids);
        store.recycle(ids[0]);
        store.recycle(ids[1]);
        let evicted = store.recycle(ids[2]);
        assert_eq!(evicted, vec![ids[0]]);
        assert!(store.get(ids[0]).is_none());
        assert_eq!(store.bin(), &[ids[1], ids[2]]);
    }
}
