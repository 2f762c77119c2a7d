//! Footnote placement across refinement passes.
//!
//! A footnote normally goes to the footer of the page holding its marker.
//! Moving it changes that footer's height, which can move the content that
//! decided the move in the first place. Once a relayout has run more than
//! `hysteresis_after` passes, a footnote is no longer allowed to move back to
//! an earlier page than the one it occupied in the previous pass; it is
//! pinned there instead. Pinning only ever delays a footnote, so it still
//! never precedes its marker.
//!
//! The pins of the accepted layout outlive the relayout that made them. The
//! next relayout re-applies a pin from its first pass, but only while the
//! footnote is held back from the same page to the same page. A layout that
//! settled with pins is therefore reproduced as is, and a pin goes stale as
//! soon as an edit moves the marker.
//!
//! A pin that leaves flow content overlapping its page's footer is released
//! for the rest of the relayout.

use std::collections::{HashMap, HashSet};

use log::debug;

use super::fitter::{PendingFootnote, EPSILON};
use crate::footnotes::FootnoteStore;
use crate::model::FootnoteId;

/// A footnote kept on page `to` although it would have gone to `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pin {
    pub id: FootnoteId,
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Placer {
    pass: usize,
    hysteresis_after: usize,
    /// Page of each footnote after the previous pass.
    previous: HashMap<FootnoteId, usize>,
    /// Pins of the layout this relayout started from.
    carried: Vec<Pin>,
    /// Pins applied in the current pass.
    applied: Vec<Pin>,
    /// Footnotes held back for a later page: (target page, footnote).
    pinned: Vec<(usize, PendingFootnote)>,
    /// Where pinned footnotes ended up in the current pass.
    landed: Vec<(usize, FootnoteId)>,
    /// Footnotes whose pin overfilled a page; placed freely from now on.
    released: HashSet<FootnoteId>,
}

impl Placer {
    pub(crate) fn new(store: &FootnoteStore, hysteresis_after: usize, carried: Vec<Pin>) -> Self {
        Self {
            hysteresis_after,
            previous: snapshot(store),
            carried,
            ..Default::default()
        }
    }

    /// Start pass `pass` (1-based).
    pub(crate) fn begin_pass(&mut self, pass: usize) {
        self.pass = pass;
        self.pinned.clear();
        self.applied.clear();
        self.landed.clear();
    }

    /// Record the assignment produced by the pass that just finished and
    /// release pins that left flow content overlapping a footer.
    /// `footers_changed` is whether any footer height moved in this pass.
    /// Returns whether another pass is needed.
    pub(crate) fn end_pass(
        &mut self,
        store: &FootnoteStore,
        footers_changed: bool,
        overflowing: &[usize],
    ) -> bool {
        let current = snapshot(store);
        let moved = current != self.previous;
        self.previous = current;
        if footers_changed || moved {
            return true;
        }

        let mut released = false;
        for (page, id) in &self.landed {
            if overflowing.contains(page) && self.released.insert(*id) {
                debug!(
                    "pass {}: footnote {} overfills page {page}; releasing its pin",
                    self.pass, id.0
                );
                released = true;
            }
        }
        released
    }

    /// Split `footnotes` (about to be placed on `page`) into those that stay
    /// and those pinned to the later page they held in the previous pass.
    pub(crate) fn admit(&mut self, footnotes: &mut Vec<PendingFootnote>, page: usize) {
        let forced = self.pass > self.hysteresis_after;
        footnotes.retain(|f| {
            if self.released.contains(&f.id) {
                return true;
            }
            let Some(&before) = self.previous.get(&f.id) else {
                return true;
            };
            let pin = Pin {
                id: f.id,
                from: page,
                to: before,
            };
            if before <= page || !(forced || self.carried.contains(&pin)) {
                return true;
            }
            debug!(
                "pass {}: keeping footnote {} on page {before} instead of moving back to {page}",
                self.pass, f.id.0
            );
            self.pinned.push((before, *f));
            self.applied.push(pin);
            false
        });
    }

    pub(crate) fn has_pinned(&self) -> bool {
        !self.pinned.is_empty()
    }

    /// Footnotes pinned to `page` or to any page before it, as many as fit in
    /// `budget`. The first one is always taken; the rest move on to the
    /// next page.
    pub(crate) fn take_pinned(&mut self, page: usize, budget: f64) -> Vec<PendingFootnote> {
        let (due, later): (Vec<_>, Vec<_>) = self.pinned.drain(..).partition(|(p, _)| *p <= page);
        self.pinned = later;

        let mut taken = Vec::new();
        let mut used = 0.0;
        for (_, note) in due {
            if !taken.is_empty() && used + note.height > budget + EPSILON {
                self.pinned.push((page + 1, note));
                continue;
            }
            used += note.height;
            self.landed.push((page, note.id));
            taken.push(note);
        }
        taken
    }

    /// Pins worth carrying into the next relayout.
    pub(crate) fn into_pins(self) -> Vec<Pin> {
        let released = self.released;
        self.applied
            .into_iter()
            .filter(|pin| !released.contains(&pin.id))
            .collect()
    }
}

fn snapshot(store: &FootnoteStore) -> HashMap<FootnoteId, usize> {
    store
        .live()
        .filter_map(|f| f.page.map(|p| (f.id, p)))
        .collect()
}
