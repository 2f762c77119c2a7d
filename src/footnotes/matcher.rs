//! Content-based identity matching.
//!
//! The editable surface does not keep node identity stable: deleting a list
//! item shifts the text of every following item up by one and removes the
//! last node. Footer list items are therefore matched to footnote records by
//! content, through an ordered chain of increasingly permissive rules:
//!
//! 1. exact content
//! 2. one text is a prefix or suffix of the other (partial edits)
//! 3. position (first remaining candidate)
//!
//! Each rule runs over all still-unmatched items before the next rule is
//! tried, so an exact match later in the list wins over a fuzzy match earlier.

/// Which rule of the chain produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Affix,
    Positional,
}

/// Item `item` was identified as candidate `candidate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub item: usize,
    pub candidate: usize,
    pub kind: MatchKind,
}

/// Match `items` to `candidates`, each used at most once. Candidates are
/// tried in slice order, so callers put preferred candidates first.
///
/// With `positional == false` the chain stops after the affix rule.
pub fn match_items(items: &[&str], candidates: &[&str], positional: bool) -> Vec<Match> {
    let mut item_taken = vec![false; items.len()];
    let mut cand_taken = vec![false; candidates.len()];
    let mut matches = Vec::new();

    let mut run = |kind: MatchKind, rule: &dyn Fn(&str, &str) -> bool| {
        for (i, item) in items.iter().enumerate() {
            if item_taken[i] {
                continue;
            }
            let found = candidates
                .iter()
                .enumerate()
                .find(|(c, cand)| !cand_taken[*c] && rule(item, cand));
            if let Some((c, _)) = found {
                item_taken[i] = true;
                cand_taken[c] = true;
                matches.push(Match {
                    item: i,
                    candidate: c,
                    kind,
                });
            }
        }
    };

    run(MatchKind::Exact, &|item, cand| item == cand);
    run(MatchKind::Affix, &is_affix);
    if positional {
        run(MatchKind::Positional, &|_, _| true);
    }

    matches.sort_by_key(|m| m.item);
    matches
}

/// One text starts or ends with the other. Empty texts never match here,
/// since they would match everything.
fn is_affix(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.starts_with(b) || a.ends_with(b) || b.starts_with(a) || b.ends_with(a)
}
