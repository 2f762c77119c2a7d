//! Integration tests for the pagination pipeline.
//!
//! These tests exercise the full path from a saved document through the
//! reflow controller to pages and footers. They verify:
//! - Page breaks happen at line boundaries and lose no text
//! - Footnotes land on their marker's page, or a later one
//! - Footers shrink the space left for flow content
//! - Footer edits are reconciled, recycled and restored
//! - The caret follows its footnote through a rebuild
//! - A settled layout survives another relayout unchanged

use std::cell::Cell;
use std::time::Instant;

use pagenote::autosave::MemoryStore;
use pagenote::footnotes::marker_order;
use pagenote::geometry::monospace::MonospaceGeometry;
use pagenote::geometry::{ComputedStyle, GeometryProvider, LineFragment, Rect};
use pagenote::layout::LayoutSession;
use pagenote::model::*;
use pagenote::surface::{Caret, Container};
use pagenote::{EngineConfig, ReflowController};

// ─── Helpers ────────────────────────────────────────────────────

/// 200×300pt pages with 10pt margins: a 180×280 content area, which the
/// default monospace provider fills with 20 lines of 30 columns.
fn make_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.page.size = PageSize::Custom {
        width: 200.0,
        height: 300.0,
    };
    config.page.margin = Edges::uniform(10.0);
    config.page.footer_gap = 5.0;
    config
}

fn make_geometry() -> MonospaceGeometry {
    MonospaceGeometry::default()
}

/// Exactly `lines` full lines of text.
fn make_paragraph(lines: usize) -> Block {
    Block::text("P", &"abcd ".repeat(6 * lines))
}

/// A saved footnote marker.
fn make_note(content: &str) -> Block {
    let mut sup = Block::text("SUP", "1");
    sup.footnote = Some(FootnoteData {
        content: content.to_string(),
        ..Default::default()
    });
    sup
}

fn make_doc(content: Vec<Block>) -> SavedDocument {
    SavedDocument {
        title: "Test".to_string(),
        lang: Some("en".to_string()),
        content,
    }
}

/// Route `log` output through the test harness; `RUST_LOG=debug` shows
/// every pass.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_controller(content: Vec<Block>) -> ReflowController<MonospaceGeometry, MemoryStore> {
    make_controller_with(content, make_geometry())
}

fn make_controller_with(
    content: Vec<Block>,
    geometry: MonospaceGeometry,
) -> ReflowController<MonospaceGeometry, MemoryStore> {
    init_logging();
    ReflowController::new(make_doc(content), make_config(), geometry, MemoryStore::new())
}

fn layout_json(session: &LayoutSession, article: &[Block]) -> String {
    serde_json::to_string(&session.info(article)).unwrap()
}

/// Page whose fragments hold text offset `offset` of block `block`.
fn page_of(session: &LayoutSession, block: usize, offset: usize) -> Option<usize> {
    session.pages().iter().find_map(|page| {
        page.fragments
            .iter()
            .any(|f| f.block == block && f.range.contains(&offset))
            .then_some(page.index)
    })
}

fn only_footnote(
    c: &ReflowController<MonospaceGeometry, MemoryStore>,
) -> pagenote::footnotes::Footnote {
    let mut ids = marker_order(c.surface().article());
    assert_eq!(ids.len(), 1);
    c.session()
        .footnotes()
        .get(ids.remove(0))
        .cloned()
        .expect("record for marker")
}

// ─── Scenarios ──────────────────────────────────────────────────

#[test]
fn single_line_fits_one_page() {
    let c = make_controller(vec![Block::text("P", "A single line of text.")]);
    let pages = c.session().pages();
    assert_eq!(pages.len(), 1);
    assert!(pages[0].footer.is_empty());
    assert_eq!(pages[0].available_area, pages[0].content_area);
    assert_eq!(pages[0].fragments.len(), 1);
}

#[test]
fn single_footnote_shrinks_available_area() {
    let c = make_controller(vec![Block::container(
        "P",
        vec!["Marked".into(), make_note("A short note").into(), " text.".into()],
    )]);
    let note = only_footnote(&c);
    assert_eq!(note.number, 1);
    assert_eq!(note.page, Some(0));

    let page = &c.session().pages()[0];
    assert_eq!(page.footer.footnotes, vec![note.id]);
    assert_eq!(page.footer.height, 14.0);
    assert_eq!(page.available_area.bottom, page.content_area.bottom - 14.0 - 5.0);
    assert_eq!(c.surface().footer(0), ["A short note"]);
}

#[test]
fn deleting_the_only_footer_item_recycles_it() {
    let mut c = make_controller(vec![Block::container(
        "P",
        vec!["Text".into(), make_note("note").into()],
    )]);
    let id = only_footnote(&c).id;

    c.surface_mut().delete_footer_item(0, 0).unwrap();
    let outcome = c.process(Instant::now());

    assert!(outcome.layout.is_some());
    assert_eq!(outcome.reconciled[0].1.recycled, vec![id]);
    assert!(c.session().footnotes().get(id).unwrap().deleted);
    assert_eq!(c.session().footnotes().bin(), &[id]);
    assert!(c.surface().markers()[0].hidden);
    let page = &c.session().pages()[0];
    assert!(page.footer.is_empty());
    assert_eq!(page.available_area, page.content_area);
}

#[test]
fn recycling_a_marker_frees_its_column() {
    // 30 visible columns plus the marker label wrap onto a second line.
    let mut c = make_controller(vec![Block::container(
        "P",
        vec!["abcd abcd abcd abcd abcd abcde".into(), make_note("note").into()],
    )]);
    assert_eq!(c.session().pages()[0].fragments[0].height, 28.0);

    c.surface_mut().delete_footer_item(0, 0).unwrap();
    let outcome = c.process(Instant::now());

    assert!(outcome.layout.is_some());
    assert!(c.surface().markers()[0].hidden);
    let fragment = &c.session().pages()[0].fragments[0];
    assert_eq!(fragment.height, 14.0);
    assert_eq!(fragment.range, 0..31);
}

#[test]
fn undo_restores_the_footnote_as_number_one() {
    let mut c = make_controller(vec![Block::container(
        "P",
        vec!["Text".into(), make_note("note").into()],
    )]);
    let id = only_footnote(&c).id;
    c.surface_mut().delete_footer_item(0, 0).unwrap();
    c.process(Instant::now());

    c.surface_mut().insert_footer_item(0, 0, "note").unwrap();
    let outcome = c.process(Instant::now());

    assert_eq!(outcome.reconciled[0].1.restored, vec![id]);
    let record = c.session().footnotes().get(id).unwrap();
    assert!(!record.deleted);
    assert_eq!(record.number, 1);
    assert_eq!(record.page, Some(0));
    assert!(!c.surface().markers()[0].hidden);
    assert!(c.session().footnotes().bin().is_empty());
    assert_eq!(c.surface().footer(0), ["note"]);
}

#[test]
fn paragraph_continues_on_page_two_at_a_line_boundary() {
    let paragraph = make_paragraph(25);
    let text = paragraph.plain_text();
    let c = make_controller(vec![paragraph]);
    let session = c.session();
    let article = c.surface().article();

    assert_eq!(session.pages().len(), 2);
    let first: String = session.page_blocks(0, article).iter().map(Block::plain_text).collect();
    let second: String = session.page_blocks(1, article).iter().map(Block::plain_text).collect();
    assert_eq!(first.len(), 600);
    assert_eq!(format!("{first}{second}"), text);
}

// ─── Properties ─────────────────────────────────────────────────

fn make_annotated_article() -> Vec<Block> {
    (0..6)
        .map(|i| {
            Block::container(
                "P",
                vec![
                    "abcd ".repeat(24).as_str().into(),
                    make_note(&format!("Footnote for paragraph {i}, long enough to wrap.")).into(),
                    " abcd".repeat(20).as_str().into(),
                ],
            )
        })
        .collect()
}

#[test]
fn no_text_is_lost_or_duplicated() {
    let c = make_controller(make_annotated_article());
    let info = c.session().info(c.surface().article());
    assert!(info.pages.len() > 1);

    for (index, block) in c.surface().article().iter().enumerate() {
        let pieces: Vec<_> = info
            .pages
            .iter()
            .flat_map(|p| p.fragments.iter())
            .filter(|f| f.block == index)
            .collect();
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let joined: String = pieces.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(joined, block.plain_text(), "block {index}");
    }
}

#[test]
fn footnotes_never_precede_their_markers() {
    let c = make_controller(make_annotated_article());
    let session = c.session();
    for (index, block) in c.surface().article().iter().enumerate() {
        for marker in block.markers() {
            let marker_page = page_of(session, index, marker.range.start).unwrap();
            let note_page = session.footnotes().get(marker.id).unwrap().page.unwrap();
            assert!(note_page >= marker_page, "footnote {:?}", marker.id);
            assert_eq!(session.footnote_location(marker.id).map(|l| l.0), Some(note_page));
        }
    }
}

#[test]
fn flow_content_stays_above_the_footer() {
    let c = make_controller(make_annotated_article());
    for page in c.session().pages() {
        if let Some(last) = page.fragments.last() {
            assert!(last.top + last.height <= page.available_area.bottom + 0.01);
        }
    }
}

#[test]
fn footer_items_follow_marker_order() {
    let c = make_controller(make_annotated_article());
    let session = c.session();
    for page in session.pages() {
        let numbers: Vec<u32> = page
            .footer
            .footnotes
            .iter()
            .map(|id| session.footnotes().get(*id).unwrap().number)
            .collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn relayout_is_idempotent() {
    let mut c = make_controller(make_annotated_article());
    let before = layout_json(c.session(), c.surface().article());
    c.surface_mut().insert_text(0, 0, "").unwrap();
    let outcome = c.process(Instant::now());
    assert_eq!(outcome.layout.map(|r| r.passes), Some(1));
    assert_eq!(layout_json(c.session(), c.surface().article()), before);
}

#[test]
fn page_count_without_footnotes_is_ceiling_of_lines() {
    let lines: Vec<Block> = (0..45).map(|i| Block::text("P", &format!("Line {i}"))).collect();
    let c = make_controller(lines);
    assert_eq!(c.session().pages().len(), 3);
    assert_eq!(c.session().pages()[2].fragments.len(), 5);
}

#[test]
fn oversized_footnote_is_still_placed() {
    let huge = "word ".repeat(400);
    let c = make_controller(vec![Block::container(
        "P",
        vec!["Text".into(), make_note(&huge).into()],
    )]);
    let note = only_footnote(&c);
    assert_eq!(note.page, Some(0));
    assert_eq!(c.session().pages().len(), 1);
    assert!(c.session().pages()[0].footer.height > 280.0);
}

#[test]
fn footnote_too_big_for_the_page_moves_without_its_line() {
    // Marker on the first line of a paragraph that fills the page.
    let c = make_controller(vec![Block::container(
        "P",
        vec![
            "abc".into(),
            make_note("note").into(),
            "d ".into(),
            "abcd ".repeat(6 * 20 - 1).as_str().into(),
        ],
    )]);
    let note = only_footnote(&c);
    assert_eq!(page_of(c.session(), 0, 3), Some(0));
    assert_eq!(note.page, Some(1));
    assert_eq!(c.session().pages().len(), 2);
    assert!(c.session().pages()[1].fragments.is_empty());
}

#[test]
fn marker_on_the_last_line_takes_the_line_along() {
    let c = make_controller(vec![Block::container(
        "P",
        vec![
            format!("{}abcd", "abcd ".repeat(6 * 20 - 1)).as_str().into(),
            make_note("note").into(),
        ],
    )]);
    let note = only_footnote(&c);
    let marker = c.surface().markers()[0].range.start;
    assert_eq!(page_of(c.session(), 0, marker), Some(1));
    assert_eq!(note.page, Some(1));
    assert_eq!(c.session().pages()[0].fragments[0].range, 0..570);
}

#[test]
fn undoing_a_marker_deletion_restores_the_record() {
    let mut c = make_controller(vec![Block::container(
        "P",
        vec!["Text".into(), make_note("verbatim note").into(), " more".into()],
    )]);
    let id = only_footnote(&c).id;
    let original = c.surface().article()[0].clone();

    c.surface_mut().delete_text(0, 4..5).unwrap();
    c.process(Instant::now());
    assert!(c.session().footnotes().bin().contains(&id));
    assert!(c.session().pages()[0].footer.is_empty());

    c.surface_mut().replace_block(0, original).unwrap();
    let outcome = c.process(Instant::now());
    assert!(outcome.layout.is_some());
    let record = c.session().footnotes().get(id).unwrap();
    assert!(!record.deleted);
    assert_eq!(record.content, "verbatim note");
    assert_eq!(c.surface().footer(0), ["verbatim note"]);
}

/// Two one-line footnotes 10pt apart. The paragraph is 17 lines with the
/// first marker on line 1 and the second on line 17: both notes plus the
/// spacing leave one point too few for the whole paragraph.
fn make_pinned_fixture() -> (LayoutSession, Vec<Block>, FootnoteId, FootnoteId) {
    init_logging();
    let mut session = LayoutSession::new(make_config());
    let a = session.footnotes_mut().create(FootnoteData {
        content: "note a".to_string(),
        ..Default::default()
    });
    let b = session.footnotes_mut().create(FootnoteData {
        content: "note b".to_string(),
        ..Default::default()
    });
    session.footnotes_mut().renumber(&[a, b]);
    let article = vec![Block::container(
        "P",
        vec![
            "abc".into(),
            Block::marker(a, "1").into(),
            format!("d {}abcd", "abcd ".repeat(80)).as_str().into(),
            Block::marker(b, "2").into(),
        ],
    )];
    (session, article, a, b)
}

#[test]
fn hysteresis_pins_a_footnote_below_its_marker_page() {
    let (mut session, article, a, b) = make_pinned_fixture();
    let geometry = make_geometry().with_item_spacing(10.0);

    let report = session.relayout(&article, &geometry);

    // Pass 1 overflows, pass 2 moves the last line and its note to page 1,
    // pass 3 brings the line back and keeps the note where it was.
    assert_eq!(report.passes, 3);
    assert!(report.converged);
    assert_eq!(session.pages().len(), 2);
    let marker_b = article[0].text_len() - 1;
    assert_eq!(page_of(&session, 0, marker_b), Some(0));
    assert_eq!(session.pages()[0].fragments[0].range, 0..article[0].text_len());
    assert_eq!(session.footnotes().get(a).unwrap().page, Some(0));
    assert_eq!(session.footnotes().get(b).unwrap().page, Some(1));
    assert_eq!(session.pages()[1].footer.footnotes, vec![b]);
    assert!(session.pages().iter().all(|p| !p.overflows()));
}

#[test]
fn relayout_after_pinning_is_idempotent() {
    let (mut session, article, _, b) = make_pinned_fixture();
    let geometry = make_geometry().with_item_spacing(10.0);
    session.relayout(&article, &geometry);
    let before = layout_json(&session, &article);

    let report = session.relayout(&article, &geometry);

    assert_eq!(report.passes, 1);
    assert!(report.converged);
    assert_eq!(session.footnotes().get(b).unwrap().page, Some(1));
    assert_eq!(layout_json(&session, &article), before);
}

#[test]
fn relayout_of_a_dense_article_is_idempotent() {
    let mut c = make_controller_with(
        make_annotated_article(),
        make_geometry().with_item_spacing(10.0),
    );
    assert_eq!(c.session().pages().len(), 4);
    let before = layout_json(c.session(), c.surface().article());

    c.surface_mut().insert_text(0, 0, "").unwrap();
    let report = c.process(Instant::now()).layout.unwrap();

    assert_eq!(report.passes, 1);
    assert!(report.converged);
    assert_eq!(layout_json(c.session(), c.surface().article()), before);
    assert!(c.session().pages().iter().all(|p| !p.overflows()));
}

#[test]
fn non_convergence_keeps_the_last_layout() {
    init_logging();
    let mut config = make_config();
    config.max_passes = 1;
    let mut session = LayoutSession::new(config);
    let id = session.footnotes_mut().create(FootnoteData {
        content: "note".to_string(),
        ..Default::default()
    });
    session.footnotes_mut().renumber(&[id]);
    let mut block = Block::text("P", "Text");
    block.insert_marker(4, Block::marker(id, "1"));

    let report = session.relayout(&[block], &make_geometry());
    assert_eq!(report.passes, 1);
    assert!(!report.converged);
    assert_eq!(session.footnote_location(id), Some((0, 0)));
}

#[test]
fn caret_in_footer_stays_on_screen() {
    let mut c = make_controller(vec![Block::container(
        "P",
        vec![
            "One".into(),
            make_note("first").into(),
            " two".into(),
            make_note("second").into(),
        ],
    )]);
    c.surface_mut().set_scroll_top(100.0);
    c.surface_mut().set_selection(Some(Caret {
        container: Container::Footer { page: 0, item: 1 },
        offset: 3,
    }));

    c.surface_mut()
        .edit_footer_item(0, 1, "second, now with a much longer text")
        .unwrap();
    let outcome = c.process(Instant::now());

    assert!(outcome.layout.is_some());
    assert_eq!(c.session().pages()[0].footer.height, 14.0 + 28.0);
    assert_eq!(
        c.surface().selection(),
        Some(Caret {
            container: Container::Footer { page: 0, item: 1 },
            offset: 3,
        })
    );
    assert_eq!(c.surface().scroll_top(), 86.0);
}

#[test]
fn rtl_footnotes_set_footer_direction() {
    let c = make_controller(vec![Block::container(
        "P",
        vec!["Text".into(), make_note("הערה קצרה").into()],
    )]);
    let info = c.session().info(c.surface().article());
    let json = serde_json::to_value(&info.pages[0].footer).unwrap();
    assert_eq!(json["direction"], "rtl");
}

// ─── Geometry provider contract ─────────────────────────────────

/// Wraps the monospace provider and counts yield points.
struct CountingGeometry {
    inner: MonospaceGeometry,
    settles: Cell<usize>,
}

impl GeometryProvider for CountingGeometry {
    fn block_rect(&self, block: &Block, width: f64) -> Option<Rect> {
        self.inner.block_rect(block, width)
    }

    fn computed_style(&self, block: &Block) -> ComputedStyle {
        self.inner.computed_style(block)
    }

    fn line_fragments(&self, block: &Block, width: f64) -> Vec<LineFragment> {
        self.inner.line_fragments(block, width)
    }

    fn footnote_rect(&self, content: &str, number: u32, width: f64) -> Option<Rect> {
        self.inner.footnote_rect(content, number, width)
    }

    fn settle(&self) {
        self.settles.set(self.settles.get() + 1);
    }
}

#[test]
fn first_page_yields_once() {
    init_logging();
    let geometry = CountingGeometry {
        inner: make_geometry(),
        settles: Cell::new(0),
    };
    let mut session = LayoutSession::new(make_config());
    session.relayout(&[make_paragraph(50)], &geometry);
    assert_eq!(session.pages().len(), 3);
    assert_eq!(geometry.settles.get(), 1);
}

/// Reports no rectangle and no lines for preformatted blocks.
struct BlindGeometry(MonospaceGeometry);

impl GeometryProvider for BlindGeometry {
    fn block_rect(&self, block: &Block, width: f64) -> Option<Rect> {
        if block.tag == "PRE" {
            return None;
        }
        self.0.block_rect(block, width)
    }

    fn computed_style(&self, block: &Block) -> ComputedStyle {
        self.0.computed_style(block)
    }

    fn line_fragments(&self, block: &Block, width: f64) -> Vec<LineFragment> {
        if block.tag == "PRE" {
            return Vec::new();
        }
        self.0.line_fragments(block, width)
    }

    fn footnote_rect(&self, content: &str, number: u32, width: f64) -> Option<Rect> {
        self.0.footnote_rect(content, number, width)
    }
}

#[test]
fn unmeasurable_block_forces_a_break_but_keeps_its_text() {
    init_logging();
    let article = vec![
        Block::text("P", "Before"),
        Block::text("PRE", "cannot be measured"),
        Block::text("P", "After"),
    ];
    let mut session = LayoutSession::new(make_config());
    let report = session.relayout(&article, &BlindGeometry(make_geometry()));
    assert!(report.converged);
    assert_eq!(page_of(&session, 0, 0), Some(0));
    assert_eq!(page_of(&session, 1, 0), Some(1));
    assert_eq!(session.page_blocks(1, &article)[0].plain_text(), "cannot be measured");
}

#[test]
fn paginate_json_reads_saved_documents() {
    let json = r#"{
        "title": "Saved",
        "content": [
            {"tag": "P", "content": ["Body", {"tag": "SUP", "content": "1",
                "footnote": {"content": "Saved note"}}]}
        ]
    }"#;
    let info = pagenote::paginate_json(json, make_config(), &make_geometry()).unwrap();
    assert_eq!(info.pages.len(), 1);
    assert_eq!(info.pages[0].footer.items[0].content, "Saved note");
    assert_eq!(info.pages[0].footer.items[0].number, 1);
    assert!(pagenote::paginate_json("{", make_config(), &make_geometry()).is_err());
}
