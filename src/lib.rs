//! # Pagenote
//!
//! Page-native pagination with footnotes, for documents that are edited
//! while they are displayed.
//!
//! A captured article is shown as a stack of fixed-size sheets. Each sheet
//! ends in a footer listing the footnotes whose markers appear on it, and
//! the footer takes its space from that same sheet. Content flows *into*
//! pages: a block is only ever placed where it fits together with its
//! footnotes, and the whole layout is refined until the footers stop
//! moving.
//!
//! The engine never measures text itself. Rectangles and line boxes come
//! from a [`geometry::GeometryProvider`] supplied by the host.
//!
//! ## Architecture
//!
//! ```text
//! SavedDocument (JSON)
//!       ↓
//!   [model]        Flow content tree, footnote payloads, page config
//!       ↓
//!   [surface]      Editable article + footer lists, mutation records
//!       ↓
//!   [reflow]       Classify changes, renumber, reconcile, keep the caret
//!       ↓
//!   [footnotes]    Records, recycling bin, identity matching
//!       ↓
//!   [layout]       Fit blocks into pages, place footnotes, size footers
//!       ↓
//!   [autosave]     Debounced persistence, flush on close
//! ```

pub mod autosave;
pub mod config;
pub mod error;
pub mod footnotes;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod reflow;
pub mod surface;

pub use config::EngineConfig;
pub use error::{PagenoteError, Result};
pub use geometry::GeometryProvider;
pub use layout::{LayoutInfo, LayoutSession};
pub use model::SavedDocument;
pub use reflow::ReflowController;

/// Paginate a saved document once, without an editing session.
pub fn paginate(
    doc: SavedDocument,
    config: EngineConfig,
    geometry: &dyn GeometryProvider,
) -> LayoutInfo {
    let mut session = LayoutSession::new(config);
    let article = reflow::load_article(doc.content, &mut session);
    session.relayout(&article, geometry);
    session.info(&article)
}

/// Paginate a saved document given as JSON.
pub fn paginate_json(
    json: &str,
    config: EngineConfig,
    geometry: &dyn GeometryProvider,
) -> Result<LayoutInfo> {
    let doc: SavedDocument = serde_json::from_str(json)?;
    Ok(paginate(doc, config, geometry))
}
