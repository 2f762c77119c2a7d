//! # Document Model
//!
//! The portable representation of a captured page fragment. A document is a
//! flow of block-level nodes (paragraphs, headings, lists, tables), each of
//! which holds either plain text or a list of child nodes. Inline spans carry
//! a small whitelisted style, and footnote markers are ordinary nodes with a
//! `footnote` payload attached.
//!
//! The same tree is used for persistence (JSON) and as the live content of
//! the editable surface. At runtime, marker nodes are linked to footnote
//! records through [`Block::marker`] instead of carrying their payload inline.
//!
//! All text offsets in this module are UTF-8 byte offsets into the
//! concatenated text of a block ([`Block::plain_text`]).

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Stable identity of a footnote record for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FootnoteId(pub u32);

/// A saved document, as exchanged with the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedDocument {
    pub title: String,
    /// Document language (BCP 47 tag, e.g. "en-US").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Top-level flow blocks.
    pub content: Vec<Block>,
}

/// A block or inline element of the flow content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Upper-case element name ("P", "H2", "LI", "SPAN", "SUP", ...).
    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<InlineStyle>,

    pub content: Content,

    /// Footnote payload of a saved marker. Consumed when the document is
    /// loaded into a session and written back on export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footnote: Option<FootnoteData>,

    /// Class attribute, used for manual junk marking in cleanup mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Runtime link to the footnote record this marker belongs to.
    #[serde(skip)]
    pub marker: Option<FootnoteId>,

    /// Hidden markers belong to recycled footnotes. They stay in the flow so
    /// an undo can bring the footnote back at the same position.
    #[serde(skip)]
    pub hidden: bool,
}

/// Content of a block: a text leaf or an ordered list of children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Nodes(Vec<Node>),
}

/// A child of a block: either a bare text fragment or a nested element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Text(String),
    Block(Block),
}

/// The inline style whitelist. Any other property present in the input is
/// dropped on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_decoration_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_align: Option<String>,
}

impl InlineStyle {
    pub fn is_empty(&self) -> bool {
        self.font_weight.is_none()
            && self.font_style.is_none()
            && self.font_size.is_none()
            && self.text_decoration_line.is_none()
            && self.vertical_align.is_none()
    }
}

/// The definition text of a footnote plus translation metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FootnoteData {
    pub content: String,
    #[serde(default)]
    pub extra: FootnoteExtra,
}

/// Language tags and alternative translations attached to a footnote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FootnoteExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_lang: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

/// A footnote marker found inside a block, with the text range of its label.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpan {
    pub id: FootnoteId,
    pub range: Range<usize>,
    pub hidden: bool,
}

const BLOCK_TAGS: &[&str] = &[
    "P", "H1", "H2", "H3", "H4", "H5", "H6", "UL", "OL", "LI", "DL", "DT", "DD", "TABLE",
    "THEAD", "TBODY", "TFOOT", "TR", "TD", "TH", "CAPTION", "BLOCKQUOTE", "PRE", "DIV", "FIGURE",
    "FIGCAPTION", "HR", "SECTION", "ARTICLE",
];

impl Block {
    /// Create a text leaf.
    pub fn text(tag: &str, content: &str) -> Self {
        Self::with_content(tag, Content::Text(content.to_string()))
    }

    /// Create a container with child nodes.
    pub fn container(tag: &str, children: Vec<Node>) -> Self {
        Self::with_content(tag, Content::Nodes(children))
    }

    /// Create a styled inline span.
    pub fn span(style: InlineStyle, content: &str) -> Self {
        let mut span = Self::text("SPAN", content);
        span.style = Some(style);
        span
    }

    /// Create a runtime footnote marker with the given label.
    pub fn marker(id: FootnoteId, label: &str) -> Self {
        let mut sup = Self::text("SUP", label);
        sup.marker = Some(id);
        sup
    }

    fn with_content(tag: &str, content: Content) -> Self {
        Self {
            tag: tag.to_ascii_uppercase(),
            style: None,
            content,
            footnote: None,
            class: None,
            marker: None,
            hidden: false,
        }
    }

    /// Whether this element starts a new block box.
    pub fn is_block_level(&self) -> bool {
        BLOCK_TAGS.contains(&self.tag.as_str())
    }

    /// Whether this node is a footnote marker, saved or live.
    pub fn is_marker(&self) -> bool {
        self.marker.is_some() || self.footnote.is_some()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class
            .as_deref()
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    /// Byte length of the concatenated text.
    pub fn text_len(&self) -> usize {
        match &self.content {
            Content::Text(s) => s.len(),
            Content::Nodes(nodes) => nodes.iter().map(Node::text_len).sum(),
        }
    }

    /// Concatenated text of the whole subtree.
    pub fn plain_text(&self) -> String {
        let mut out = String::with_capacity(self.text_len());
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        match &self.content {
            Content::Text(s) => out.push_str(s),
            Content::Nodes(nodes) => {
                for node in nodes {
                    match node {
                        Node::Text(s) => out.push_str(s),
                        Node::Block(b) => b.push_text(out),
                    }
                }
            }
        }
    }

    /// Block-level children, if this block is a container of blocks.
    pub fn block_children(&self) -> Vec<&Block> {
        match &self.content {
            Content::Text(_) => Vec::new(),
            Content::Nodes(nodes) => nodes
                .iter()
                .filter_map(|n| match n {
                    Node::Block(b) if b.is_block_level() => Some(b),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Enforce the tree invariants: empty nodes are pruned, adjacent text
    /// fragments are merged, and unstyled spans collapse into their parent.
    ///
    /// Returns `None` when nothing is left of this node.
    pub fn normalize(mut self) -> Option<Block> {
        if self.style.as_ref().is_some_and(InlineStyle::is_empty) {
            self.style = None;
        }
        self.content = match self.content {
            Content::Text(s) => {
                if s.is_empty() {
                    return None;
                }
                Content::Text(s)
            }
            Content::Nodes(nodes) => {
                let merged = normalize_nodes(nodes);
                match merged.as_slice() {
                    [] => return None,
                    [Node::Text(s)] => Content::Text(s.clone()),
                    _ => Content::Nodes(merged),
                }
            }
        };
        Some(self)
    }

    /// A span that adds nothing but grouping.
    fn is_collapsible(&self) -> bool {
        self.tag == "SPAN"
            && self.style.is_none()
            && !self.is_marker()
            && self.class.is_none()
    }

    /// The subtree covering `range` of this block's text, with structure
    /// preserved. Returns `None` when the range selects no text.
    pub fn slice(&self, range: Range<usize>) -> Option<Block> {
        let len = self.text_len();
        let start = range.start.min(len);
        let end = range.end.min(len);
        if start >= end {
            return None;
        }
        if start == 0 && end == len {
            return Some(self.clone());
        }
        let content = match &self.content {
            Content::Text(s) => Content::Text(s.get(start..end)?.to_string()),
            Content::Nodes(nodes) => {
                let mut out = Vec::new();
                let mut offset = 0;
                for node in nodes {
                    let node_len = node.text_len();
                    let node_range = offset..offset + node_len;
                    offset += node_len;
                    let lo = start.max(node_range.start);
                    let hi = end.min(node_range.end);
                    if lo >= hi {
                        continue;
                    }
                    let local = lo - node_range.start..hi - node_range.start;
                    match node {
                        Node::Text(s) => {
                            if let Some(part) = s.get(local) {
                                out.push(Node::Text(part.to_string()));
                            }
                        }
                        Node::Block(b) => {
                            if let Some(part) = b.slice(local) {
                                out.push(Node::Block(part));
                            }
                        }
                    }
                }
                if out.is_empty() {
                    return None;
                }
                Content::Nodes(out)
            }
        };
        Some(Block {
            content,
            ..self.shallow_clone()
        })
    }

    fn shallow_clone(&self) -> Block {
        Block {
            tag: self.tag.clone(),
            style: self.style.clone(),
            content: Content::Text(String::new()),
            footnote: self.footnote.clone(),
            class: self.class.clone(),
            marker: self.marker,
            hidden: self.hidden,
        }
    }

    /// Footnote markers in document order with their label ranges.
    pub fn markers(&self) -> Vec<MarkerSpan> {
        let mut out = Vec::new();
        self.collect_markers(0, &mut out);
        out
    }

    fn collect_markers(&self, base: usize, out: &mut Vec<MarkerSpan>) {
        if let Some(id) = self.marker {
            out.push(MarkerSpan {
                id,
                range: base..base + self.text_len(),
                hidden: self.hidden,
            });
            return;
        }
        if let Content::Nodes(nodes) = &self.content {
            let mut offset = base;
            for node in nodes {
                if let Node::Block(b) = node {
                    b.collect_markers(offset, out);
                }
                offset += node.text_len();
            }
        }
    }

    /// Visit every live marker node mutably, in document order.
    pub fn for_each_marker_mut(&mut self, f: &mut impl FnMut(&mut Block)) {
        if self.marker.is_some() {
            f(self);
            return;
        }
        if let Content::Nodes(nodes) = &mut self.content {
            for node in nodes {
                if let Node::Block(b) = node {
                    b.for_each_marker_mut(f);
                }
            }
        }
    }

    /// Visit every saved marker node (one still carrying its footnote
    /// payload) mutably, in document order.
    pub fn for_each_saved_marker_mut(&mut self, f: &mut impl FnMut(&mut Block)) {
        if self.footnote.is_some() {
            f(self);
            return;
        }
        if let Content::Nodes(nodes) = &mut self.content {
            for node in nodes {
                if let Node::Block(b) = node {
                    b.for_each_saved_marker_mut(f);
                }
            }
        }
    }

    /// Insert `marker` at text `offset`. Text leaves are split as needed; a
    /// marker is never inserted inside another marker.
    ///
    /// Returns `false` when `offset` lies past the end of the block.
    pub fn insert_marker(&mut self, offset: usize, marker: Block) -> bool {
        if offset > self.text_len() {
            return false;
        }
        let nodes = match &mut self.content {
            Content::Text(s) => {
                let Some((head, tail)) = s.split_at_checked(offset) else {
                    return false;
                };
                let mut nodes = Vec::with_capacity(3);
                if !head.is_empty() {
                    nodes.push(Node::Text(head.to_string()));
                }
                nodes.push(Node::Block(marker));
                if !tail.is_empty() {
                    nodes.push(Node::Text(tail.to_string()));
                }
                self.content = Content::Nodes(nodes);
                return true;
            }
            Content::Nodes(nodes) => nodes,
        };

        let mut pos = 0;
        for i in 0..nodes.len() {
            let len = nodes[i].text_len();
            if offset == pos {
                nodes.insert(i, Node::Block(marker));
                return true;
            }
            if offset < pos + len {
                let local = offset - pos;
                if let Node::Text(s) = &nodes[i] {
                    let Some((head, tail)) = s.split_at_checked(local) else {
                        return false;
                    };
                    let (head, tail) = (head.to_string(), tail.to_string());
                    nodes.splice(
                        i..=i,
                        [Node::Text(head), Node::Block(marker), Node::Text(tail)],
                    );
                    return true;
                }
                if let Node::Block(b) = &mut nodes[i] {
                    if !b.is_marker() {
                        return b.insert_marker(local, marker);
                    }
                }
                nodes.insert(i + 1, Node::Block(marker));
                return true;
            }
            pos += len;
        }
        nodes.push(Node::Block(marker));
        true
    }
}

impl Node {
    pub fn text_len(&self) -> usize {
        match self {
            Node::Text(s) => s.len(),
            Node::Block(b) => b.text_len(),
        }
    }
}

impl From<Block> for Node {
    fn from(block: Block) -> Self {
        Node::Block(block)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::Text(text.to_string())
    }
}

fn normalize_nodes(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(s) => push_text_node(&mut out, s),
            Node::Block(b) => {
                let Some(b) = b.normalize() else { continue };
                if b.is_collapsible() {
                    match b.content {
                        Content::Text(s) => push_text_node(&mut out, s),
                        Content::Nodes(children) => {
                            for child in children {
                                match child {
                                    Node::Text(s) => push_text_node(&mut out, s),
                                    other => out.push(other),
                                }
                            }
                        }
                    }
                } else {
                    out.push(Node::Block(b));
                }
            }
        }
    }
    out
}

fn push_text_node(out: &mut Vec<Node>, s: String) {
    if s.is_empty() {
        return;
    }
    if let Some(Node::Text(prev)) = out.last_mut() {
        prev.push_str(&s);
    } else {
        out.push(Node::Text(s));
    }
}

/// Configuration for a page: size, margins, footer spacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    /// Page size. Defaults to A4.
    #[serde(default)]
    pub size: PageSize,

    /// Page margins in points (1/72 inch).
    #[serde(default = "default_margin")]
    pub margin: Edges,

    /// Gap between the last line of flow content and the footer list.
    #[serde(default = "default_footer_gap")]
    pub footer_gap: f64,

    /// Vertical gap between consecutive sheets of paper on screen.
    #[serde(default = "default_page_gap")]
    pub page_gap: f64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: PageSize::A4,
            margin: default_margin(),
            footer_gap: default_footer_gap(),
            page_gap: default_page_gap(),
        }
    }
}

fn default_margin() -> Edges {
    Edges::uniform(54.0) // ~0.75 inch
}

fn default_footer_gap() -> f64 {
    12.0
}

fn default_page_gap() -> f64 {
    16.0
}

impl PageConfig {
    /// Width available to flow content and footers.
    pub fn content_width(&self) -> f64 {
        let (w, _) = self.size.dimensions();
        (w - self.margin.horizontal()).max(0.0)
    }

    /// Height between top and bottom margin.
    pub fn content_height(&self) -> f64 {
        let (_, h) = self.size.dimensions();
        (h - self.margin.vertical()).max(0.0)
    }
}

/// Standard page sizes in points.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Custom {
        width: f64,
        height: f64,
    },
}

impl PageSize {
    /// Returns (width, height) in points.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

/// Edge values (top, right, bottom, left) used for margins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn symmetric(vertical: f64, horizontal: f64) -> Self {
        Self {
            top: vertical,
            right: horizontal,
            bottom: vertical,
            left: horizontal,
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}
