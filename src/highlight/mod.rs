pub mod fuzzy;
pub mod precise;

use std::sync::LazyLock;

use rayon::prelude::*;
use scraper::Selector;
use tracing::debug;

use crate::dom::{Document, NodeId};
pub use fuzzy::FuzzyFinder;
pub use precise::PreciseFinder;

pub const HIGHLIGHT_CLASS: &str = "misinfo-highlight";
const HIGHLIGHT_STYLE: &str =
    "background-color: yellow; color: red; font-weight: 600; border-radius: 2px;";

static MARKER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(&format!("span.{}", HIGHLIGHT_CLASS)).unwrap());

/// Text under these elements is never highlighted.
const SKIP_ELEMENTS: &[&str] = &["script", "style", "noscript", "code", "textarea"];

/// Byte range into a text node's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Locates highlightable ranges in one text node. Returned spans are
/// sorted by start and never overlap.
pub trait SpanFinder: Send + Sync {
    fn find_spans(&self, text: &str) -> Vec<Span>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Case-insensitive match on cleaned text, partial-node splitting
    #[default]
    Precise,
    /// First-five-words loose match, whole-node highlighting
    Fuzzy,
}

impl MatchStrategy {
    pub fn finder(self, needles: &[String]) -> Box<dyn SpanFinder> {
        match self {
            MatchStrategy::Precise => Box::new(PreciseFinder::new(needles)),
            MatchStrategy::Fuzzy => Box::new(FuzzyFinder::new(needles)),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HighlightSummary {
    /// Markers from a previous pass that were removed
    pub cleared: usize,
    /// Text nodes rewritten
    pub nodes: usize,
    /// Markers inserted
    pub marks: usize,
}

/// Remove earlier highlights, then mark every occurrence of `flagged`
/// under `<body>`. Calling it twice with the same input leaves the
/// document as one call would.
pub fn reannotate(doc: &mut Document, flagged: &[String], strategy: MatchStrategy) -> HighlightSummary {
    let mut summary = HighlightSummary {
        cleared: clear_markers(doc),
        ..Default::default()
    };

    let needles = unique_needles(flagged);
    if needles.is_empty() {
        return summary;
    }

    let finder = strategy.finder(&needles);
    let scope = doc.body().unwrap_or(doc.root());
    let texts: Vec<(NodeId, String)> = doc
        .text_nodes(scope, SKIP_ELEMENTS)
        .into_iter()
        .filter_map(|id| Some((id, doc.text(id)?.to_string())))
        .collect();

    let hits: Vec<(NodeId, String, Vec<Span>)> = texts
        .into_par_iter()
        .filter_map(|(id, text)| {
            let spans = finder.find_spans(&text);
            (!spans.is_empty()).then_some((id, text, spans))
        })
        .collect();

    for (id, text, spans) in hits {
        summary.marks += split_node(doc, id, &text, &spans);
        summary.nodes += 1;
    }

    debug!(
        "Highlighted {} spans in {} text nodes ({} cleared)",
        summary.marks, summary.nodes, summary.cleared
    );
    summary
}

/// Replace every marker with its plain text and re-merge the text nodes
/// it split. Returns how many markers were removed.
pub fn clear_markers(doc: &mut Document) -> usize {
    let markers = doc.select(&MARKER);

    let mut cleared = 0;
    for m in markers {
        let text = doc.text_content(m);
        if doc.insert_text_before(m, &text).is_some() {
            doc.detach(m);
            cleared += 1;
        }
    }

    if cleared > 0 {
        doc.normalize();
    }
    cleared
}

fn unique_needles(flagged: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for s in flagged.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !out.iter().any(|o| o == s) {
            out.push(s.to_string());
        }
    }
    out
}

/// Rebuild a text node as plain/marker fragments in place. Unmatched text
/// is kept byte for byte; no empty text nodes are produced.
fn split_node(doc: &mut Document, id: NodeId, original: &str, spans: &[Span]) -> usize {
    let mut last = 0;
    let mut marks = 0;
    for s in spans {
        if s.start < last || s.end > original.len() || s.start >= s.end {
            continue;
        }
        if s.start > last {
            doc.insert_text_before(id, &original[last..s.start]);
        }
        let marker = doc.insert_element_before(
            id,
            "span",
            &[("class", HIGHLIGHT_CLASS), ("style", HIGHLIGHT_STYLE)],
            &original[s.start..s.end],
        );
        if marker.is_none() {
            return marks;
        }
        marks += 1;
        last = s.end;
    }
    if last < original.len() {
        doc.insert_text_before(id, &original[last..]);
    }

    doc.detach(id);
    marks
}
