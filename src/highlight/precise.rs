use regex::{Regex, RegexBuilder};
use tracing::warn;

use super::{Span, SpanFinder};
use crate::text::{self, CleanView};

/// Case-insensitive search for whole flagged sentences.
///
/// Flagged sentences come back from the service in cleaned form, so both
/// sides are compared cleaned: symbols `clean` drops are ignored and any
/// whitespace run matches any other. Spans are mapped back onto the raw
/// node text and widened over dropped symbols at either edge.
pub struct PreciseFinder {
    patterns: Vec<Regex>,
}

impl PreciseFinder {
    pub fn new(needles: &[String]) -> Self {
        let patterns = needles
            .iter()
            .filter_map(|n| {
                let cleaned = text::clean(n);
                let words: Vec<String> = cleaned.split_whitespace().map(regex::escape).collect();
                if words.is_empty() {
                    return None;
                }
                RegexBuilder::new(&words.join(r"\s+"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| warn!("Skipping unmatchable sentence: {}", e))
                    .ok()
            })
            .collect();
        Self { patterns }
    }
}

impl SpanFinder for PreciseFinder {
    fn find_spans(&self, text: &str) -> Vec<Span> {
        if self.patterns.is_empty() {
            return Vec::new();
        }
        let view = text::clean_view(text);

        let mut all: Vec<Span> = self
            .patterns
            .iter()
            .flat_map(|re| re.find_iter(&view.text))
            .filter_map(|m| raw_span(&view, text, m.start(), m.end()))
            .collect();
        all.sort_by_key(|s| s.start);

        // overlaps: the earlier-starting match wins, later ones are dropped
        let mut kept: Vec<Span> = Vec::with_capacity(all.len());
        for s in all {
            match kept.last() {
                Some(last) if s.start < last.end => {}
                _ => kept.push(s),
            }
        }
        kept
    }
}

fn raw_span(view: &CleanView, raw: &str, start: usize, end: usize) -> Option<Span> {
    let (mut start, mut end) = view.raw_range(start, end)?;
    while let Some(c) = raw[..start].chars().next_back().filter(|&c| !text::is_kept(c)) {
        start -= c.len_utf8();
    }
    while let Some(c) = raw[end..].chars().next().filter(|&c| !text::is_kept(c)) {
        end += c.len_utf8();
    }
    Some(Span { start, end })
}
