use regex::{Regex, RegexBuilder};

use super::{Span, SpanFinder};
use crate::text;

/// Leading words of a sentence used to build its loose pattern.
const PREFIX_WORDS: usize = 5;

/// Loose matcher for text that went through lossy cleaning. A node whose
/// cleaned text contains the first five words of a flagged sentence, in
/// order with anything between them, is highlighted as a whole.
pub struct FuzzyFinder {
    patterns: Vec<Regex>,
}

impl FuzzyFinder {
    pub fn new(needles: &[String]) -> Self {
        let patterns = needles
            .iter()
            .filter_map(|n| {
                let words: Vec<String> = text::clean(n)
                    .split_whitespace()
                    .take(PREFIX_WORDS)
                    .map(regex::escape)
                    .collect();
                if words.is_empty() {
                    return None;
                }
                RegexBuilder::new(&words.join(".*?"))
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .collect();
        Self { patterns }
    }
}

impl SpanFinder for FuzzyFinder {
    fn find_spans(&self, raw: &str) -> Vec<Span> {
        if self.patterns.is_empty() {
            return Vec::new();
        }
        let cleaned = text::clean(raw);
        if self.patterns.iter().any(|re| re.is_match(&cleaned)) {
            vec![Span {
                start: 0,
                end: raw.len(),
            }]
        } else {
            Vec::new()
        }
    }
}
