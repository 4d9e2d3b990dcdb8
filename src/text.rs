use std::sync::LazyLock;

use regex::Regex;

static JUNK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[^a-zA-Z0-9.,?!'"\s]"#).unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Sentences must be longer than this many characters...
const MIN_CHARS: usize = 20;
/// ...and have more than this many words.
const MIN_WORDS: usize = 5;

/// Drop symbols outside the allowlist and collapse whitespace to single spaces.
pub fn clean(text: &str) -> String {
    let stripped = JUNK_RE.replace_all(text, "");
    SPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// `clean`ed text that remembers where each of its bytes came from.
///
/// `text` is the untrimmed form of `clean(raw)`. Every byte of it is
/// ASCII; `starts[i]..ends[i]` is the range of `raw` it was produced
/// from. A collapsed whitespace run maps to the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanView {
    pub text: String,
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
}

impl CleanView {
    /// Map a byte range of `text` back to `raw`.
    pub fn raw_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if start >= end || end > self.text.len() {
            return None;
        }
        Some((self.starts[start], self.ends[end - 1]))
    }
}

pub fn clean_view(raw: &str) -> CleanView {
    let mut view = CleanView {
        text: String::with_capacity(raw.len()),
        starts: Vec::with_capacity(raw.len()),
        ends: Vec::with_capacity(raw.len()),
    };
    for (idx, c) in raw.char_indices() {
        let end = idx + c.len_utf8();
        if c.is_whitespace() {
            if view.text.ends_with(' ') {
                if let Some(last) = view.ends.last_mut() {
                    *last = end;
                }
                continue;
            }
            view.text.push(' ');
        } else if is_kept(c) {
            view.text.push(c);
        } else {
            continue;
        }
        view.starts.push(idx);
        view.ends.push(end);
    }
    view
}

/// Survives `clean`.
pub fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | ',' | '?' | '!' | '\'' | '"') || c.is_whitespace()
}

/// Split prose into checkable sentences, keeping each terminator with the
/// sentence it ends. Short or low-word fragments are discarded.
pub fn segment(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in BOUNDARY_RE.find_iter(text) {
        // terminator is a single ASCII byte
        let end = m.start() + 1;
        pieces.push(&text[start..end]);
        start = m.end();
    }
    pieces.push(&text[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|s| is_checkable(s))
        .map(str::to_string)
        .collect()
}

fn is_checkable(sentence: &str) -> bool {
    sentence.chars().count() > MIN_CHARS && sentence.split_whitespace().count() > MIN_WORDS
}

/// Fixed-size character chunks, at most `max_chunks`. Anything past the
/// last chunk is dropped.
pub fn chunk(text: &str, chunk_chars: usize, max_chunks: usize) -> Vec<&str> {
    let size = chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            if chunks.len() == max_chunks {
                return chunks;
            }
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() && chunks.len() < max_chunks {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clean_collapses_and_strips() {
        assert_eq!(
            clean("  Hello,\n\n   world!  — it's \"fine\" ©2024.  "),
            "Hello, world! it's \"fine\" 2024."
        );
    }

    #[test]
    fn clean_keeps_terminators() {
        assert_eq!(clean("One. Two? Three!"), "One. Two? Three!");
    }

    #[test]
    fn view_maps_back_to_source() {
        let raw = "The well-known\n   bridge — fell.";
        let view = clean_view(raw);
        assert_eq!(view.text, "The wellknown bridge fell.");
        let at = view.text.find("wellknown bridge").unwrap();
        let (s, e) = view.raw_range(at, at + "wellknown bridge".len()).unwrap();
        assert_eq!(&raw[s..e], "well-known\n   bridge");
        assert_eq!(view.raw_range(3, 3), None);
    }

    #[test]
    fn segment_keeps_delimiter_with_preceding_sentence() {
        let text = "The committee approved the budget for next year. \
                    Did the council really vote against the new park? \
                    Nobody expected the river to flood the whole valley!";
        let s = segment(text);
        assert_eq!(s.len(), 3);
        assert!(s[0].ends_with("next year."));
        assert!(s[1].starts_with("Did the council"));
        assert!(s[1].ends_with('?'));
        assert!(s[2].ends_with('!'));
    }

    #[test]
    fn segment_drops_short_and_thin_pieces() {
        let text = "Too short. Paris is the capital of France. Gravity makes objects fall upward.";
        let s = segment(text);
        // the last sentence has exactly five words
        assert_eq!(s, vec!["Paris is the capital of France.".to_string()]);
    }

    #[test]
    fn segment_needs_whitespace_after_terminator() {
        let s = segment("Version 1.2.3 of the library shipped with several breaking changes.");
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn segment_empty() {
        assert!(segment("").is_empty());
        assert!(segment("   ").is_empty());
    }

    #[test]
    fn chunk_caps_count() {
        let text = "a".repeat(25_000);
        let chunks = chunk(&text, 2000, 10);
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.len() == 2000));
    }

    #[test]
    fn chunk_keeps_remainder() {
        let text = "abcdefghij";
        assert_eq!(chunk(text, 4, 10), vec!["abcd", "efgh", "ij"]);
        assert_eq!(chunk(text, 5, 10), vec!["abcde", "fghij"]);
        assert!(chunk("", 4, 10).is_empty());
    }

    #[test]
    fn chunk_respects_char_boundaries() {
        let text = "héllo wörld";
        let chunks = chunk(text, 3, 10);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
    }

    proptest! {
        #[test]
        fn segments_satisfy_minimums(text in "[a-zA-Z .!?,]{0,400}") {
            for s in segment(&text) {
                prop_assert!(s.chars().count() > 20);
                prop_assert!(s.split_whitespace().count() > 5);
            }
        }

        #[test]
        fn segments_preserve_source_order(text in "[a-z .!?]{0,400}") {
            let mut cursor = 0;
            for s in segment(&text) {
                let found = text[cursor..].find(s.as_str());
                prop_assert!(found.is_some());
                cursor += found.unwrap() + s.len();
            }
        }

        #[test]
        fn view_agrees_with_clean(raw in "[a-zA-Z0-9 \\t\\n.,?!'\"()\\-é—©]{0,200}") {
            let view = clean_view(&raw);
            prop_assert_eq!(view.text.trim(), clean(&raw));
            prop_assert_eq!(view.starts.len(), view.text.len());
            for (i, b) in view.text.bytes().enumerate() {
                let src = &raw[view.starts[i]..view.ends[i]];
                if b == b' ' {
                    prop_assert!(src.starts_with(char::is_whitespace));
                } else {
                    prop_assert_eq!(src.as_bytes(), &[b]);
                }
            }
        }

        #[test]
        fn chunks_never_exceed_cap(len in 0usize..30_000, size in 1usize..3000) {
            let text = "x".repeat(len);
            let chunks = chunk(&text, size, 10);
            prop_assert!(chunks.len() <= 10);
            prop_assert!(chunks.iter().all(|c| c.len() <= size));
        }
    }
}
