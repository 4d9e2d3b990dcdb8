//! Plain-text rendering of scan results, history and stats.

use std::fmt::Write;

use crate::history::{ScanRecord, Stats};
use crate::verify::{EvidenceItem, VerificationResult, EVIDENCE_DISPLAY_LIMIT};

pub fn render_results(results: &[VerificationResult]) -> String {
    if results.is_empty() {
        return "No fake claims detected on this page.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Total Fake Claims Detected: {}", results.len());
    for (i, r) in results.iter().enumerate() {
        let _ = writeln!(out, "\n{:>3}. {}", i + 1, r.text);
        let _ = writeln!(out, "     ({} - {:.2})", r.label, r.confidence);

        if r.evidence.is_empty() {
            let _ = writeln!(out, "     No supporting evidence found.");
            continue;
        }
        for ev in r.evidence.iter().take(EVIDENCE_DISPLAY_LIMIT) {
            render_evidence(&mut out, ev);
        }
        if r.evidence.len() > EVIDENCE_DISPLAY_LIMIT {
            let _ = writeln!(
                out,
                "     ... {} more not shown",
                r.evidence.len() - EVIDENCE_DISPLAY_LIMIT
            );
        }
    }
    out
}

fn render_evidence(out: &mut String, ev: &EvidenceItem) {
    match ev {
        EvidenceItem::Text(s) => {
            let _ = writeln!(out, "     - {}", s);
        }
        EvidenceItem::Source(src) => {
            let title = src.title.as_deref().unwrap_or("Untitled");
            let url = src.url.as_deref().unwrap_or("#");
            match src.source.as_deref() {
                Some(publisher) => {
                    let _ = writeln!(out, "     - {} ({})", title, publisher);
                }
                None => {
                    let _ = writeln!(out, "     - {}", title);
                }
            }
            let _ = writeln!(out, "       {}", url);
        }
    }
}

pub fn render_history(history: &[ScanRecord], limit: Option<usize>) -> String {
    if history.is_empty() {
        return "No history yet.\n".to_string();
    }

    let mut out = String::new();
    let shown = limit.unwrap_or(history.len()).min(history.len());
    for (i, h) in history.iter().take(shown).enumerate() {
        let _ = writeln!(
            out,
            "{:>3} | {:<48} | {} | Fake: {}",
            i,
            truncate(&h.title, 48),
            h.timestamp.format("%Y-%m-%d %H:%M"),
            h.flagged_count()
        );
    }
    if shown < history.len() {
        let _ = writeln!(out, "\n{} of {} scans | factscan show <#>", shown, history.len());
    }
    out
}

pub fn render_record(record: &ScanRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", record.title);
    let _ = writeln!(out, "{}", record.url);
    let _ = writeln!(out, "{}\n", record.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    out.push_str(&render_results(&record.results));
    out
}

pub fn render_stats(stats: &Stats) -> String {
    format!("{}\n", stats)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
