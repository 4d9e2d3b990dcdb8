use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::db;
use crate::verify::VerificationResult;

pub const HISTORY_KEY: &str = "misinfo_history_v1";
/// Oldest records are evicted past this many.
pub const HISTORY_CAP: usize = 50;

/// One completed scan. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub results: Vec<VerificationResult>,
}

impl ScanRecord {
    pub fn new(url: &str, title: &str, results: Vec<VerificationResult>) -> Self {
        let url = if url.trim().is_empty() { "unknown" } else { url.trim() };
        let title = match title.trim() {
            "" if url != "unknown" => url,
            "" => "page",
            t => t,
        };
        Self {
            url: url.to_string(),
            title: title.to_string(),
            timestamp: Utc::now(),
            results,
        }
    }

    pub fn flagged_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_flagged()).count()
    }
}

/// Persisted scan history, newest first, stored as a single JSON value.
pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::connect(path)?;
        db::init_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = db::connect_in_memory()?;
        db::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Current history. Entries that no longer decode are skipped.
    pub fn read(&self) -> Result<Vec<ScanRecord>> {
        let Some(raw) = db::kv_get(&self.conn, HISTORY_KEY)? else {
            return Ok(Vec::new());
        };

        let entries: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) | Err(_) => {
                warn!("Stored history is not a JSON array; treating as empty");
                return Ok(Vec::new());
            }
        };

        let total = entries.len();
        let records: Vec<ScanRecord> = entries
            .into_iter()
            .filter_map(|e| serde_json::from_value(e).ok())
            .collect();
        if records.len() < total {
            warn!("Skipped {} unreadable history entries", total - records.len());
        }
        Ok(records)
    }

    /// Prepend `record`, evict past the cap, write the whole value back.
    /// Returns the new history length.
    pub fn append(&self, record: ScanRecord) -> Result<usize> {
        let mut history = self.read()?;
        history.insert(0, record);
        history.truncate(HISTORY_CAP);
        self.write(&history)?;
        debug!("History now holds {} scans", history.len());
        Ok(history.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.write(&[])
    }

    pub fn stats(&self) -> Result<Stats> {
        Ok(compute_stats(&self.read()?))
    }

    fn write(&self, history: &[ScanRecord]) -> Result<()> {
        let raw = serde_json::to_string(history).context("Failed to encode history")?;
        db::kv_set(&self.conn, HISTORY_KEY, &raw)
    }
}

/// Aggregates over every result in the history. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub fake_count: usize,
    pub verified_count: usize,
    /// Mean confidence in [0, 1]; `None` when there are no results
    pub avg_confidence: Option<f64>,
}

impl Stats {
    /// Rounded percentage, or "N/A".
    pub fn avg_display(&self) -> String {
        match self.avg_confidence {
            Some(avg) => format!("{}%", (avg * 100.0).round() as i64),
            None => "N/A".to_string(),
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fake:           {}", self.fake_count)?;
        writeln!(f, "Verified:       {}", self.verified_count)?;
        write!(f, "Avg confidence: {}", self.avg_display())
    }
}

pub fn compute_stats(history: &[ScanRecord]) -> Stats {
    let mut stats = Stats::default();
    let mut sum = 0.0;
    let mut count = 0usize;

    for r in history.iter().flat_map(|rec| rec.results.iter()) {
        if r.is_flagged() {
            stats.fake_count += 1;
        } else {
            stats.verified_count += 1;
        }
        let c = if r.confidence.is_finite() { r.confidence } else { 0.0 };
        sum += c;
        count += 1;
    }

    stats.avg_confidence = (count > 0).then(|| sum / count as f64);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Label;

    fn result(text: &str, label: Label, confidence: f64) -> VerificationResult {
        VerificationResult {
            text: text.to_string(),
            label,
            confidence,
            evidence: Vec::new(),
        }
    }

    fn record(n: usize) -> ScanRecord {
        ScanRecord::new(&format!("https://example.com/{n}"), &format!("Page {n}"), Vec::new())
    }

    #[test]
    fn empty_store_reads_empty() {
        let store = ResultStore::in_memory().unwrap();
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn append_prepends_newest() {
        let store = ResultStore::in_memory().unwrap();
        store.append(record(1)).unwrap();
        store.append(record(2)).unwrap();
        let h = store.read().unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].title, "Page 2");
        assert_eq!(h[1].title, "Page 1");
    }

    #[test]
    fn history_is_capped() {
        let store = ResultStore::in_memory().unwrap();
        for n in 0..(HISTORY_CAP + 7) {
            let len = store.append(record(n)).unwrap();
            assert!(len <= HISTORY_CAP);
        }
        let h = store.read().unwrap();
        assert_eq!(h.len(), HISTORY_CAP);
        assert_eq!(h[0].title, format!("Page {}", HISTORY_CAP + 6));
        assert_eq!(h[HISTORY_CAP - 1].title, "Page 7");
    }

    #[test]
    fn clear_empties() {
        let store = ResultStore::in_memory().unwrap();
        store.append(record(1)).unwrap();
        store.clear().unwrap();
        assert!(store.read().unwrap().is_empty());
        assert_eq!(store.stats().unwrap(), Stats::default());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.sqlite");
        {
            let store = ResultStore::open(&path).unwrap();
            let rec = ScanRecord::new(
                "https://news.example/a",
                "A",
                vec![result("Claim one is fake.", Label::Fake, 0.75)],
            );
            store.append(rec).unwrap();
        }
        let store = ResultStore::open(&path).unwrap();
        let h = store.read().unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].results[0].label, Label::Fake);
        assert_eq!(h[0].results[0].confidence, 0.75);
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let store = ResultStore::in_memory().unwrap();
        store.append(record(1)).unwrap();
        let good = db::kv_get(&store.conn, HISTORY_KEY).unwrap().unwrap();
        let mixed = format!("[{{\"bogus\": true}}, {}]", &good[1..good.len() - 1]);
        db::kv_set(&store.conn, HISTORY_KEY, &mixed).unwrap();
        assert_eq!(store.read().unwrap().len(), 1);

        db::kv_set(&store.conn, HISTORY_KEY, "not json").unwrap();
        assert!(store.read().unwrap().is_empty());
    }

    #[test]
    fn stats_empty_is_not_applicable() {
        let s = compute_stats(&[]);
        assert_eq!(s.fake_count, 0);
        assert_eq!(s.verified_count, 0);
        assert_eq!(s.avg_confidence, None);
        assert_eq!(s.avg_display(), "N/A");

        let no_results = vec![record(1), record(2)];
        assert_eq!(compute_stats(&no_results).avg_display(), "N/A");
    }

    #[test]
    fn stats_average_of_two() {
        let rec = ScanRecord::new(
            "u",
            "t",
            vec![
                result("a", Label::Unverified, 0.2),
                result("b", Label::Fake, 0.8),
            ],
        );
        let s = compute_stats(&[rec]);
        assert_eq!(s.fake_count, 2);
        assert_eq!(s.verified_count, 0);
        assert_eq!(s.avg_display(), "50%");
    }

    #[test]
    fn stats_classify_by_label_and_coerce_nan() {
        let rec = ScanRecord::new(
            "u",
            "t",
            vec![
                result("a", Label::Verified, 1.0),
                result("b", Label::Other, f64::NAN),
                result("c", Label::Fake, 0.5),
            ],
        );
        let s = compute_stats(&[rec]);
        assert_eq!(s.fake_count, 1);
        assert_eq!(s.verified_count, 2);
        assert_eq!(s.avg_display(), "50%");
    }

    #[test]
    fn record_fallbacks() {
        let r = ScanRecord::new("", "", Vec::new());
        assert_eq!((r.url.as_str(), r.title.as_str()), ("unknown", "page"));
        let r = ScanRecord::new("https://x.org", " ", Vec::new());
        assert_eq!(r.title, "https://x.org");
    }
}
