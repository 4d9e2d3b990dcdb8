use std::sync::Arc;

use indicatif::ProgressBar;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use super::{VerificationResult, VerifyBackend};
use crate::text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// One `/verify` request per sentence, bounded worker pool
    #[default]
    PerSentence,
    /// Sequential `/verify-page` requests over fixed-size chunks
    Batch,
}

/// Flagged results plus enough bookkeeping to tell partial from total failure.
#[derive(Debug, Default)]
pub struct StrategyOutcome {
    pub results: Vec<VerificationResult>,
    pub attempted: usize,
    pub failed: usize,
    pub malformed: usize,
}

impl StrategyOutcome {
    /// Every request failed at the transport or status level.
    pub fn total_failure(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }

    /// Every request that came back had an unexpected shape.
    pub fn all_malformed(&self) -> bool {
        self.malformed > 0 && self.malformed + self.failed == self.attempted
    }
}

enum ClaimOutcome {
    Flagged(VerificationResult),
    Cleared,
    Failed,
    Malformed,
}

/// Check each sentence with its own request, at most `workers` in flight.
/// Every sentence is attempted exactly once; failures are dropped. Results
/// arrive in completion order.
pub async fn scan_sentences(
    backend: Arc<dyn VerifyBackend>,
    sentences: Vec<String>,
    workers: usize,
    progress: &ProgressBar,
) -> StrategyOutcome {
    let attempted = sentences.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let (tx, mut rx) = mpsc::channel::<ClaimOutcome>(workers.max(1) * 2);

    for sentence in sentences {
        let backend = Arc::clone(&backend);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let outcome = match sem.acquire().await {
                Ok(_permit) => check_claim(backend.as_ref(), sentence).await,
                Err(_) => ClaimOutcome::Failed,
            };
            let _ = tx.send(outcome).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut out = StrategyOutcome {
        attempted,
        ..Default::default()
    };
    while let Some(outcome) = rx.recv().await {
        match outcome {
            ClaimOutcome::Flagged(r) => out.results.push(r),
            ClaimOutcome::Cleared => {}
            ClaimOutcome::Failed => out.failed += 1,
            ClaimOutcome::Malformed => out.malformed += 1,
        }
        progress.inc(1);
    }

    info!(
        "Checked {} sentences ({} flagged, {} failed, {} malformed)",
        attempted,
        out.results.len(),
        out.failed,
        out.malformed
    );
    out
}

async fn check_claim(backend: &dyn VerifyBackend, sentence: String) -> ClaimOutcome {
    match backend.verify_claim(&sentence).await {
        Ok(body) => match VerificationResult::from_service(&body, Some(&sentence)) {
            Some(r) if r.is_flagged() => ClaimOutcome::Flagged(r),
            Some(_) => ClaimOutcome::Cleared,
            None => {
                warn!("Non-object /verify response for {:?}", truncate(&sentence));
                ClaimOutcome::Malformed
            }
        },
        Err(e) => {
            warn!("Verify failed for {:?}: {}", truncate(&sentence), e);
            ClaimOutcome::Failed
        }
    }
}

/// Check the text in fixed-size chunks, one request at a time, keeping
/// chunk order in the concatenated results.
pub async fn scan_chunks(
    backend: &dyn VerifyBackend,
    text: &str,
    chunk_chars: usize,
    max_chunks: usize,
    progress: &ProgressBar,
) -> StrategyOutcome {
    let chunks = text::chunk(text, chunk_chars, max_chunks);
    let mut out = StrategyOutcome {
        attempted: chunks.len(),
        ..Default::default()
    };

    for (i, chunk) in chunks.iter().enumerate() {
        match backend.verify_page(chunk).await {
            Ok(body) => match page_results(&body) {
                Some(records) => {
                    let before = out.results.len();
                    out.results.extend(
                        records
                            .iter()
                            .filter_map(|r| VerificationResult::from_service(r, None))
                            .filter(VerificationResult::is_flagged),
                    );
                    debug!("Chunk {}: {} flagged", i, out.results.len() - before);
                }
                None => {
                    warn!("Chunk {}: response has no results array", i);
                    out.malformed += 1;
                }
            },
            Err(e) => {
                warn!("Chunk {} failed: {}", i, e);
                out.failed += 1;
            }
        }
        progress.inc(1);
    }

    info!(
        "Checked {} chunks ({} flagged, {} failed, {} malformed)",
        out.attempted,
        out.results.len(),
        out.failed,
        out.malformed
    );
    out
}

fn page_results(body: &Value) -> Option<&Vec<Value>> {
    body.get("results").and_then(Value::as_array)
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= 60 {
        s.to_string()
    } else {
        let head: String = s.chars().take(60).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::verify::fake::FakeBackend;
    use crate::verify::Label;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn sentences(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("Sentence number {} says something quite checkable.", i))
            .collect()
    }

    #[tokio::test]
    async fn one_request_per_sentence() {
        let backend = Arc::new(FakeBackend::claims(|_| Ok(json!({"label": "Verified"}))));
        let input = sentences(23);
        let out = scan_sentences(backend.clone(), input.clone(), 5, &ProgressBar::hidden()).await;

        assert_eq!(backend.calls(), 23);
        assert_eq!(out.attempted, 23);
        let seen: HashSet<String> = backend.seen().into_iter().collect();
        assert_eq!(seen.len(), 23, "a sentence was sent twice");
        assert_eq!(seen, input.into_iter().collect::<HashSet<_>>());
        assert!(out.results.is_empty());
    }

    #[tokio::test]
    async fn pool_is_bounded() {
        let backend = Arc::new(
            FakeBackend::claims(|_| Ok(json!({"label": "fake", "confidence": 0.5}))).with_delay(20),
        );
        let out = scan_sentences(backend.clone(), sentences(17), 5, &ProgressBar::hidden()).await;

        assert_eq!(out.results.len(), 17);
        let peak = backend.max_in_flight.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak in-flight was {}", peak);
        assert!(peak >= 2, "workers never overlapped");
    }

    #[tokio::test]
    async fn failures_are_skipped_not_fatal() {
        let backend = Arc::new(FakeBackend::claims(|claim| {
            if claim.contains(" 3 ") || claim.contains(" 7 ") {
                Err(ScanError::Status(502))
            } else if claim.contains(" 5 ") {
                Ok(json!("not an object"))
            } else {
                Ok(json!({"label": "UNVERIFIED", "confidence": 0.7, "evidence": ["x"]}))
            }
        }));
        let out = scan_sentences(backend.clone(), sentences(10), 5, &ProgressBar::hidden()).await;

        assert_eq!(backend.calls(), 10);
        assert_eq!(out.failed, 2);
        assert_eq!(out.malformed, 1);
        assert_eq!(out.results.len(), 7);
        assert!(!out.total_failure());
        for r in &out.results {
            assert_eq!(r.label, Label::Unverified);
            assert!(r.text.starts_with("Sentence number"));
        }
    }

    #[tokio::test]
    async fn all_failing_is_total_failure() {
        let backend = Arc::new(FakeBackend::claims(|_| Err(ScanError::Status(500))));
        let out = scan_sentences(backend, sentences(4), 5, &ProgressBar::hidden()).await;
        assert!(out.results.is_empty());
        assert!(out.total_failure());
    }

    #[tokio::test]
    async fn no_sentences_no_requests() {
        let backend = Arc::new(FakeBackend::claims(|_| Ok(json!({}))));
        let out = scan_sentences(backend.clone(), Vec::new(), 5, &ProgressBar::hidden()).await;
        assert_eq!(backend.calls(), 0);
        assert!(!out.total_failure());
    }

    #[tokio::test]
    async fn batch_never_exceeds_chunk_cap() {
        let backend = FakeBackend::pages(|_| Ok(json!({"results": []})));
        let text = "word ".repeat(10_000);
        let out = scan_chunks(&backend, &text, 2000, 10, &ProgressBar::hidden()).await;
        assert_eq!(backend.calls(), 10);
        assert_eq!(out.attempted, 10);
        assert!(backend.seen().iter().all(|c| c.chars().count() == 2000));
    }

    #[tokio::test]
    async fn batch_filters_and_keeps_chunk_order() {
        let backend = FakeBackend::pages(|chunk| {
            let tag = &chunk[..1];
            Ok(json!({"results": [
                {"sentence": format!("{tag} first"), "label": "Fake", "confidence": 0.8},
                {"claim": format!("{tag} second"), "label": "verified", "confidence": 0.9},
                {"text": format!("{tag} third"), "label": "unverified"}
            ]}))
        });
        let text = format!("{}{}", "a".repeat(2000), "b".repeat(500));
        let out = scan_chunks(&backend, &text, 2000, 10, &ProgressBar::hidden()).await;

        let texts: Vec<&str> = out.results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["a first", "a third", "b first", "b third"]);
        assert_eq!(out.results[1].confidence, 0.0);
    }

    #[tokio::test]
    async fn batch_skips_failed_and_malformed_chunks() {
        let backend = FakeBackend::pages(|chunk| match &chunk[..1] {
            "a" => Err(ScanError::Status(503)),
            "b" => Ok(json!({"oops": true})),
            _ => Ok(json!({"results": [{"sentence": "ok", "label": "fake"}]})),
        });
        let text = format!("{}{}{}", "a".repeat(10), "b".repeat(10), "c".repeat(10));
        let out = scan_chunks(&backend, &text, 10, 10, &ProgressBar::hidden()).await;

        assert_eq!(out.failed, 1);
        assert_eq!(out.malformed, 1);
        assert_eq!(out.results.len(), 1);
        assert!(!out.all_malformed());
    }

    #[tokio::test]
    async fn batch_all_malformed_is_flagged_as_such() {
        let backend = FakeBackend::pages(|_| Ok(json!({"results": "nope"})));
        let out = scan_chunks(&backend, "some page text", 2000, 10, &ProgressBar::hidden()).await;
        assert!(out.all_malformed());
        assert!(!out.total_failure());
    }
}
