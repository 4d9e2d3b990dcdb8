use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{Result, ScanError};
use crate::highlight::{HighlightSummary, MatchStrategy};
use crate::history::{ResultStore, ScanRecord};
use crate::page::PageHost;
use crate::text;
use crate::verify::strategy::{self, ScanMode, StrategyOutcome};
use crate::verify::{VerificationResult, VerifyBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Extracting,
    Scanning,
    Persisting,
    /// Last scan ended badly; a new scan may start from here
    Error,
}

/// Outcome shown to the user once a scan has run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    Done { flagged: usize },
    NoSentences,
    /// Every response came back in an unexpected shape
    Warning(String),
    /// Every request failed
    Failed(String),
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Done { flagged } => write!(f, "Done - {} fake claim(s) detected.", flagged),
            ScanStatus::NoSentences => write!(f, "No sentences to scan."),
            ScanStatus::Warning(msg) | ScanStatus::Failed(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug)]
pub struct ScanReport {
    pub status: ScanStatus,
    pub results: Vec<VerificationResult>,
    pub highlight: HighlightSummary,
    pub history_len: usize,
}

/// Drives one page through extract, verify, highlight and persist.
pub struct Scanner {
    backend: Arc<dyn VerifyBackend>,
    settings: Settings,
    state: Mutex<ScanState>,
    show_progress: bool,
}

impl Scanner {
    pub fn new(backend: Arc<dyn VerifyBackend>, settings: Settings) -> Self {
        Self {
            backend,
            settings,
            state: Mutex::new(ScanState::Idle),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: ScanState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Claim the scanner for one run. Only one scan may be in flight.
    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            ScanState::Idle | ScanState::Error => {
                *state = ScanState::Extracting;
                Ok(())
            }
            _ => Err(ScanError::Busy),
        }
    }

    fn fail(&self, err: ScanError) -> ScanError {
        self.set_state(ScanState::Error);
        err
    }

    pub async fn scan(
        &self,
        page: &mut dyn PageHost,
        store: &ResultStore,
        mode: ScanMode,
        strategy: MatchStrategy,
    ) -> Result<ScanReport> {
        self.begin()?;
        let t0 = Instant::now();

        let cleaned = page
            .extract_text()
            .map(|raw| text::clean(&raw))
            .unwrap_or_default();
        if cleaned.is_empty() {
            return Err(self.fail(ScanError::NoText));
        }

        self.set_state(ScanState::Scanning);
        let outcome = self.run_strategy(&cleaned, mode).await;

        let flagged: Vec<String> = outcome.results.iter().map(|r| r.text.clone()).collect();
        let highlight = page.highlight(&flagged, strategy);
        if highlight.marks < flagged.iter().filter(|t| !t.trim().is_empty()).count() {
            warn!(
                "Only {} highlights placed for {} flagged sentences",
                highlight.marks,
                flagged.len()
            );
        }

        self.set_state(ScanState::Persisting);
        let record = ScanRecord::new(page.url(), &page.title(), outcome.results.clone());
        let history_len = store
            .append(record)
            .map_err(|e| self.fail(ScanError::Store(format!("{:#}", e))))?;

        let status = status_for(mode, &outcome);
        let end_state = match status {
            ScanStatus::Failed(_) | ScanStatus::Warning(_) => ScanState::Error,
            _ => ScanState::Idle,
        };
        self.set_state(end_state);

        info!("{} ({:.1}s)", status, t0.elapsed().as_secs_f64());
        Ok(ScanReport {
            status,
            results: outcome.results,
            highlight,
            history_len,
        })
    }

    async fn run_strategy(&self, cleaned: &str, mode: ScanMode) -> StrategyOutcome {
        match mode {
            ScanMode::PerSentence => {
                let sentences = text::segment(cleaned);
                info!("Scanning {} sentences", sentences.len());
                let pb = self.progress(sentences.len());
                let out = strategy::scan_sentences(
                    Arc::clone(&self.backend),
                    sentences,
                    self.settings.workers,
                    &pb,
                )
                .await;
                pb.finish_and_clear();
                out
            }
            ScanMode::Batch => {
                let chunks = cleaned
                    .chars()
                    .count()
                    .div_ceil(self.settings.chunk_chars.max(1))
                    .min(self.settings.max_chunks);
                info!("Scanning page in {} chunks", chunks);
                let pb = self.progress(chunks);
                let out = strategy::scan_chunks(
                    self.backend.as_ref(),
                    cleaned,
                    self.settings.chunk_chars,
                    self.settings.max_chunks,
                    &pb,
                )
                .await;
                pb.finish_and_clear();
                out
            }
        }
    }

    fn progress(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

fn status_for(mode: ScanMode, outcome: &StrategyOutcome) -> ScanStatus {
    if outcome.total_failure() {
        ScanStatus::Failed("Error contacting backend.".to_string())
    } else if outcome.all_malformed() {
        ScanStatus::Warning("Unexpected response format from backend.".to_string())
    } else if mode == ScanMode::PerSentence && outcome.attempted == 0 {
        ScanStatus::NoSentences
    } else {
        ScanStatus::Done {
            flagged: outcome.results.len(),
        }
    }
}
