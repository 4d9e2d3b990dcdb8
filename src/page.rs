use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use crate::dom::Document;
use crate::error::{Result, ScanError};
use crate::highlight::{self, HighlightSummary, MatchStrategy};

/// What the scanner needs from the page it is pointed at.
pub trait PageHost {
    fn url(&self) -> &str;
    fn title(&self) -> String;
    /// Visible text of the primary content region, or `None` if there is
    /// nothing to read.
    fn extract_text(&self) -> Option<String>;
    /// Replace any earlier highlights with markers around `sentences`.
    fn highlight(&mut self, sentences: &[String], strategy: MatchStrategy) -> HighlightSummary;
}

/// A page held in memory as a mutable document.
#[derive(Debug)]
pub struct HtmlPage {
    url: String,
    doc: Document,
}

impl HtmlPage {
    pub fn from_html(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            doc: Document::parse(html),
        }
    }

    /// `target` is either an http(s) URL or a path to a local HTML file.
    pub async fn load(target: &str) -> Result<Self> {
        if target.starts_with("http://") || target.starts_with("https://") {
            Self::fetch(target).await
        } else {
            Self::from_file(Path::new(target))
        }
    }

    pub async fn fetch(url: &str) -> Result<Self> {
        info!("Fetching {}", url);
        let resp = reqwest::get(url)
            .await
            .map_err(|e| ScanError::Page(format!("{}: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScanError::Page(format!(
                "{} returned HTTP {}",
                url,
                status.as_u16()
            )));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| ScanError::Page(format!("{}: failed to read body: {}", url, e)))?;
        debug!("Fetched {} bytes from {}", html.len(), url);
        Ok(Self::from_html(url, &html))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let html = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Page(format!("{}: {}", path.display(), e)))?;
        let url = std::fs::canonicalize(path)
            .map(|p| format!("file://{}", p.display()))
            .unwrap_or_else(|_| path.display().to_string());
        Ok(Self::from_html(&url, &html))
    }

    pub fn to_html(&self) -> String {
        self.doc.to_html()
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_html()).with_context(|| format!("Failed to write {:?}", path))
    }
}

impl PageHost for HtmlPage {
    fn url(&self) -> &str {
        if self.url.trim().is_empty() {
            "unknown"
        } else {
            &self.url
        }
    }

    /// Document title, else the raw URL (possibly empty).
    fn title(&self) -> String {
        self.doc.title().unwrap_or_else(|| self.url.trim().to_string())
    }

    fn extract_text(&self) -> Option<String> {
        let text = self.doc.inner_text(self.doc.primary_content());
        (!text.trim().is_empty()).then_some(text)
    }

    fn highlight(&mut self, sentences: &[String], strategy: MatchStrategy) -> HighlightSummary {
        highlight::reannotate(&mut self.doc, sentences, strategy)
    }
}
