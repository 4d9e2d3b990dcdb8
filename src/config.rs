use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

pub const DEFAULT_BACKEND: &str = "http://127.0.0.1:8000";
const DEFAULT_DB_PATH: &str = "data/factscan.sqlite";

/// Runtime settings. Every field can be overridden with a `FACTSCAN_*`
/// environment variable, e.g. `FACTSCAN_BACKEND_URL`, `FACTSCAN_WORKERS`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend_url: String,
    pub db_path: PathBuf,
    /// Concurrent requests in per-sentence mode
    pub workers: usize,
    /// Characters per `/verify-page` request in batch mode
    pub chunk_chars: usize,
    /// Hard ceiling on batch requests per scan; text past it is not checked
    pub max_chunks: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            workers: 5,
            chunk_chars: 2000,
            max_chunks: 10,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(Environment::with_prefix("FACTSCAN").try_parsing(true))
            .build()
            .context("Failed to read FACTSCAN_* settings")?
            .try_deserialize()
            .context("Invalid FACTSCAN_* settings")?;
        Ok(settings.sanitized())
    }

    /// Zero-sized pools or chunks would stall a scan; clamp them to 1.
    pub fn sanitized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.chunk_chars = self.chunk_chars.max(1);
        self.max_chunks = self.max_chunks.max(1);
        self.backend_url = self.backend_url.trim_end_matches('/').to_string();
        self
    }
}
