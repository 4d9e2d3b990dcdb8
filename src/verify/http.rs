use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::VerifyBackend;
use crate::error::{Result, ScanError};

/// reqwest client for the `/verify` and `/verify-page` endpoints.
/// No per-request timeout is set; the transport defaults apply.
pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let resp = self.http.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScanError::Status(status.as_u16()));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| ScanError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl VerifyBackend for HttpBackend {
    async fn verify_claim(&self, claim: &str) -> Result<Value> {
        self.post("/verify", json!({ "claim": claim })).await
    }

    async fn verify_page(&self, text: &str) -> Result<Value> {
        self.post("/verify-page", json!({ "text": text })).await
    }
}
