pub mod http;
pub mod strategy;

#[cfg(test)]
pub mod fake;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

// Prioritized source fields for each normalized field; first non-empty wins.
const TEXT_FIELDS: &[&str] = &["sentence", "claim", "text"];
const TITLE_FIELDS: &[&str] = &["title", "name", "snippet", "url"];
const URL_FIELDS: &[&str] = &["url", "link"];
const SOURCE_FIELDS: &[&str] = &["source", "publisher"];

/// Evidence items shown per result.
pub const EVIDENCE_DISPLAY_LIMIT: usize = 10;

/// Transport to the external fact-checking service.
#[async_trait]
pub trait VerifyBackend: Send + Sync {
    /// `POST /verify` with `{claim}`; returns the raw response body.
    async fn verify_claim(&self, claim: &str) -> Result<Value>;
    /// `POST /verify-page` with `{text}`; returns the raw response body.
    async fn verify_page(&self, text: &str) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Label {
    Verified,
    Unverified,
    Fake,
    #[default]
    Other,
}

impl Label {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "verified" => Label::Verified,
            "unverified" => Label::Unverified,
            "fake" => Label::Fake,
            _ => Label::Other,
        }
    }

    pub fn is_flagged(self) -> bool {
        matches!(self, Label::Unverified | Label::Fake)
    }
}

impl From<String> for Label {
    fn from(raw: String) -> Self {
        Label::parse(&raw)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Label::Verified => "Verified",
            Label::Unverified => "Unverified",
            Label::Fake => "Fake",
            Label::Other => "Other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvidenceItem {
    Text(String),
    Source(EvidenceSource),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EvidenceItem {
    fn from_service(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(s) => Some(EvidenceItem::Text(s.clone())),
            Value::Object(obj) => Some(EvidenceItem::Source(EvidenceSource {
                title: first_str(obj, TITLE_FIELDS),
                url: first_str(obj, URL_FIELDS),
                source: first_str(obj, SOURCE_FIELDS),
            })),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub label: Label,
    #[serde(default, deserialize_with = "finite_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

impl VerificationResult {
    /// Normalize one service record. `text` overrides the record's own
    /// sentence fields (per-sentence mode knows what it sent). Returns
    /// `None` when the record is not a JSON object.
    pub fn from_service(raw: &Value, text: Option<&str>) -> Option<Self> {
        let obj = raw.as_object()?;
        let text = match text {
            Some(t) => t.trim().to_string(),
            None => first_str(obj, TEXT_FIELDS).unwrap_or_default(),
        };
        let label = obj
            .get("label")
            .and_then(Value::as_str)
            .map(Label::parse)
            .unwrap_or_default();
        let confidence = coerce_confidence(obj.get("confidence"));
        let evidence = obj
            .get("evidence")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(EvidenceItem::from_service).collect())
            .unwrap_or_default();

        Some(Self {
            text,
            label,
            confidence,
            evidence,
        })
    }

    pub fn is_flagged(&self) -> bool {
        self.label.is_flagged()
    }
}

fn first_str(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| obj.get(*f).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers or numeric strings in [0, 1]; anything else (NaN, missing, junk) is 0.
pub fn coerce_confidence(raw: Option<&Value>) -> f64 {
    let n = match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn finite_confidence<'de, D>(de: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(de)?;
    Ok(coerce_confidence(Some(&raw)))
}
