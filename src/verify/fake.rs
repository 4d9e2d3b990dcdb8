//! In-process stand-in for the verification service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::VerifyBackend;
use crate::error::{Result, ScanError};

type Handler = Box<dyn Fn(&str) -> Result<Value> + Send + Sync>;

pub struct FakeBackend {
    claim: Handler,
    page: Handler,
    pub delay_ms: u64,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(
        claim: impl Fn(&str) -> Result<Value> + Send + Sync + 'static,
        page: impl Fn(&str) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            claim: Box::new(claim),
            page: Box::new(page),
            delay_ms: 0,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn claims(claim: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self::new(claim, |_| Err(ScanError::Status(404)))
    }

    pub fn pages(page: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self::new(|_| Err(ScanError::Status(404)), page)
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    async fn enter(&self, body: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(body.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VerifyBackend for FakeBackend {
    async fn verify_claim(&self, claim: &str) -> Result<Value> {
        self.enter(claim).await;
        let out = (self.claim)(claim);
        self.leave();
        out
    }

    async fn verify_page(&self, text: &str) -> Result<Value> {
        self.enter(text).await;
        let out = (self.page)(text);
        self.leave();
        out
    }
}
