//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks share
//! their state through `Arc`, so a clone handed to the code under test still
//! records into the instance the test asserts on.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

use crate::error::AppError;
use crate::models::{EnginePage, ExtractionStrategy, NavigationConfig, ScrapeMetadata, ScrapeResult};
use crate::traits::{Engine, WebhookEvent, WebhookSender};

// ---------------------------------------------------------------------------
// MockEngine
// ---------------------------------------------------------------------------

/// Mock engine serving canned pages.
#[derive(Clone)]
pub struct MockEngine {
    default_html: Arc<str>,
    /// Queue of page responses. Each page fetch pops the first element and
    /// falls back to `default_html` once empty.
    responses: Arc<Mutex<Vec<Result<EnginePage, AppError>>>>,
    strategy_response: Arc<Mutex<Result<Value, AppError>>>,
    calls: Arc<AtomicU32>,
    strategy_calls: Arc<AtomicU32>,
    latency: Option<Duration>,
    hang: bool,
    started: Arc<Notify>,
}

impl MockEngine {
    pub fn new(html: &str) -> Self {
        Self {
            default_html: Arc::from(html),
            responses: Arc::new(Mutex::new(Vec::new())),
            strategy_response: Arc::new(Mutex::new(Ok(Value::Null))),
            calls: Arc::new(AtomicU32::new(0)),
            strategy_calls: Arc::new(AtomicU32::new(0)),
            latency: None,
            hang: false,
            started: Arc::new(Notify::new()),
        }
    }

    pub fn with_responses(html: &str, responses: Vec<Result<EnginePage, AppError>>) -> Self {
        let engine = Self::new(html);
        *engine.responses.lock().unwrap() = responses;
        engine
    }

    /// Always fails page fetches with `error`.
    pub fn failing(error: AppError) -> Self {
        Self::with_responses("", vec![Err(error); 64])
    }

    /// Sets the result of custom-prompt (strategy) fetches.
    pub fn with_strategy_response(self, response: Result<Value, AppError>) -> Self {
        *self.strategy_response.lock().unwrap() = response;
        self
    }

    /// Sleeps for `latency` on the tokio clock before answering a page fetch.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Page fetches never complete; [`wait_started`](Self::wait_started)
    /// resolves once one is in flight.
    pub fn hanging(html: &str) -> Self {
        Self {
            hang: true,
            ..Self::new(html)
        }
    }

    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Number of page fetches made.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of custom-prompt fetches made.
    pub fn strategy_calls(&self) -> u32 {
        self.strategy_calls.load(Ordering::SeqCst)
    }
}

impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        url: &str,
        _navigation: &NavigationConfig,
        strategy: Option<&ExtractionStrategy>,
    ) -> Result<EnginePage, AppError> {
        if strategy.is_some() {
            self.strategy_calls.fetch_add(1, Ordering::SeqCst);
            let response = self.strategy_response.lock().unwrap().clone();
            return response.map(|content| EnginePage {
                html: "<html></html>".into(),
                url: Some(url.to_string()),
                extracted_content: (!content.is_null()).then_some(content),
                ..Default::default()
            });
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            self.started.notify_one();
            std::future::pending::<()>().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = {
            let mut responses = self.responses.lock().unwrap();
            (!responses.is_empty()).then(|| responses.remove(0))
        };
        next.unwrap_or_else(|| Ok(EnginePage::from_html(self.default_html.as_ref())))
    }
}

// ---------------------------------------------------------------------------
// MockWebhookSender
// ---------------------------------------------------------------------------

/// One recorded webhook POST.
#[derive(Debug, Clone, PartialEq)]
pub struct SentWebhook {
    pub url: String,
    pub event: WebhookEvent,
    pub payload: Value,
}

/// Mock sender that records every attempt.
#[derive(Clone, Default)]
pub struct MockWebhookSender {
    sent: Arc<Mutex<Vec<SentWebhook>>>,
    /// Queue of attempt outcomes; `Ok` once empty.
    responses: Arc<Mutex<Vec<Result<(), AppError>>>>,
}

impl MockWebhookSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `failures` attempts.
    pub fn failing(failures: usize) -> Self {
        let sender = Self::default();
        *sender.responses.lock().unwrap() =
            vec![Err(AppError::DeliveryError("HTTP 500".into())); failures];
        sender
    }

    pub fn sent(&self) -> Vec<SentWebhook> {
        self.sent.lock().unwrap().clone()
    }
}

impl WebhookSender for MockWebhookSender {
    async fn send(&self, url: &str, event: WebhookEvent, payload: &Value) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(SentWebhook {
            url: url.to_string(),
            event,
            payload: payload.clone(),
        });
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// A small result with one extracted field.
pub fn make_test_result(url: &str) -> ScrapeResult {
    let mut fields = Map::new();
    fields.insert("title".into(), json!(["Example"]));
    ScrapeResult {
        fields,
        metadata: ScrapeMetadata {
            url: url.to_string(),
            scraped_at: Utc::now(),
            engine_used: "mock".into(),
            warnings: Vec::new(),
        },
    }
}

/// Quote page used across orchestrator and server tests.
pub const QUOTE_HTML: &str = r#"<html>
  <head><title>ACME quote</title></head>
  <body>
    <h1 class="name">ACME Corp</h1>
    <fin-streamer data-field="regularMarketPrice">12.50</fin-streamer>
    <a href="https://example.com/news">News</a>
  </body>
</html>"#;
