use std::future::Future;

use crate::error::AppError;
use crate::models::{EnginePage, ExtractionStrategy, NavigationConfig};

/// Fetches and pre-processes a page.
///
/// Implementations report an unsuccessful page load as an `Err`, classified
/// so that [`crate::retry::RetryPolicy`] can decide whether to try again.
pub trait Engine: Send + Sync + Clone + 'static {
    /// Short identifier stamped into `_metadata.engine_used`.
    fn name(&self) -> &str;

    /// Loads `url` with the given navigation parameters.
    ///
    /// When `strategy` is set the engine also runs that extraction strategy
    /// and returns its output in [`EnginePage::extracted_content`].
    fn fetch(
        &self,
        url: &str,
        navigation: &NavigationConfig,
        strategy: Option<&ExtractionStrategy>,
    ) -> impl Future<Output = Result<EnginePage, AppError>> + Send;
}

/// Runs a free-text extraction instruction over page content using an LLM.
pub trait Extractor: Send + Sync + Clone {
    fn extract(
        &self,
        content: &str,
        instruction: &str,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;
}

/// Outbound event kinds posted to webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    Completed,
    Failed,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::Completed => "scrape.completed",
            WebhookEvent::Failed => "scrape.failed",
        }
    }
}

/// Performs a single webhook POST attempt. Retrying is the caller's job.
pub trait WebhookSender: Send + Sync + Clone + 'static {
    fn send(
        &self,
        url: &str,
        event: WebhookEvent,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
