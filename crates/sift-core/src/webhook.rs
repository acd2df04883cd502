use std::time::Duration;

use serde_json::json;

use crate::error::{AppError, ScrapeError};
use crate::models::ScrapeResult;
use crate::traits::{WebhookEvent, WebhookSender};

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// POST attempts for a successful result.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Posts settled scrape outcomes to caller-supplied callback URLs.
///
/// Delivery retries are independent of the scrape's own retry budget.
#[derive(Clone)]
pub struct WebhookDelivery<S: WebhookSender> {
    sender: S,
    config: DeliveryConfig,
}

impl<S: WebhookSender> WebhookDelivery<S> {
    pub fn new(sender: S, config: DeliveryConfig) -> Self {
        Self { sender, config }
    }

    /// Posts `result` up to `max_attempts` times with a fixed delay between
    /// attempts. Returns the number of attempts used.
    pub async fn deliver_result(&self, webhook: &str, result: &ScrapeResult) -> Result<u32, AppError> {
        let payload = serde_json::to_value(result)?;
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.sender.send(webhook, WebhookEvent::Completed, &payload).await {
                Ok(()) => {
                    tracing::info!(%webhook, attempt, "Webhook delivered");
                    return Ok(attempt);
                }
                Err(error) if attempt >= max_attempts => {
                    tracing::error!(%webhook, attempts = attempt, %error, "Webhook delivery abandoned");
                    return Err(AppError::DeliveryError(format!(
                        "gave up after {attempt} attempt(s): {error}"
                    )));
                }
                Err(error) => {
                    tracing::warn!(%webhook, attempt, %error, "Webhook attempt failed");
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Single best-effort `{error, url}` POST reporting a failed scrape.
    pub async fn deliver_error(&self, webhook: &str, url: &str, error: &ScrapeError) -> Result<(), AppError> {
        let payload = json!({ "error": error.to_string(), "url": url });
        let sent = self.sender.send(webhook, WebhookEvent::Failed, &payload).await;
        if let Err(e) = &sent {
            tracing::warn!(%webhook, error = %e, "Failure notification not delivered");
        }
        sent
    }
}
