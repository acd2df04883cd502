use std::time::Duration;

use reqwest::Client;
use sift_core::error::AppError;
use sift_core::traits::{WebhookEvent, WebhookSender};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Header naming the event carried by a webhook POST.
pub const EVENT_HEADER: &str = "X-Sift-Event";

/// One JSON POST per attempt with a 15 s timeout. Non-2xx answers count as
/// failed attempts.
#[derive(Clone)]
pub struct ReqwestWebhookSender {
    client: Client,
}

impl ReqwestWebhookSender {
    pub fn new() -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("sift-webhook/", env!("CARGO_PKG_VERSION")))
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(format!("webhook client: {e}")))?;
        Ok(Self { client })
    }
}

impl WebhookSender for ReqwestWebhookSender {
    async fn send(
        &self,
        url: &str,
        event: WebhookEvent,
        payload: &serde_json::Value,
    ) -> Result<(), AppError> {
        let response = self
            .client
            .post(url)
            .header(EVENT_HEADER, event.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::DeliveryError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AppError::DeliveryError(format!(
                "webhook answered HTTP {}",
                status.as_u16()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn posts_json_with_event_header() {
        let server = MockServer::start().await;
        let payload = json!({"price": ["12.50"]});
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header(EVENT_HEADER, "scrape.completed"))
            .and(header("user-agent", concat!("sift-webhook/", env!("CARGO_PKG_VERSION"))))
            .and(body_json(&payload))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        ReqwestWebhookSender::new()
            .unwrap()
            .send(&format!("{}/hook", server.uri()), WebhookEvent::Completed, &payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_fails_the_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = ReqwestWebhookSender::new()
            .unwrap()
            .send(&server.uri(), WebhookEvent::Failed, &json!({"error": "x", "url": "y"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DeliveryError(_)));
        assert!(err.to_string().contains("500"));
    }
}
