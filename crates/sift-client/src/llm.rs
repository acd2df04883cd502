use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sift_core::error::AppError;
use sift_core::traits::Extractor;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);
/// Upper bound on page content sent with a prompt.
const MAX_CONTENT_CHARS: usize = 48_000;
const DEFAULT_SYSTEM_PROMPT: &str = "You extract information from web pages. Follow the user's instruction using only the provided page content. Respond ONLY with a single JSON object. Do not include explanations.";

/// OpenAI-compatible LLM client answering free-text extraction instructions.
///
/// Works with any OpenAI-compatible API, including:
/// - OpenAI directly (`https://api.openai.com/v1`)
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
#[derive(Clone)]
pub struct OpenAiExtractor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiExtractor {
    pub fn new(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(DEFAULT_LLM_TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(format!("LLM client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT.as_secs(),
        })
    }
}

// ---- OpenAI API types ----

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: std::borrow::Cow<'a, str>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn truncate(content: &str) -> &str {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((cut, _)) => &content[..cut],
        None => content,
    }
}

impl Extractor for OpenAiExtractor {
    async fn extract(&self, content: &str, instruction: &str) -> Result<serde_json::Value, AppError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: DEFAULT_SYSTEM_PROMPT.into(),
                },
                Message {
                    role: "user",
                    content: format!(
                        "Instruction: {instruction}\n\nPage content:\n\n{}",
                        truncate(content)
                    )
                    .into(),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else {
                    AppError::NetworkError(format!("LLM request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::RateLimited("LLM provider".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}: {}", status.as_u16(), body));
            return Err(AppError::ExtractionError(format!("LLM error: {message}")));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExtractionError(format!("Failed to parse LLM response: {e}")))?;

        let content_str = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| AppError::ExtractionError("Empty response from LLM".into()))?;

        serde_json::from_str(content_str).map_err(|e| {
            AppError::ExtractionError(format!("LLM returned invalid JSON: {e}. Raw: {content_str}"))
        })
    }
}
