use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sift_core::error::ScrapeError;
use sift_core::models::{
    AiExtractionConfig, DEFAULT_MAX_RETRIES, FieldSelector, NavigationProfile, ScrapeRequest,
    ScrapeResult,
};
use sift_core::supervisor::{TaskHandle, TaskSnapshot};

// ---------------------------------------------------------------------------
// Scrape requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SelectorBody {
    /// Key of the extracted value in the result
    pub name: String,
    /// CSS selector, or XPath expression when `is_xpath` is set
    pub selector: String,
    /// Extract this attribute instead of the text content
    pub attribute: Option<String>,
    #[serde(default)]
    pub is_xpath: bool,
    /// Fail the attempt (and retry) when nothing matches
    #[serde(default)]
    pub required: bool,
}

impl From<SelectorBody> for FieldSelector {
    fn from(body: SelectorBody) -> Self {
        Self {
            name: body.name,
            selector: body.selector,
            attribute: body.attribute,
            is_xpath: body.is_xpath,
            required: body.required,
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct AiExtractionBody {
    pub extract_entities: bool,
    pub extract_sentiment: bool,
    pub extract_keywords: bool,
    pub extract_summary: bool,
    /// Free-text instruction answered by the LLM over the page content
    pub custom_prompt: Option<String>,
}

impl From<AiExtractionBody> for AiExtractionConfig {
    fn from(body: AiExtractionBody) -> Self {
        Self {
            extract_entities: body.extract_entities,
            extract_sentiment: body.extract_sentiment,
            extract_keywords: body.extract_keywords,
            extract_summary: body.extract_summary,
            custom_prompt: body.custom_prompt,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProfileBody {
    #[default]
    Thorough,
    Fast,
}

impl From<ProfileBody> for NavigationProfile {
    fn from(body: ProfileBody) -> Self {
        match body {
            ProfileBody::Thorough => NavigationProfile::Thorough,
            ProfileBody::Fast => NavigationProfile::Fast,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ScrapeRequestBody {
    /// Target URL to scrape
    pub url: String,
    #[serde(default)]
    pub selectors: Vec<SelectorBody>,
    pub ai_extraction: Option<AiExtractionBody>,
    #[serde(default)]
    pub extract_structured_data: bool,
    #[serde(default)]
    pub extract_links: bool,
    #[serde(default)]
    pub extract_images: bool,
    #[serde(default)]
    pub extract_text: bool,
    /// Truncated HTML, title and final URL
    #[serde(default)]
    pub extract_basic: bool,
    /// Callback URL; when set the scrape runs in the background
    pub webhook: Option<String>,
    /// Explicit cache key, overriding the derived one
    pub cache_key: Option<String>,
    /// Engine attempts (default 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub profile: ProfileBody,
    /// Selector names of which at least one must match, otherwise the
    /// attempt is retried as content missing
    #[serde(default)]
    pub require_any: Vec<String>,
}

impl From<ScrapeRequestBody> for ScrapeRequest {
    fn from(body: ScrapeRequestBody) -> Self {
        Self {
            url: body.url,
            selectors: body.selectors.into_iter().map(Into::into).collect(),
            ai_extraction: body.ai_extraction.map(Into::into),
            extract_structured_data: body.extract_structured_data,
            extract_links: body.extract_links,
            extract_images: body.extract_images,
            extract_text: body.extract_text,
            extract_basic: body.extract_basic,
            webhook: body.webhook,
            cache_key: body.cache_key,
            max_retries: body.max_retries,
            profile: body.profile.into(),
            require_any: body.require_any,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SimpleScrapeQuery {
    pub url: String,
    /// Enable every extractor (default true)
    #[serde(default = "default_true")]
    pub extract_all: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct FastScrapeQuery {
    pub url: String,
    /// Include truncated HTML, title and final URL (default true)
    #[serde(default = "default_true")]
    pub extract_basic: bool,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct StockQuery {
    /// Callback URL; when set the scrape runs in the background
    pub webhook: Option<String>,
}

// ---------------------------------------------------------------------------
// Scrape responses
// ---------------------------------------------------------------------------

/// Envelope shared by all scrape endpoints. Scrape failures are reported
/// here with `success: false`, never as an HTTP error status.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScrapeResponse {
    pub success: bool,
    /// Requested URL (simple and fast endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extracted fields plus `_metadata`
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<ScrapeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scraped_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_optimized: Option<bool>,
}

impl ScrapeResponse {
    pub fn completed(result: ScrapeResult) -> Self {
        Self {
            success: true,
            url: None,
            scraped_on: Some(result.metadata.scraped_at),
            data: Some(result),
            error: None,
            webhook: None,
            task_id: None,
            speed_optimized: None,
        }
    }

    pub fn scheduled(handle: TaskHandle) -> Self {
        Self {
            success: true,
            url: None,
            data: None,
            error: None,
            webhook: Some(handle.webhook),
            task_id: Some(handle.task_id),
            scraped_on: None,
            speed_optimized: None,
        }
    }

    pub fn failed(error: &ScrapeError) -> Self {
        Self {
            success: false,
            url: None,
            data: None,
            error: Some(error.to_string()),
            webhook: None,
            task_id: None,
            scraped_on: None,
            speed_optimized: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TaskResponse {
    pub task_id: Uuid,
    pub url: String,
    pub webhook: String,
    /// pending | running
    pub state: String,
    pub submitted_at: DateTime<Utc>,
}

impl From<TaskSnapshot> for TaskResponse {
    fn from(task: TaskSnapshot) -> Self {
        Self {
            task_id: task.task_id,
            url: task.url,
            webhook: task.webhook,
            state: task.state.to_string(),
            submitted_at: task.submitted_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engine: String,
    pub cache_entries: u64,
    pub active_tasks: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
