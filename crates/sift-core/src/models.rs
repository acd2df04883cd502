use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::AppError;

/// Default number of engine attempts per scrape.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Browser-like User-Agent sent by both navigation profiles.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Result keys written by the pipeline itself. Selectors may not use them.
pub const RESERVED_FIELD_NAMES: &[&str] = &[
    "_metadata",
    "structured_data",
    "links",
    "images",
    "clean_text",
    "html",
    "title",
    "url",
    "ai_extraction",
];

/// One named query against the fetched document.
///
/// Without `attribute` the text content of every match is extracted,
/// with it the attribute value of every match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    /// Key of the extracted value in the result.
    pub name: String,
    /// CSS selector, or XPath expression when `is_xpath` is set.
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default)]
    pub is_xpath: bool,
    /// A required field that resolves to null fails the attempt as content-missing.
    #[serde(default)]
    pub required: bool,
}

impl FieldSelector {
    pub fn css(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
            attribute: None,
            is_xpath: false,
            required: false,
        }
    }

    pub fn xpath(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            is_xpath: true,
            ..Self::css(name, expression)
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Engine-provided AI fields to pass through, plus an optional free-text prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiExtractionConfig {
    pub extract_entities: bool,
    pub extract_sentiment: bool,
    pub extract_keywords: bool,
    pub extract_summary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

/// Selects the engine's navigation parameters. Never changes orchestration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationProfile {
    /// Longer render delay and page timeout, full feature set.
    #[default]
    Thorough,
    /// Shorter render delay and page timeout, minimal fields.
    Fast,
}

impl NavigationProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationProfile::Thorough => "thorough",
            NavigationProfile::Fast => "fast",
        }
    }

    pub fn navigation(&self) -> NavigationConfig {
        match self {
            NavigationProfile::Thorough => NavigationConfig {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                render_delay: Duration::from_secs(3),
                page_timeout: Duration::from_secs(60),
                remove_overlays: true,
                simulate_user: false,
            },
            NavigationProfile::Fast => NavigationConfig {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                render_delay: Duration::from_secs(2),
                page_timeout: Duration::from_secs(30),
                remove_overlays: true,
                simulate_user: false,
            },
        }
    }
}

/// Parameters handed to the engine for a single page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationConfig {
    pub user_agent: String,
    /// Time to wait after load before the HTML is captured.
    pub render_delay: Duration,
    /// Upper bound for the whole page load.
    pub page_timeout: Duration,
    pub remove_overlays: bool,
    pub simulate_user: bool,
}

/// Extraction-strategy hook for the isolated custom-prompt engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionStrategy {
    pub instruction: String,
}

impl ExtractionStrategy {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }
}

/// A scrape request: target, extraction methods, delivery and retry options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    #[serde(default)]
    pub selectors: Vec<FieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_extraction: Option<AiExtractionConfig>,
    #[serde(default)]
    pub extract_structured_data: bool,
    #[serde(default)]
    pub extract_links: bool,
    #[serde(default)]
    pub extract_images: bool,
    #[serde(default)]
    pub extract_text: bool,
    /// Truncated HTML, title and final URL.
    #[serde(default)]
    pub extract_basic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub profile: NavigationProfile,
    /// Selector names of which at least one must resolve to a non-empty
    /// value, otherwise the attempt fails as content missing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require_any: Vec<String>,
}

impl ScrapeRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selectors: Vec::new(),
            ai_extraction: None,
            extract_structured_data: false,
            extract_links: false,
            extract_images: false,
            extract_text: false,
            extract_basic: false,
            webhook: None,
            cache_key: None,
            max_retries: DEFAULT_MAX_RETRIES,
            profile: NavigationProfile::default(),
            require_any: Vec::new(),
        }
    }

    pub fn with_selector(mut self, selector: FieldSelector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn with_webhook(mut self, webhook: impl Into<String>) -> Self {
        self.webhook = Some(webhook.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_require_any<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_any = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_profile(mut self, profile: NavigationProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Enables every non-AI extractor and every AI pass-through.
    ///
    /// A previously configured custom prompt is kept.
    pub fn with_all_extractors(mut self) -> Self {
        self.extract_structured_data = true;
        self.extract_links = true;
        self.extract_images = true;
        self.extract_text = true;
        let custom_prompt = self.ai_extraction.take().and_then(|ai| ai.custom_prompt);
        self.ai_extraction = Some(AiExtractionConfig {
            extract_entities: true,
            extract_sentiment: true,
            extract_keywords: true,
            extract_summary: true,
            custom_prompt,
        });
        self
    }

    /// Rejects requests that can never succeed: bad URLs and unusable selector lists.
    pub fn validate(&self) -> Result<(), AppError> {
        let parsed =
            Url::parse(&self.url).map_err(|e| AppError::InvalidUrl(format!("{}: {e}", self.url)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::InvalidUrl(format!(
                    "URL scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(AppError::InvalidUrl(format!("{} has no host", self.url)));
        }

        let mut seen = HashSet::new();
        for field in &self.selectors {
            let invalid = |message: &str| AppError::InvalidSelector {
                name: field.name.clone(),
                message: message.to_string(),
            };
            if field.name.trim().is_empty() {
                return Err(invalid("field name must not be empty"));
            }
            if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
                return Err(invalid("field name is reserved for pipeline output"));
            }
            if field.selector.trim().is_empty() {
                return Err(invalid("selector expression must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid("field name is used more than once"));
            }
        }

        if let Some(unknown) = self.require_any.iter().find(|name| !seen.contains(name.as_str())) {
            return Err(AppError::InvalidSelector {
                name: unknown.clone(),
                message: "required field does not name a selector".to_string(),
            });
        }

        Ok(())
    }
}

/// Canonical cache key of a request.
///
/// An explicit `cache_key` wins. Otherwise the key is a content hash over the
/// semantically relevant fields only, with the selector list sorted so that
/// logically identical requests always collide.
pub fn cache_key_for(request: &ScrapeRequest) -> String {
    if let Some(key) = &request.cache_key {
        return key.clone();
    }

    let url = Url::parse(&request.url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| request.url.clone());

    let mut selectors: Vec<&FieldSelector> = request.selectors.iter().collect();
    selectors.sort_by(|a, b| {
        (&a.name, &a.selector, &a.attribute, a.is_xpath, a.required).cmp(&(
            &b.name,
            &b.selector,
            &b.attribute,
            b.is_xpath,
            b.required,
        ))
    });

    let mut require_any: Vec<&str> = request.require_any.iter().map(String::as_str).collect();
    require_any.sort_unstable();
    require_any.dedup();

    let ai = request.ai_extraction.clone().unwrap_or_default();
    let canonical = serde_json::json!({
        "url": url,
        "profile": request.profile.as_str(),
        "selectors": selectors,
        "require_any": require_any,
        "flags": {
            "structured_data": request.extract_structured_data,
            "links": request.extract_links,
            "images": request.extract_images,
            "text": request.extract_text,
            "basic": request.extract_basic,
        },
        "ai": {
            "enabled": request.ai_extraction.is_some(),
            "entities": ai.extract_entities,
            "sentiment": ai.extract_sentiment,
            "keywords": ai.extract_keywords,
            "summary": ai.extract_summary,
            "custom_prompt": ai.custom_prompt,
        },
    });

    compute_hash(&canonical.to_string())
}

/// What a rendering engine hands back for one page load.
///
/// Everything beyond `html` is engine-dependent and may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnginePage {
    pub html: String,
    pub title: Option<String>,
    /// Final URL after redirects.
    pub url: Option<String>,
    pub links: Option<serde_json::Value>,
    pub images: Option<serde_json::Value>,
    pub structured_data: Option<serde_json::Value>,
    pub clean_text: Option<String>,
    pub entities: Option<serde_json::Value>,
    pub sentiment: Option<serde_json::Value>,
    pub keywords: Option<serde_json::Value>,
    pub summary: Option<serde_json::Value>,
    /// Output of an [`ExtractionStrategy`], when one was requested.
    pub extracted_content: Option<serde_json::Value>,
}

impl EnginePage {
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }
}

/// Metadata stamped on every successful scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeMetadata {
    pub url: String,
    pub scraped_at: DateTime<Utc>,
    pub engine_used: String,
    /// Per-field extraction problems that did not fail the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Extracted fields plus metadata. Serialized flat, metadata under `_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "_metadata")]
    pub metadata: ScrapeMetadata,
}

impl ScrapeResult {
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
