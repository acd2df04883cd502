//! Turns a fetched document into an [`EnginePage`].
//!
//! Shared by every engine: title, links, images, JSON-LD structured data and
//! a Markdown `clean_text`, plus the optional LLM pass for custom prompts.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use sift_core::error::AppError;
use sift_core::models::{EnginePage, ExtractionStrategy};
use sift_core::traits::Extractor;
use url::Url;

use crate::cleaner::HtmdCleaner;
use crate::llm::OpenAiExtractor;

#[derive(Clone, Default)]
pub struct PageBuilder {
    cleaner: HtmdCleaner,
    extractor: Option<OpenAiExtractor>,
}

impl PageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables custom-prompt extraction.
    pub fn with_extractor(mut self, extractor: OpenAiExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub async fn build(
        &self,
        html: String,
        final_url: &str,
        strategy: Option<&ExtractionStrategy>,
    ) -> Result<EnginePage, AppError> {
        let mut page = analyze(&html, final_url);
        page.clean_text = match self.cleaner.clean(&html) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(url = %final_url, error = %e, "Could not produce clean text");
                None
            }
        };

        if let Some(strategy) = strategy {
            let extractor = self.extractor.as_ref().ok_or_else(|| {
                AppError::ConfigError(
                    "custom prompts need an LLM extractor (set SIFT_LLM_API_KEY)".into(),
                )
            })?;
            let content = page.clean_text.as_deref().unwrap_or(&html);
            page.extracted_content = Some(extractor.extract(content, &strategy.instruction).await?);
        }

        page.html = html;
        Ok(page)
    }
}

/// Synchronous document analysis. The parsed tree never outlives this call.
pub fn analyze(html: &str, final_url: &str) -> EnginePage {
    let document = Html::parse_document(html);
    let base = Url::parse(final_url).ok();

    let title = select_all(&document, "title")
        .first()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    EnginePage {
        title,
        url: Some(final_url.to_string()),
        links: Some(links(&document, base.as_ref())),
        images: Some(images(&document, base.as_ref())),
        structured_data: structured_data(&document),
        ..Default::default()
    }
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    Selector::parse(css)
        .map(|selector| document.select(&selector).collect())
        .unwrap_or_default()
}

fn resolve(base: Option<&Url>, href: &str) -> Option<Url> {
    let url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// `{internal: [...], external: [...]}`, split by host, deduplicated.
fn links(document: &Html, base: Option<&Url>) -> Value {
    let base_host = base.and_then(Url::host_str);
    let mut seen = HashSet::new();
    let mut internal = Vec::new();
    let mut external = Vec::new();

    for el in select_all(document, "a[href]") {
        let Some(url) = el.value().attr("href").and_then(|href| resolve(base, href)) else {
            continue;
        };
        if !seen.insert(url.to_string()) {
            continue;
        }
        let entry = json!({
            "href": url.as_str(),
            "text": el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "),
        });
        if url.host_str() == base_host {
            internal.push(entry);
        } else {
            external.push(entry);
        }
    }

    json!({ "internal": internal, "external": external })
}

fn images(document: &Html, base: Option<&Url>) -> Value {
    let images: Vec<Value> = select_all(document, "img[src]")
        .into_iter()
        .filter_map(|el| {
            let src = resolve(base, el.value().attr("src")?)?;
            Some(json!({
                "src": src.as_str(),
                "alt": el.value().attr("alt").unwrap_or_default(),
            }))
        })
        .collect();
    Value::Array(images)
}

/// Parsed JSON-LD blocks, or `None` when the page carries none.
fn structured_data(document: &Html) -> Option<Value> {
    let blocks: Vec<Value> = select_all(document, r#"script[type="application/ld+json"]"#)
        .into_iter()
        .filter_map(|el| {
            let raw = el.text().collect::<String>();
            match serde_json::from_str(raw.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed JSON-LD block");
                    None
                }
            }
        })
        .collect();
    (!blocks.is_empty()).then_some(Value::Array(blocks))
}
