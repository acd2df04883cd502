//! Multi-strategy extraction over a fetched page.
//!
//! Every enabled extractor runs independently: a failing selector becomes a
//! null field plus a warning, a failing custom prompt becomes an `error`
//! object, and neither affects any other field.

use std::panic::{self, AssertUnwindSafe};

use scraper::{Html, Selector};
use serde_json::{Map, Value, json};
use sxd_xpath::Value as XPathValue;
use sxd_xpath::nodeset::Node;

use crate::error::AppError;
use crate::models::{EnginePage, ExtractionStrategy, FieldSelector, ScrapeRequest};
use crate::traits::Engine;

/// Characters of raw HTML kept by the basic extractor.
pub const BASIC_HTML_LIMIT: usize = 1000;

/// Fields produced by one pipeline run, before metadata is stamped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub fields: Map<String, Value>,
    pub warnings: Vec<String>,
}

/// Applies every extractor a request enables to an engine page.
#[derive(Clone)]
pub struct ExtractionPipeline<E: Engine> {
    engine: E,
}

impl<E: Engine> ExtractionPipeline<E> {
    /// `engine` serves the isolated custom-prompt call.
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Runs all enabled extractors.
    ///
    /// Fails only when the page lacks the minimum expected content: an empty
    /// document, or a `required` selector that matched nothing.
    pub async fn run(&self, request: &ScrapeRequest, page: EnginePage) -> Result<Extracted, AppError> {
        if page.html.trim().is_empty() {
            return Err(AppError::ContentMissing(format!(
                "engine returned an empty document for {}",
                request.url
            )));
        }

        // Parsed documents are not Send; they live only inside this call.
        let mut out = select_fields(&page.html, &request.selectors);

        if let Some(missing) = request
            .selectors
            .iter()
            .find(|f| f.required && is_empty_value(out.fields.get(&f.name)))
        {
            return Err(AppError::ContentMissing(format!(
                "required field '{}' not found on {}",
                missing.name, request.url
            )));
        }
        if !request.require_any.is_empty()
            && request
                .require_any
                .iter()
                .all(|name| is_empty_value(out.fields.get(name)))
        {
            return Err(AppError::ContentMissing(format!(
                "none of [{}] found on {}",
                request.require_any.join(", "),
                request.url
            )));
        }

        let fields = &mut out.fields;
        if request.extract_structured_data {
            fields.insert("structured_data".into(), or_null(page.structured_data.clone()));
        }
        if request.extract_links {
            fields.insert("links".into(), or_null(page.links.clone()));
        }
        if request.extract_images {
            fields.insert("images".into(), or_null(page.images.clone()));
        }
        if request.extract_text {
            fields.insert("clean_text".into(), or_null(page.clean_text.clone().map(Value::String)));
        }
        if request.extract_basic {
            fields.insert("html".into(), Value::String(truncate_html(&page.html)));
            fields.insert("title".into(), or_null(page.title.clone().map(Value::String)));
            fields.insert(
                "url".into(),
                Value::String(page.url.clone().unwrap_or_else(|| request.url.clone())),
            );
        }

        if let Some(ai) = &request.ai_extraction {
            let mut ai_fields = Map::new();
            if ai.extract_entities {
                ai_fields.insert("entities".into(), or_null(page.entities.clone()));
            }
            if ai.extract_sentiment {
                ai_fields.insert("sentiment".into(), or_null(page.sentiment.clone()));
            }
            if ai.extract_keywords {
                ai_fields.insert("keywords".into(), or_null(page.keywords.clone()));
            }
            if ai.extract_summary {
                ai_fields.insert("summary".into(), or_null(page.summary.clone()));
            }
            if let Some(prompt) = ai.custom_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
                let value = match self.custom_extraction(request, prompt).await {
                    Ok(value) => value,
                    Err(error) => {
                        tracing::warn!(url = %request.url, %error, "Custom extraction failed");
                        out.warnings.push(format!("custom_extraction: {error}"));
                        json!({ "error": error.to_string() })
                    }
                };
                ai_fields.insert("custom_extraction".into(), value);
            }
            out.fields.insert("ai_extraction".into(), Value::Object(ai_fields));
        }

        Ok(out)
    }

    async fn custom_extraction(&self, request: &ScrapeRequest, prompt: &str) -> Result<Value, AppError> {
        let strategy = ExtractionStrategy::new(prompt);
        let page = self
            .engine
            .fetch(&request.url, &request.profile.navigation(), Some(&strategy))
            .await?;
        Ok(or_null(page.extracted_content))
    }
}

/// Evaluates every selector against `html`.
///
/// Matches become an ordered list of strings with empty strings dropped, no
/// match becomes null. An expression that cannot be evaluated becomes null
/// plus a warning.
pub fn select_fields(html: &str, selectors: &[FieldSelector]) -> Extracted {
    let mut out = Extracted::default();
    let mut css_document: Option<Html> = None;
    let mut xml_package: Option<sxd_document::Package> = None;

    for field in selectors {
        let result = if field.is_xpath {
            let package = xml_package.get_or_insert_with(|| sxd_html::parse_html(html));
            select_xpath(&package.as_document(), field)
        } else {
            let document = css_document.get_or_insert_with(|| Html::parse_document(html));
            select_css(document, field)
        };

        let value = match result {
            Ok(Some(values)) => Value::from(values),
            Ok(None) => Value::Null,
            Err(error) => {
                tracing::warn!(field = %field.name, %error, "Failed to extract field");
                out.warnings.push(format!("{}: {error}", field.name));
                Value::Null
            }
        };
        out.fields.insert(field.name.clone(), value);
    }

    out
}

fn select_css(document: &Html, field: &FieldSelector) -> Result<Option<Vec<String>>, AppError> {
    let selector = Selector::parse(&field.selector).map_err(|e| {
        AppError::ExtractionError(format!("invalid CSS selector '{}': {e}", field.selector))
    })?;

    let matches: Vec<_> = document.select(&selector).collect();
    if matches.is_empty() {
        return Ok(None);
    }

    let values = matches
        .into_iter()
        .filter_map(|element| match &field.attribute {
            Some(attribute) => element.value().attr(attribute).map(str::to_string),
            None => Some(normalize_text(&element.text().collect::<String>())),
        })
        .filter(|value| !value.is_empty())
        .collect();

    Ok(Some(values))
}

fn select_xpath(
    document: &sxd_document::dom::Document<'_>,
    field: &FieldSelector,
) -> Result<Option<Vec<String>>, AppError> {
    // sxd-xpath panics instead of erroring on some inputs, e.g. an unbound
    // namespace prefix.
    let evaluated = panic::catch_unwind(AssertUnwindSafe(|| {
        sxd_xpath::evaluate_xpath(document, &field.selector)
    }))
    .map_err(|_| {
        AppError::ExtractionError(format!("XPath '{}' could not be evaluated", field.selector))
    })?;
    let value = evaluated.map_err(|e| {
        AppError::ExtractionError(format!("invalid XPath '{}': {e}", field.selector))
    })?;

    let nodes = match value {
        XPathValue::Nodeset(nodeset) => nodeset.document_order(),
        // count(), string(), boolean() and friends yield a single scalar.
        scalar => {
            let text = normalize_text(&scalar.string());
            return Ok(Some(if text.is_empty() { vec![] } else { vec![text] }));
        }
    };
    if nodes.is_empty() {
        return Ok(None);
    }

    let values = nodes
        .into_iter()
        .filter_map(|node| match &field.attribute {
            Some(attribute) => match node {
                Node::Element(element) => element.attribute_value(attribute.as_str()).map(str::to_string),
                _ => None,
            },
            None => Some(normalize_text(&node.string_value())),
        })
        .filter(|value| !value.is_empty())
        .collect();

    Ok(Some(values))
}

/// Collapses runs of whitespace and trims both ends.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_html(html: &str) -> String {
    match html.char_indices().nth(BASIC_HTML_LIMIT) {
        Some((cut, _)) => format!("{}...", &html[..cut]),
        None => html.to_string(),
    }
}

fn or_null(value: Option<Value>) -> Value {
    value.unwrap_or(Value::Null)
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}
