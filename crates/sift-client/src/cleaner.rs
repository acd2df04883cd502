use std::sync::Arc;

use htmd::HtmlToMarkdown;
use sift_core::error::AppError;

/// HTML-to-Markdown cleaner using htmd.
///
/// Produces the `clean_text` rendition of a page and the content handed to
/// the LLM for custom prompts. Non-content elements (scripts, navigation,
/// consent banners rendered as dialogs) are skipped.
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for HtmdCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
                "dialog", "form", "button",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }

    /// Converts `html` to Markdown with runs of blank lines collapsed.
    pub fn clean(&self, html: &str) -> Result<String, AppError> {
        let markdown = self
            .converter
            .convert(html)
            .map_err(|e| AppError::ExtractionError(format!("HTML to Markdown failed: {e}")))?;

        let mut out = String::with_capacity(markdown.len());
        let mut blank_run = 0;
        for line in markdown.lines().map(str::trim_end) {
            if line.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            out.push_str(line);
            out.push('\n');
        }
        Ok(out.trim().to_string())
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}
