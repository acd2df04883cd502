use thiserror::Error;

/// Application-wide error types for Sift.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// The target answered with a rate-limit response (HTTP 429 or equivalent).
    #[error("Rate limited by {0}")]
    RateLimited(String),

    /// Network/connection error talking to the engine or the target.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Page did not load within the engine's page timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The rendering engine reported a failure for this page.
    #[error("Engine error: {0}")]
    EngineError(String),

    /// The page loaded but lacks the minimum expected content.
    #[error("Content missing: {0}")]
    ContentMissing(String),

    /// The request URL cannot be parsed or uses an unsupported scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The selector configuration of the request is unusable as a whole.
    #[error("Invalid selector '{name}': {message}")]
    InvalidSelector { name: String, message: String },

    /// A single extractor failed. Only ever recorded as a warning.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// A webhook POST attempt failed.
    #[error("Webhook delivery failed: {0}")]
    DeliveryError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A looked-up resource (e.g. a background task) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

/// How a failed fetch attempt should be handled by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Wait `base * 2^attempt` before the next attempt.
    Exponential,
    /// Wait the flat content-missing delay before the next attempt.
    Flat,
    /// Surface immediately.
    Never,
}

impl AppError {
    /// Classifies this error for [`crate::retry::RetryPolicy`].
    pub fn retry(&self) -> Retry {
        match self {
            AppError::RateLimited(_)
            | AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::EngineError(_) => Retry::Exponential,
            AppError::ContentMissing(_) => Retry::Flat,
            _ => Retry::Never,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.retry() != Retry::Never
    }
}

/// Failure of a whole `scrape` call, after retry exhaustion or a fatal error.
#[derive(Error, Debug, Clone)]
#[error("{source} (after {attempts} attempt(s))")]
pub struct ScrapeError {
    /// Number of engine attempts made before giving up.
    pub attempts: u32,
    /// The last failure's cause.
    pub source: AppError,
}

impl ScrapeError {
    pub fn new(source: AppError, attempts: u32) -> Self {
        Self { attempts, source }
    }

    /// A failure detected before any engine call was made.
    pub fn rejected(source: AppError) -> Self {
        Self::new(source, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimited("example.com".into()).is_retryable());
        assert!(AppError::EngineError("navigation failed".into()).is_retryable());
        assert!(AppError::ContentMissing("empty body".into()).is_retryable());
        assert!(!AppError::InvalidUrl("nope".into()).is_retryable());
        assert!(
            !AppError::InvalidSelector {
                name: "price".into(),
                message: "duplicate".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_backoff_classes() {
        assert_eq!(AppError::Timeout(1).retry(), Retry::Exponential);
        assert_eq!(AppError::ContentMissing("x".into()).retry(), Retry::Flat);
        assert_eq!(AppError::ConfigError("x".into()).retry(), Retry::Never);
    }

    #[test]
    fn test_scrape_error_message_carries_attempts() {
        let err = ScrapeError::new(AppError::Timeout(60), 3);
        assert_eq!(err.to_string(), "Request timed out after 60 seconds (after 3 attempt(s))");
    }
}
