use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Retry, ScrapeError};

/// Bounded-attempt executor with exponential backoff.
///
/// Delay after failed attempt `n` (0-based): `base_delay * 2^n` for
/// transient failures, a flat `content_missing_delay` when the page lacked
/// the expected content. Fatal errors are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub content_missing_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::models::DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy {
    /// A policy with `max_attempts` attempts (at least one) and the standard delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
            content_missing_delay: Duration::from_secs(1),
        }
    }

    /// Delay before retrying after `error` on attempt `attempt`, or `None` if fatal.
    pub fn delay_for(&self, attempt: u32, error: &AppError) -> Option<Duration> {
        match error.retry() {
            Retry::Exponential => Some(
                self.base_delay
                    .saturating_mul(2u32.saturating_pow(attempt.min(16))),
            ),
            Retry::Flat => Some(self.content_missing_delay),
            Retry::Never => None,
        }
    }

    /// Runs `operation` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// `operation` receives the 0-based attempt number. Dropping the returned
    /// future cancels both the in-flight attempt and any pending backoff sleep.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ScrapeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let made = attempt + 1;

            let Some(delay) = self.delay_for(attempt, &error) else {
                tracing::warn!(attempt = made, %error, "Fatal error, not retrying");
                return Err(ScrapeError::new(error, made));
            };
            if made >= self.max_attempts {
                tracing::error!(attempts = made, %error, "Retry budget exhausted");
                return Err(ScrapeError::new(error, made));
            }

            tracing::warn!(
                attempt = made,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                %error,
                "Attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
