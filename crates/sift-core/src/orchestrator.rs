use chrono::Utc;

use crate::cache::CacheStore;
use crate::error::ScrapeError;
use crate::extract::ExtractionPipeline;
use crate::models::{ScrapeMetadata, ScrapeRequest, ScrapeResult, cache_key_for};
use crate::retry::RetryPolicy;
use crate::traits::Engine;

/// Cache-aware, retrying scrape entry point.
///
/// A fresh cache entry is returned without touching the engine. Otherwise the
/// engine fetch and the extraction pipeline run together under a
/// [`RetryPolicy`] and the stamped result is cached.
///
/// Two concurrent misses for the same key both fetch; the later write wins.
#[derive(Clone)]
pub struct FetchOrchestrator<E: Engine> {
    engine: E,
    pipeline: ExtractionPipeline<E>,
    cache: CacheStore,
}

impl<E: Engine> FetchOrchestrator<E> {
    pub fn new(engine: E, cache: CacheStore) -> Self {
        Self {
            pipeline: ExtractionPipeline::new(engine.clone()),
            engine,
            cache,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResult, ScrapeError> {
        request.validate().map_err(ScrapeError::rejected)?;

        let key = cache_key_for(request);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(url = %request.url, "Cache hit");
            return Ok(hit);
        }

        let navigation = request.profile.navigation();
        let navigation = &navigation;
        let extracted = RetryPolicy::new(request.max_retries)
            .run(|attempt| async move {
                tracing::debug!(
                    url = %request.url,
                    attempt = attempt + 1,
                    profile = request.profile.as_str(),
                    "Fetching page"
                );
                let page = self.engine.fetch(&request.url, navigation, None).await?;
                self.pipeline.run(request, page).await
            })
            .await?;

        let result = ScrapeResult {
            fields: extracted.fields,
            metadata: ScrapeMetadata {
                url: request.url.clone(),
                scraped_at: Utc::now(),
                engine_used: self.engine.name().to_string(),
                warnings: extracted.warnings,
            },
        };

        self.cache.put(key, result.clone()).await;
        tracing::info!(
            url = %request.url,
            fields = result.fields.len(),
            warnings = result.metadata.warnings.len(),
            "Scrape completed"
        );
        Ok(result)
    }
}
