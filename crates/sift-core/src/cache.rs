//! TTL-bounded result cache with a standing sweeper.
//!
//! Entries are stored behind an `Arc` and replaced wholesale on every
//! insert, so readers only ever see a complete entry. Freshness is judged
//! against tokio's clock, which lets tests drive expiry with a paused runtime.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::ScrapeResult;

/// Cache tuning. TTL and sweep period are independent knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age before an entry is no longer served.
    pub ttl: Duration,
    /// Interval of the background sweep.
    pub sweep_period: Duration,
    /// Capacity bound; the least recently used entries are evicted beyond it.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            sweep_period: Duration::from_secs(60),
            max_entries: 10_000,
        }
    }
}

/// One cached scrape result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: ScrapeResult,
    pub stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// Shared handle to the result cache. Clones share the same entries.
#[derive(Clone)]
pub struct CacheStore {
    entries: Cache<String, Arc<CacheEntry>>,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Cache::builder().max_capacity(config.max_entries).build(),
            ttl: config.ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached result for `key` unless it is absent or stale.
    pub async fn get(&self, key: &str) -> Option<ScrapeResult> {
        let entry = self.entries.get(key).await?;
        entry
            .is_fresh(self.ttl)
            .then(|| entry.payload.clone())
    }

    /// Stores `result` under `key`, replacing any previous entry.
    pub async fn put(&self, key: impl Into<String>, result: ScrapeResult) {
        let key = key.into();
        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            payload: result,
            stored_at: Instant::now(),
        });
        self.entries.insert(key, entry).await;
    }

    /// Removes every expired entry and returns how many were removed.
    ///
    /// Expiry is re-checked atomically per key, so an entry refreshed by a
    /// concurrent `put` survives the sweep.
    pub async fn sweep_expired(&self) -> usize {
        let ttl = self.ttl;
        let expired: Vec<Arc<String>> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(ttl))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in expired {
            let outcome = self
                .entries
                .entry_by_ref(key.as_str())
                .and_compute_with(|current| async move {
                    match current {
                        Some(entry) if !entry.value().is_fresh(ttl) => Op::Remove,
                        _ => Op::Nop,
                    }
                })
                .await;
            if matches!(outcome, CompResult::Removed(_)) {
                removed += 1;
            }
        }
        removed
    }

    /// Number of stored entries, stale ones included until swept.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Runs [`sweep_expired`](Self::sweep_expired) every `period` until `cancel_token` fires.
    pub fn spawn_sweeper(&self, period: Duration, cancel_token: CancellationToken) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            tracing::debug!(period_secs = period.as_secs(), "Cache sweeper started");
            loop {
                tokio::select! {
                    () = tokio::time::sleep(period) => {
                        let removed = store.sweep_expired().await;
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired cache entries");
                        }
                    }
                    () = cancel_token.cancelled() => break,
                }
            }
            tracing::debug!("Cache sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_test_result;

    fn store(ttl_secs: u64) -> CacheStore {
        CacheStore::new(&CacheConfig {
            ttl: Duration::from_secs(ttl_secs),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_is_served() {
        let cache = store(60);
        let result = make_test_result("https://example.com");
        cache.put("k", result.clone()).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").await, Some(result));
    }

    #[tokio::test(start_paused = true)]
    async fn entry_at_ttl_is_not_served() {
        let cache = store(60);
        cache.put("k", make_test_result("https://example.com")).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn missing_key_is_absent() {
        assert_eq!(store(60).get("nope").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites_and_restarts_the_clock() {
        let cache = store(60);
        cache.put("k", make_test_result("https://a.example")).await;
        tokio::time::advance(Duration::from_secs(50)).await;

        let newer = make_test_result("https://b.example");
        cache.put("k", newer.clone()).await;
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.get("k").await, Some(newer));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_entries() {
        let cache = store(60);
        cache.put("old", make_test_result("https://old.example")).await;
        tokio::time::advance(Duration::from_secs(45)).await;
        cache.put("new", make_test_result("https://new.example")).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(cache.sweep_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("new").await.is_some());
        assert_eq!(cache.sweep_expired().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_cancelled() {
        let cache = store(60);
        cache.put("k", make_test_result("https://example.com")).await;

        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_secs(60), token.clone());

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert_eq!(cache.len().await, 0);

        token.cancel();
        handle.await.unwrap();
    }
}
