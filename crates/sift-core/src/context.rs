//! The assembled scrape service: cache, orchestrator, supervisor and webhook
//! delivery wired together, plus the standing cache sweeper.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{CacheConfig, CacheStore};
use crate::error::{AppError, ScrapeError};
use crate::models::{ScrapeRequest, ScrapeResult};
use crate::orchestrator::FetchOrchestrator;
use crate::supervisor::{panic_message, TaskHandle, TaskReporter, TaskSnapshot, TaskState, TaskSupervisor, TracingTaskReporter};
use crate::traits::{Engine, WebhookSender};
use crate::webhook::{DeliveryConfig, WebhookDelivery};

#[derive(Clone)]
pub struct ContextConfig {
    pub cache: CacheConfig,
    pub delivery: DeliveryConfig,
    pub reporter: Arc<dyn TaskReporter>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            delivery: DeliveryConfig::default(),
            reporter: Arc::new(TracingTaskReporter),
        }
    }
}

/// Outcome of [`ScrapeContext::submit`].
#[derive(Debug, Clone)]
pub enum Submission {
    /// The request had no webhook and was scraped inline.
    Completed(ScrapeResult),
    /// The request was handed to the background supervisor.
    Scheduled(TaskHandle),
}

#[derive(Clone)]
pub struct ScrapeContext<E: Engine, W: WebhookSender> {
    orchestrator: FetchOrchestrator<E>,
    delivery: WebhookDelivery<W>,
    supervisor: TaskSupervisor,
    sweeper_token: CancellationToken,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<E: Engine, W: WebhookSender> ScrapeContext<E, W> {
    /// Builds the components and spawns the cache sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(engine: E, sender: W, config: ContextConfig) -> Self {
        let cache = CacheStore::new(&config.cache);
        let sweeper_token = CancellationToken::new();
        let sweeper = cache.spawn_sweeper(config.cache.sweep_period, sweeper_token.clone());

        tracing::info!(
            engine = engine.name(),
            cache_ttl_secs = config.cache.ttl.as_secs(),
            sweep_period_secs = config.cache.sweep_period.as_secs(),
            webhook_attempts = config.delivery.max_attempts,
            "Scrape context started"
        );

        Self {
            orchestrator: FetchOrchestrator::new(engine, cache),
            delivery: WebhookDelivery::new(sender, config.delivery),
            supervisor: TaskSupervisor::new(config.reporter),
            sweeper_token,
            sweeper: Arc::new(Mutex::new(Some(sweeper))),
        }
    }

    /// Scrapes inline.
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResult, ScrapeError> {
        self.orchestrator.scrape(request).await
    }

    /// Scrapes inline, or schedules a background scrape plus webhook delivery
    /// when the request carries a webhook.
    pub async fn submit(&self, request: ScrapeRequest) -> Result<Submission, ScrapeError> {
        let Some(webhook) = request.webhook.clone() else {
            return self.scrape(&request).await.map(Submission::Completed);
        };
        validate_webhook(&webhook).map_err(ScrapeError::rejected)?;

        let orchestrator = self.orchestrator.clone();
        let delivery = self.delivery.clone();
        let target = webhook.clone();
        let url = request.url.clone();
        let work = async move {
            // A panic still owes the caller an error webhook.
            let outcome = AssertUnwindSafe(orchestrator.scrape(&request))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ScrapeError::new(AppError::Generic(panic_message(panic.as_ref())), 0))
                });
            match outcome {
                Ok(result) => {
                    // Delivery failure is logged inside and does not change the task outcome.
                    let _ = delivery.deliver_result(&target, &result).await;
                    Ok(())
                }
                Err(error) => {
                    let _ = delivery.deliver_error(&target, &request.url, &error).await;
                    Err(error)
                }
            }
        };

        self.supervisor
            .spawn(&url, &webhook, work)
            .map(Submission::Scheduled)
            .map_err(ScrapeError::rejected)
    }

    pub fn task_state(&self, task_id: Uuid) -> Option<TaskState> {
        self.supervisor.state(task_id)
    }

    pub fn task(&self, task_id: Uuid) -> Option<TaskSnapshot> {
        self.supervisor.snapshot(task_id)
    }

    pub fn active_tasks(&self) -> usize {
        self.supervisor.active_count()
    }

    pub async fn cache_len(&self) -> u64 {
        self.orchestrator.cache().len().await
    }

    pub fn engine_name(&self) -> &str {
        self.orchestrator.engine().name()
    }

    /// Cancels outstanding background tasks, waits for them to settle, then
    /// stops the cache sweeper.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
        self.sweeper_token.cancel();

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = sweeper
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Cache sweeper ended abnormally");
        }
        tracing::info!("Scrape context stopped");
    }
}

fn validate_webhook(webhook: &str) -> Result<(), AppError> {
    let parsed = url::Url::parse(webhook)
        .map_err(|e| AppError::InvalidUrl(format!("webhook '{webhook}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::InvalidUrl(format!(
            "webhook '{webhook}': unsupported scheme '{scheme}'"
        ))),
    }
}
