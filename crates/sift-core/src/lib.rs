pub mod cache;
pub mod context;
pub mod error;
pub mod extract;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod supervisor;
pub mod traits;
pub mod webhook;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use cache::{CacheConfig, CacheStore};
pub use context::{ContextConfig, ScrapeContext, Submission};
pub use error::{AppError, ScrapeError};
pub use models::{
    AiExtractionConfig, EnginePage, ExtractionStrategy, FieldSelector, NavigationConfig,
    NavigationProfile, ScrapeRequest, ScrapeResult, cache_key_for, compute_hash,
};
pub use supervisor::{TaskHandle, TaskSnapshot, TaskState, TaskSupervisor};
pub use traits::{Engine, Extractor, WebhookEvent, WebhookSender};
pub use webhook::DeliveryConfig;
