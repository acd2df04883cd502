use sift_core::context::ScrapeContext;
use sift_core::traits::{Engine, WebhookSender};

/// Shared application state, available to all route handlers via `State<Arc<AppState<E, W>>>`.
pub struct AppState<E: Engine, W: WebhookSender> {
    pub context: ScrapeContext<E, W>,
    /// Bearer token for scrape and task routes (None = routes are open).
    pub api_key: Option<String>,
}
