use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use sift_core::context::Submission;
use sift_core::error::AppError;
use sift_core::models::{FieldSelector, NavigationProfile, ScrapeRequest};
use sift_core::traits::{Engine, WebhookSender};

use crate::auth::require_api_key;
use crate::dto::{
    FastScrapeQuery, HealthResponse, ScrapeRequestBody, ScrapeResponse, SimpleScrapeQuery,
    StockQuery, TaskResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Build the full router with all routes and middleware.
pub fn router<E: Engine, W: WebhookSender>(state: Arc<AppState<E, W>>) -> Router {
    let api = Router::new()
        .route("/scrape", post(scrape::<E, W>))
        .route("/scrape/simple", post(scrape_simple::<E, W>))
        .route("/scrape/fast", post(scrape_fast::<E, W>))
        .route("/scrape/stock/{symbol}", get(scrape_stock::<E, W>))
        .route("/tasks/{id}", get(get_task::<E, W>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key::<E, W>,
        ));

    let public = Router::new()
        .route("/health", get(health::<E, W>))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(api).with_state(state)
}

/// Runs `request` through the context and shapes the envelope.
async fn submit<E: Engine, W: WebhookSender>(
    state: &AppState<E, W>,
    request: ScrapeRequest,
) -> ScrapeResponse {
    let url = request.url.clone();
    match state.context.submit(request).await {
        Ok(Submission::Completed(result)) => ScrapeResponse::completed(result),
        Ok(Submission::Scheduled(handle)) => ScrapeResponse::scheduled(handle),
        Err(error) => {
            tracing::warn!(%url, attempts = error.attempts, error = %error.source, "Scrape failed");
            ScrapeResponse::failed(&error)
        }
    }
}

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/scrape",
    request_body = ScrapeRequestBody,
    responses(
        (status = 200, description = "Extraction result, scheduled task, or failure envelope", body = ScrapeResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "scrape"
)]
pub async fn scrape<E: Engine, W: WebhookSender>(
    State(state): State<Arc<AppState<E, W>>>,
    axum::Json(body): axum::Json<ScrapeRequestBody>,
) -> impl IntoResponse {
    axum::Json(submit(&state, body.into()).await)
}

#[utoipa::path(
    post,
    path = "/scrape/simple",
    params(SimpleScrapeQuery),
    responses(
        (status = 200, description = "Everything the engine can extract", body = ScrapeResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "scrape"
)]
pub async fn scrape_simple<E: Engine, W: WebhookSender>(
    State(state): State<Arc<AppState<E, W>>>,
    Query(query): Query<SimpleScrapeQuery>,
) -> impl IntoResponse {
    let request = ScrapeRequest::new(&query.url);
    let request = if query.extract_all {
        request.with_all_extractors()
    } else {
        request
    };

    axum::Json(submit(&state, request).await.with_url(query.url))
}

#[utoipa::path(
    post,
    path = "/scrape/fast",
    params(FastScrapeQuery),
    responses(
        (status = 200, description = "Basic page data from a single fast attempt", body = ScrapeResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "scrape"
)]
pub async fn scrape_fast<E: Engine, W: WebhookSender>(
    State(state): State<Arc<AppState<E, W>>>,
    Query(query): Query<FastScrapeQuery>,
) -> impl IntoResponse {
    let mut request = ScrapeRequest::new(&query.url)
        .with_profile(NavigationProfile::Fast)
        .with_max_retries(1);
    request.extract_basic = query.extract_basic;

    let mut response = submit(&state, request).await.with_url(query.url);
    if response.success {
        response.speed_optimized = Some(true);
    }
    axum::Json(response)
}

const STOCK_REQUIRE_ANY: &[&str] = &["price", "summary_values"];

/// Quote-page selectors for `symbol`, which must already be validated.
fn stock_selectors(symbol: &str) -> Vec<FieldSelector> {
    vec![
        FieldSelector::css("name", "h1"),
        FieldSelector::css("price", r#"[data-testid="qsp-price"]"#),
        FieldSelector::css(
            "market_price",
            format!(r#"fin-streamer[data-field="regularMarketPrice"][data-symbol="{symbol}"]"#),
        ),
        FieldSelector::xpath(
            "summary_labels",
            r#"//div[contains(@data-test, "summary-table")]//td[@data-test]"#,
        )
        .with_attribute("data-test"),
        FieldSelector::xpath(
            "summary_values",
            r#"//div[contains(@data-test, "summary-table")]//td[@data-test]"#,
        ),
    ]
}

fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 16
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
}

#[utoipa::path(
    get,
    path = "/scrape/stock/{symbol}",
    params(
        ("symbol" = String, Path, description = "Ticker symbol, case-insensitive"),
        StockQuery,
    ),
    responses(
        (status = 200, description = "Quote fields, scheduled task, or failure envelope", body = ScrapeResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "scrape"
)]
pub async fn scrape_stock<E: Engine, W: WebhookSender>(
    State(state): State<Arc<AppState<E, W>>>,
    Path(symbol): Path<String>,
    Query(query): Query<StockQuery>,
) -> impl IntoResponse {
    let symbol = symbol.to_uppercase();
    if !is_valid_symbol(&symbol) {
        let error = sift_core::error::ScrapeError::rejected(AppError::InvalidUrl(format!(
            "invalid ticker symbol '{symbol}'"
        )));
        return axum::Json(ScrapeResponse::failed(&error));
    }

    let mut request = ScrapeRequest::new(format!(
        "https://finance.yahoo.com/quote/{symbol}?p={symbol}"
    ));
    request.selectors = stock_selectors(&symbol);
    // A blocked or consent page carries neither a quote price nor a summary.
    request.require_any = STOCK_REQUIRE_ANY.iter().map(|name| name.to_string()).collect();
    request.webhook = query.webhook;

    axum::Json(submit(&state, request).await)
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "Task ID returned by a webhook scrape")
    ),
    responses(
        (status = 200, description = "Live task", body = TaskResponse),
        (status = 404, description = "Task settled or unknown", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = [])),
    tag = "tasks"
)]
pub async fn get_task<E: Engine, W: WebhookSender>(
    State(state): State<Arc<AppState<E, W>>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .context
        .task(id)
        .ok_or_else(|| AppError::NotFound(format!("task {id} is not running")))?;

    Ok(axum::Json(TaskResponse::from(task)))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health<E: Engine, W: WebhookSender>(
    State(state): State<Arc<AppState<E, W>>>,
) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "healthy",
        engine: state.context.engine_name().to_string(),
        cache_entries: state.context.cache_len().await,
        active_tasks: state.context.active_tasks(),
    })
}
