use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use sift_core::error::AppError;
use sift_core::testutil::{MockEngine, QUOTE_HTML};
use sift_core::traits::WebhookEvent;

use crate::common::{
    authed, eventually, json_body, post_json, setup_test_app, setup_test_app_no_auth,
};

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_public() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["engine"], "mock");
    assert_eq!(json["cache_entries"], 0);
    assert_eq!(json["active_tasks"], 0);
}

#[tokio::test]
async fn openapi_document_lists_routes() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(
            Request::get("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["info"]["title"], "Sift API");
    for path in ["/scrape", "/scrape/simple", "/scrape/fast", "/tasks/{id}", "/health"] {
        assert!(json["paths"].get(path).is_some(), "missing {path}");
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scrape_requires_api_key() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(
            Request::post("/scrape")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url":"https://example.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error"], "unauthorized");
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn wrong_api_key_is_rejected() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(
            Request::post("/scrape/simple?url=https://example.com")
                .header("authorization", "Bearer not-the-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_configured_key_leaves_routes_open() {
    let app = setup_test_app_no_auth(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(
            Request::post("/scrape")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"url":"https://example.com"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], true);
}

// ---------------------------------------------------------------------------
// POST /scrape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scrape_extracts_selectors_and_caches() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;
    let body = json!({
        "url": "https://example.com/quote",
        "selectors": [
            {"name": "name", "selector": "h1.name"},
            {"name": "price", "selector": "//fin-streamer/text()", "is_xpath": true},
            {"name": "missing", "selector": ".nope"},
            {"name": "link", "selector": "a", "attribute": "href"}
        ]
    });

    let response = app
        .router
        .clone()
        .oneshot(post_json("/scrape", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;

    assert_eq!(json["success"], true);
    assert!(json["scraped_on"].is_string());
    let data = &json["data"];
    assert_eq!(data["name"], json!(["ACME Corp"]));
    assert_eq!(data["price"], json!(["12.50"]));
    assert_eq!(data["missing"], json!(null));
    assert_eq!(data["link"], json!(["https://example.com/news"]));
    assert_eq!(data["_metadata"]["url"], "https://example.com/quote");
    assert_eq!(data["_metadata"]["engine_used"], "mock");

    let response = app
        .router
        .oneshot(post_json("/scrape", &body))
        .await
        .unwrap();
    let again = json_body(response).await;
    assert_eq!(again["data"], json["data"]);
    assert_eq!(app.engine.calls(), 1);
}

#[tokio::test]
async fn invalid_url_fails_without_fetching() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(post_json("/scrape", &json!({"url": "ftp://example.com/file"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("ftp"));
    assert!(json.get("data").is_none());
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn duplicate_selector_names_are_rejected() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;
    let body = json!({
        "url": "https://example.com",
        "selectors": [
            {"name": "a", "selector": "h1"},
            {"name": "a", "selector": "h2"}
        ]
    });

    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn reserved_field_name_is_rejected() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;
    let body = json!({
        "url": "https://example.com",
        "selectors": [{"name": "_metadata", "selector": "h1"}]
    });

    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("reserved"));
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_failure() {
    let engine = MockEngine::failing(AppError::EngineError("browser crashed".into()));
    let app = setup_test_app(engine).await;

    let response = app
        .router
        .oneshot(post_json(
            "/scrape",
            &json!({"url": "https://example.com", "max_retries": 2}),
        ))
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("browser crashed"));
    assert_eq!(app.engine.calls(), 2);
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(post_json("/scrape", &json!({"selectors": []})))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

// ---------------------------------------------------------------------------
// Webhooks and tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn webhook_request_is_scheduled_and_delivered() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;
    let body = json!({
        "url": "https://example.com/quote",
        "selectors": [{"name": "name", "selector": "h1.name"}],
        "webhook": "https://hooks.example.com/done"
    });

    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();
    let json = json_body(response).await;

    assert_eq!(json["success"], true);
    assert_eq!(json["webhook"], "https://hooks.example.com/done");
    assert!(json["task_id"].is_string());
    assert!(json.get("data").is_none());

    let sender = app.sender.clone();
    eventually(|| !sender.sent().is_empty()).await;

    let sent = app.sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, "https://hooks.example.com/done");
    assert_eq!(sent[0].event, WebhookEvent::Completed);
    assert_eq!(sent[0].payload["name"], json!(["ACME Corp"]));
}

#[tokio::test]
async fn failed_background_scrape_posts_error_payload() {
    let engine = MockEngine::failing(AppError::InvalidUrl("blocked".into()));
    let app = setup_test_app(engine).await;
    let body = json!({
        "url": "https://example.com/quote",
        "webhook": "https://hooks.example.com/done"
    });

    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();
    assert_eq!(json_body(response).await["success"], true);

    let sender = app.sender.clone();
    eventually(|| !sender.sent().is_empty()).await;

    let sent = app.sender.sent();
    assert_eq!(sent[0].event, WebhookEvent::Failed);
    assert_eq!(sent[0].payload["url"], "https://example.com/quote");
    assert!(sent[0].payload["error"].as_str().unwrap().contains("blocked"));
}

#[tokio::test]
async fn non_http_webhook_is_rejected() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;
    let body = json!({"url": "https://example.com", "webhook": "file:///tmp/hook"});

    let response = app.router.oneshot(post_json("/scrape", &body)).await.unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json.get("task_id").is_none());
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn running_task_is_visible_until_settled() {
    let engine = MockEngine::hanging(QUOTE_HTML);
    let app = setup_test_app(engine).await;
    let body = json!({"url": "https://example.com", "webhook": "https://hooks.example.com/x"});

    let response = app
        .router
        .clone()
        .oneshot(post_json("/scrape", &body))
        .await
        .unwrap();
    let task_id = json_body(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();
    app.engine.wait_started().await;

    let response = app
        .router
        .clone()
        .oneshot(
            authed(Request::get(format!("/tasks/{task_id}")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["task_id"], task_id);
    assert_eq!(json["state"], "running");
    assert_eq!(json["webhook"], "https://hooks.example.com/x");
    assert_eq!(app.context.active_tasks(), 1);

    app.context.shutdown().await;
    assert!(app.sender.sent().is_empty());
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(
            authed(Request::get(format!("/tasks/{}", uuid::Uuid::new_v4())))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
}

// ---------------------------------------------------------------------------
// Convenience endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simple_scrape_enables_every_extractor() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(
            authed(Request::post("/scrape/simple?url=https://example.com/quote"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["url"], "https://example.com/quote");
    let data = &json["data"];
    for key in ["structured_data", "links", "images", "clean_text", "ai_extraction"] {
        assert!(data.get(key).is_some(), "missing {key}");
    }
}

#[tokio::test]
async fn fast_scrape_returns_basic_fields() {
    let app = setup_test_app(MockEngine::new(QUOTE_HTML)).await;

    let response = app
        .router
        .oneshot(
            authed(Request::post("/scrape/fast?url=https://example.com/quote"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["speed_optimized"], true);
    assert_eq!(json["url"], "https://example.com/quote");
    assert!(json["data"]["html"].as_str().unwrap().contains("ACME Corp"));
    assert_eq!(app.engine.calls(), 1);
}

#[tokio::test]
async fn fast_scrape_makes_a_single_attempt() {
    let engine = MockEngine::failing(AppError::EngineError("timeout".into()));
    let app = setup_test_app(engine).await;

    let response = app
        .router
        .oneshot(
            authed(Request::post("/scrape/fast?url=https://example.com"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json.get("speed_optimized").is_none());
    assert_eq!(app.engine.calls(), 1);
}

const STOCK_HTML: &str = r#"<html><body>
  <h1>Acme Corporation (ACME)</h1>
  <span data-testid="qsp-price">101.25</span>
  <fin-streamer data-field="regularMarketPrice" data-symbol="ACME">101.25</fin-streamer>
  <fin-streamer data-field="regularMarketPrice" data-symbol="OTHER">7.00</fin-streamer>
</body></html>"#;

#[tokio::test]
async fn stock_endpoint_targets_the_upper_cased_symbol() {
    let app = setup_test_app(MockEngine::new(STOCK_HTML)).await;

    let response = app
        .router
        .oneshot(
            authed(Request::get("/scrape/stock/acme"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["name"], json!(["Acme Corporation (ACME)"]));
    assert_eq!(data["price"], json!(["101.25"]));
    assert_eq!(data["market_price"], json!(["101.25"]));
    assert_eq!(
        data["_metadata"]["url"],
        "https://finance.yahoo.com/quote/ACME?p=ACME"
    );
}

#[tokio::test(start_paused = true)]
async fn stock_page_without_quote_data_is_retried_then_fails() {
    let consent = "<html><body><h1>Before you continue</h1><p>Too Many Requests</p></body></html>";
    let app = setup_test_app(MockEngine::new(consent)).await;

    let response = app
        .router
        .oneshot(
            authed(Request::get("/scrape/stock/ACME"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("price, summary_values"));
    assert_eq!(app.engine.calls(), 3);
    assert_eq!(app.context.cache_len().await, 0);
}

#[tokio::test]
async fn stock_endpoint_rejects_bad_symbols() {
    let app = setup_test_app(MockEngine::new(STOCK_HTML)).await;

    let response = app
        .router
        .oneshot(
            authed(Request::get("/scrape/stock/A%22B"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(app.engine.calls(), 0);
}

#[tokio::test]
async fn stock_endpoint_with_webhook_is_scheduled() {
    let app = setup_test_app(MockEngine::new(STOCK_HTML)).await;

    let response = app
        .router
        .oneshot(
            authed(Request::get(
                "/scrape/stock/ACME?webhook=https://hooks.example.com/stock",
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["webhook"], "https://hooks.example.com/stock");

    let sender = app.sender.clone();
    eventually(|| !sender.sent().is_empty()).await;
    assert_eq!(app.sender.sent()[0].payload["market_price"], json!(["101.25"]));
}
