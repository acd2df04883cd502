//! End-to-end runs against real HTTP: the HTTP engine fetches from a
//! wiremock server and the reqwest sender posts back to it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sift_client::{HttpEngine, PageBuilder, ReqwestWebhookSender};
use sift_core::context::{ContextConfig, ScrapeContext};
use sift_core::webhook::DeliveryConfig;
use sift_server::routes;
use sift_server::state::AppState;

use crate::common::{json_body, post_json};

const PAGE: &str = r#"<html><head><title>Widgets</title></head>
<body><h1>Widget catalogue</h1><ul><li class="item">Sprocket</li><li class="item">Gear</li></ul></body></html>"#;

fn app(retry_delay: Duration) -> axum::Router {
    let engine = HttpEngine::new(PageBuilder::new())
        .unwrap()
        .allow_private_urls();
    let context = ScrapeContext::start(
        engine,
        ReqwestWebhookSender::new().unwrap(),
        ContextConfig {
            delivery: DeliveryConfig {
                max_attempts: 3,
                retry_delay,
            },
            ..Default::default()
        },
    );
    routes::router(Arc::new(AppState {
        context,
        api_key: Some(crate::common::TEST_API_KEY.to_string()),
    }))
}

async fn wait_for_requests(server: &MockServer, request_path: &str, count: usize) {
    for _ in 0..500 {
        let seen = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count();
        if seen >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{request_path} did not receive {count} request(s)");
}

#[tokio::test]
async fn scrape_over_http_returns_selected_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalogue"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let router = app(Duration::from_millis(10));
    let body = json!({
        "url": format!("{}/catalogue", server.uri()),
        "selectors": [{"name": "items", "selector": "li.item"}],
        "extract_basic": true
    });

    let response = router.oneshot(post_json("/scrape", &body)).await.unwrap();
    let json = json_body(response).await;

    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["items"], json!(["Sprocket", "Gear"]));
    assert_eq!(json["data"]["title"], "Widgets");
    assert_eq!(json["data"]["_metadata"]["engine_used"], "http");
}

#[tokio::test]
async fn webhook_is_retried_until_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalogue"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("X-Sift-Event", "scrape.completed"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let router = app(Duration::from_millis(20));
    let body = json!({
        "url": format!("{}/catalogue", server.uri()),
        "selectors": [{"name": "heading", "selector": "h1"}],
        "webhook": format!("{}/hook", server.uri())
    });

    let response = router.oneshot(post_json("/scrape", &body)).await.unwrap();
    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert!(json["task_id"].is_string());

    wait_for_requests(&server, "/hook", 2).await;
    let hooks: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/hook")
        .collect();
    assert_eq!(hooks.len(), 2);
    let payload: serde_json::Value = serde_json::from_slice(&hooks[1].body).unwrap();
    assert_eq!(payload["heading"], json!(["Widget catalogue"]));
    assert!(payload["_metadata"]["scraped_at"].is_string());
}

#[tokio::test]
async fn upstream_error_reaches_the_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let router = app(Duration::from_millis(10));
    let target = format!("{}/gone", server.uri());
    let body = json!({
        "url": target,
        "webhook": format!("{}/hook", server.uri()),
        "max_retries": 1
    });

    router.oneshot(post_json("/scrape", &body)).await.unwrap();

    wait_for_requests(&server, "/hook", 1).await;
    let hook = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/hook")
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&hook.body).unwrap();
    assert_eq!(payload["url"], target);
    assert!(payload["error"].as_str().unwrap().contains("404"));
    assert_eq!(
        hook.headers.get("X-Sift-Event").unwrap().to_str().unwrap(),
        "scrape.failed"
    );
}
