use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;

use sift_core::context::{ContextConfig, ScrapeContext};
use sift_core::testutil::{MockEngine, MockWebhookSender};
use sift_server::routes;
use sift_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";

pub struct TestApp {
    pub router: Router,
    pub engine: MockEngine,
    pub sender: MockWebhookSender,
    pub context: ScrapeContext<MockEngine, MockWebhookSender>,
}

fn build(engine: MockEngine, api_key: Option<&str>) -> TestApp {
    let sender = MockWebhookSender::new();
    let context = ScrapeContext::start(engine.clone(), sender.clone(), ContextConfig::default());
    let state = Arc::new(AppState {
        context: context.clone(),
        api_key: api_key.map(str::to_string),
    });

    TestApp {
        router: routes::router(state),
        engine,
        sender,
        context,
    }
}

/// App protected by [`TEST_API_KEY`].
pub async fn setup_test_app(engine: MockEngine) -> TestApp {
    build(engine, Some(TEST_API_KEY))
}

/// App without an API key: every route is open.
pub async fn setup_test_app_no_auth(engine: MockEngine) -> TestApp {
    build(engine, None)
}

pub fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header("authorization", format!("Bearer {TEST_API_KEY}"))
}

pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    authed(Request::post(uri))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Polls `condition` every 10 ms for up to five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}
