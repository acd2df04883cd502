use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use sift_client::{DynEngine, HttpEngine, OpenAiExtractor, PageBuilder, ReqwestWebhookSender};
use sift_core::context::{ContextConfig, ScrapeContext};
use sift_server::config::{EngineKind, ServerConfig};
use sift_server::routes;
use sift_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sift=info".parse()?))
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;
    if config.api_key.is_none() {
        tracing::warn!("SIFT_API_KEY not set, scrape endpoints are unauthenticated");
    }

    let engine = build_engine(&config).await?;
    let context = ScrapeContext::start(
        engine,
        ReqwestWebhookSender::new()?,
        ContextConfig {
            cache: config.cache.clone(),
            delivery: config.delivery.clone(),
            ..Default::default()
        },
    );

    let state = Arc::new(AppState {
        context: context.clone(),
        api_key: config.api_key.clone(),
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight webhook tasks are cancelled, not delivered.
    context.shutdown().await;
    Ok(())
}

async fn build_engine(config: &ServerConfig) -> anyhow::Result<DynEngine> {
    let mut pages = PageBuilder::new();
    if let Some(llm) = &config.llm {
        tracing::info!(model = %llm.model, base_url = %llm.base_url, "Custom prompts enabled");
        pages = pages.with_extractor(OpenAiExtractor::with_base_url(
            &llm.api_key,
            &llm.model,
            &llm.base_url,
        )?);
    }

    match config.engine {
        EngineKind::Http => Ok(HttpEngine::new(pages)?.into()),
        #[cfg(feature = "browser")]
        EngineKind::Browser => Ok(sift_client::BrowserEngine::launch(pages).await?.into()),
        #[cfg(not(feature = "browser"))]
        EngineKind::Browser => {
            anyhow::bail!("SIFT_ENGINE=browser requires sift-server built with the `browser` feature")
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
