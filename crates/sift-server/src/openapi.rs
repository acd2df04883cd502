use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sift API",
        version = "0.1.0",
        description = "Cached, retrying web scraper with selector, pass-through and LLM extraction and webhook delivery."
    ),
    paths(
        crate::routes::scrape,
        crate::routes::scrape_simple,
        crate::routes::scrape_fast,
        crate::routes::scrape_stock,
        crate::routes::get_task,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::ScrapeRequestBody,
        crate::dto::SelectorBody,
        crate::dto::AiExtractionBody,
        crate::dto::ProfileBody,
        crate::dto::ScrapeResponse,
        crate::dto::TaskResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "scrape", description = "Scraping endpoints"),
        (name = "tasks", description = "Background webhook tasks"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .description(Some(
                            "API key, required only when SIFT_API_KEY is set.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
