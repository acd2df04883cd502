use sift_core::error::AppError;
use sift_core::models::{EnginePage, ExtractionStrategy, NavigationConfig};
use sift_core::traits::Engine;

#[cfg(feature = "browser")]
use crate::browser::BrowserEngine;
use crate::http::HttpEngine;

/// Engine chosen at startup.
#[derive(Clone)]
pub enum DynEngine {
    Http(HttpEngine),
    #[cfg(feature = "browser")]
    Browser(BrowserEngine),
}

impl Engine for DynEngine {
    fn name(&self) -> &str {
        match self {
            DynEngine::Http(engine) => engine.name(),
            #[cfg(feature = "browser")]
            DynEngine::Browser(engine) => engine.name(),
        }
    }

    async fn fetch(
        &self,
        url: &str,
        navigation: &NavigationConfig,
        strategy: Option<&ExtractionStrategy>,
    ) -> Result<EnginePage, AppError> {
        match self {
            DynEngine::Http(engine) => engine.fetch(url, navigation, strategy).await,
            #[cfg(feature = "browser")]
            DynEngine::Browser(engine) => engine.fetch(url, navigation, strategy).await,
        }
    }
}

impl From<HttpEngine> for DynEngine {
    fn from(engine: HttpEngine) -> Self {
        DynEngine::Http(engine)
    }
}

#[cfg(feature = "browser")]
impl From<BrowserEngine> for DynEngine {
    fn from(engine: BrowserEngine) -> Self {
        DynEngine::Browser(engine)
    }
}
