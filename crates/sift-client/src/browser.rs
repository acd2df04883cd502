use std::path::PathBuf;
use std::sync::Arc;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use sift_core::error::AppError;
use sift_core::models::{DEFAULT_USER_AGENT, EnginePage, ExtractionStrategy, NavigationConfig};
use sift_core::traits::Engine;

use crate::page::PageBuilder;

/// Removes fixed/sticky overlays (cookie walls, modals) and re-enables scrolling.
const REMOVE_OVERLAYS_JS: &str = r#"
(() => {
  for (const el of document.querySelectorAll('body *')) {
    const style = getComputedStyle(el);
    if ((style.position === 'fixed' || style.position === 'sticky') && parseInt(style.zIndex || '0', 10) >= 100) {
      el.remove();
    }
  }
  document.querySelectorAll('[role="dialog"], [aria-modal="true"]').forEach(el => el.remove());
  document.documentElement.style.overflow = 'auto';
  document.body.style.overflow = 'auto';
})()
"#;

/// Scrolls through the page once to trigger lazy-loaded content.
const SIMULATE_USER_JS: &str = r#"
(async () => {
  const step = Math.max(window.innerHeight, 400);
  for (let y = 0; y < document.body.scrollHeight; y += step) {
    window.scrollTo(0, y);
    await new Promise(r => setTimeout(r, 50));
  }
  window.scrollTo(0, 0);
})()
"#;

/// Headless-browser engine using Chromium via the Chrome DevTools Protocol.
///
/// Unlike [`crate::HttpEngine`], this renders JavaScript before reading the
/// DOM. A single Chromium process is shared across all clones; each fetch
/// opens a tab, waits for the profile's render delay, optionally strips
/// overlays, reads the rendered HTML and closes the tab. The whole
/// navigation is bounded by the profile's page timeout.
///
/// SSRF protection is enabled by default, as for the HTTP engine.
#[derive(Clone)]
pub struct BrowserEngine {
    browser: Arc<Browser>,
    pages: PageBuilder,
    ssrf_protection: bool,
}

impl BrowserEngine {
    /// Launches headless Chromium.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$CHROME_BIN`, a
    /// well-known install path, or the default lookup of `chromiumoxide`.
    pub async fn launch(pages: PageBuilder) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        // The snap wrapper rejects standard Chrome flags; prefer the real binary.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg(format!("--user-agent={DEFAULT_USER_AGENT}"))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::ConfigError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            pages,
            ssrf_protection: true,
        })
    }

    /// Disable SSRF protection, allowing navigation to private/reserved IPs.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }

    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    async fn render(&self, page: &Page, url: &str, navigation: &NavigationConfig) -> Result<(String, String), AppError> {
        page.goto(url)
            .await
            .map_err(|e| AppError::EngineError(format!("Failed to navigate to {url}: {e}")))?;
        page.find_element("body")
            .await
            .map_err(|e| AppError::ContentMissing(format!("Page did not render body: {e}")))?;

        tokio::time::sleep(navigation.render_delay).await;

        if navigation.simulate_user
            && let Err(e) = page.evaluate(SIMULATE_USER_JS).await
        {
            tracing::debug!(%url, error = %e, "Scroll simulation failed");
        }
        if navigation.remove_overlays
            && let Err(e) = page.evaluate(REMOVE_OVERLAYS_JS).await
        {
            tracing::debug!(%url, error = %e, "Overlay removal failed");
        }

        let html = page
            .content()
            .await
            .map_err(|e| AppError::EngineError(format!("Failed to read page content: {e}")))?;
        let final_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());
        Ok((html, final_url))
    }
}

impl Engine for BrowserEngine {
    fn name(&self) -> &str {
        "browser"
    }

    async fn fetch(
        &self,
        url: &str,
        navigation: &NavigationConfig,
        strategy: Option<&ExtractionStrategy>,
    ) -> Result<EnginePage, AppError> {
        if self.ssrf_protection {
            crate::http::validate_url(url).await?;
        }

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::EngineError(format!("Failed to open tab: {e}")))?;
        let tab = TabGuard::new(page.clone(), close_page);

        let rendered = tokio::time::timeout(navigation.page_timeout, self.render(&page, url, navigation)).await;
        tab.close().await;

        let (html, final_url) = match rendered {
            Ok(inner) => inner?,
            Err(_) => return Err(AppError::Timeout(navigation.page_timeout.as_secs())),
        };
        self.pages.build(html, &final_url, strategy).await
    }
}

fn close_page(page: Page) -> BoxFuture<'static, ()> {
    async move {
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close tab");
        }
    }
    .boxed()
}

/// Closes a tab exactly once: explicitly via [`TabGuard::close`], or on a
/// spawned task when dropped first, e.g. when the fetch is cancelled.
struct TabGuard<T: Send + 'static> {
    tab: Option<T>,
    close: fn(T) -> BoxFuture<'static, ()>,
}

impl<T: Send + 'static> TabGuard<T> {
    fn new(tab: T, close: fn(T) -> BoxFuture<'static, ()>) -> Self {
        Self {
            tab: Some(tab),
            close,
        }
    }

    async fn close(mut self) {
        if let Some(tab) = self.tab.take() {
            (self.close)(tab).await;
        }
    }
}

impl<T: Send + 'static> Drop for TabGuard<T> {
    fn drop(&mut self) {
        if let Some(tab) = self.tab.take()
            && let Ok(runtime) = tokio::runtime::Handle::try_current()
        {
            runtime.spawn((self.close)(tab));
        }
    }
}
