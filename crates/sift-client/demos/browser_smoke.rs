/// Smoke-test for `BrowserEngine`.
///
/// Launches a headless Chromium, renders <https://example.com> with the fast
/// profile and checks the analyzed page.
///
/// Run with:
///   cargo run -p sift-client --example browser_smoke --features browser
use sift_client::{BrowserEngine, PageBuilder};
use sift_core::models::NavigationProfile;
use sift_core::traits::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser…");
    let engine = BrowserEngine::launch(PageBuilder::new()).await?;

    let url = "https://example.com";
    println!("Rendering {url} …");
    let page = engine
        .fetch(url, &NavigationProfile::Fast.navigation(), None)
        .await?;

    anyhow::ensure!(
        page.title.as_deref() == Some("Example Domain"),
        "unexpected title: {:?}",
        page.title
    );
    anyhow::ensure!(page.html.len() > 500, "HTML suspiciously short ({} bytes)", page.html.len());

    println!("OK: {} bytes of rendered HTML", page.html.len());
    println!("Links: {}", page.links.unwrap_or_default());
    Ok(())
}
