use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use sift_client::{DynEngine, HttpEngine, OpenAiExtractor, PageBuilder};
use sift_core::cache::{CacheConfig, CacheStore};
use sift_core::models::{AiExtractionConfig, FieldSelector, NavigationProfile, ScrapeRequest};
use sift_core::orchestrator::FetchOrchestrator;

#[derive(Parser)]
#[command(name = "sift", version, about = "Cached, retrying web scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one page and print the result as JSON
    Scrape(ScrapeArgs),
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum EngineArg {
    #[default]
    Http,
    Browser,
}

#[derive(Args)]
struct ScrapeArgs {
    /// Target URL to scrape
    #[arg(short, long)]
    url: String,

    /// CSS field as NAME=SELECTOR (repeatable)
    #[arg(long = "css", value_name = "NAME=SELECTOR", value_parser = parse_pair)]
    css: Vec<(String, String)>,

    /// XPath field as NAME=EXPRESSION (repeatable)
    #[arg(long = "xpath", value_name = "NAME=EXPRESSION", value_parser = parse_pair)]
    xpath: Vec<(String, String)>,

    /// Read an attribute instead of text for a field, as NAME=ATTRIBUTE
    #[arg(long = "attr", value_name = "NAME=ATTRIBUTE", value_parser = parse_pair)]
    attributes: Vec<(String, String)>,

    /// Retry until this field matches (repeatable)
    #[arg(long = "required", value_name = "NAME")]
    required: Vec<String>,

    /// Enable every extractor
    #[arg(long)]
    all: bool,

    /// Include JSON-LD structured data
    #[arg(long)]
    structured_data: bool,

    /// Include internal and external links
    #[arg(long)]
    links: bool,

    /// Include images
    #[arg(long)]
    images: bool,

    /// Include the page as cleaned Markdown text
    #[arg(long)]
    text: bool,

    /// Include truncated HTML, title and final URL
    #[arg(long)]
    basic: bool,

    /// Use the fast navigation profile
    #[arg(long)]
    fast: bool,

    /// Engine attempts before giving up
    #[arg(long, default_value_t = sift_core::models::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Free-text instruction answered by the LLM over the page content
    #[arg(short, long)]
    prompt: Option<String>,

    #[arg(long, value_enum, default_value_t, env = "SIFT_ENGINE")]
    engine: EngineArg,

    /// Allow loopback and private network targets
    #[arg(long)]
    allow_private: bool,

    /// LLM model used for --prompt
    #[arg(long, env = "SIFT_LLM_MODEL", default_value = "gpt-4o-mini")]
    model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "SIFT_LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// LLM API key, required only with --prompt
    #[arg(long, env = "SIFT_LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sift=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scrape(args) => cmd_scrape(args).await,
    }
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    if name.trim().is_empty() || value.trim().is_empty() {
        return Err(format!("both sides of '{raw}' must be non-empty"));
    }
    Ok((name.trim().to_string(), value.to_string()))
}

fn build_request(args: &ScrapeArgs) -> Result<ScrapeRequest> {
    let mut request = ScrapeRequest::new(&args.url).with_max_retries(args.max_retries);

    let fields = args
        .css
        .iter()
        .map(|(name, selector)| FieldSelector::css(name, selector))
        .chain(
            args.xpath
                .iter()
                .map(|(name, expression)| FieldSelector::xpath(name, expression)),
        );
    for mut field in fields {
        if let Some((_, attribute)) = args.attributes.iter().find(|(name, _)| *name == field.name) {
            field = field.with_attribute(attribute);
        }
        if args.required.contains(&field.name) {
            field = field.required();
        }
        request = request.with_selector(field);
    }

    for (name, _) in &args.attributes {
        if !request.selectors.iter().any(|f| &f.name == name) {
            anyhow::bail!("--attr refers to unknown field '{name}'");
        }
    }
    for name in &args.required {
        if !request.selectors.iter().any(|f| &f.name == name) {
            anyhow::bail!("--required refers to unknown field '{name}'");
        }
    }

    if args.all {
        request = request.with_all_extractors();
    }
    request.extract_structured_data |= args.structured_data;
    request.extract_links |= args.links;
    request.extract_images |= args.images;
    request.extract_text |= args.text;
    request.extract_basic = args.basic;

    if let Some(prompt) = &args.prompt {
        let ai = request.ai_extraction.get_or_insert_with(AiExtractionConfig::default);
        ai.custom_prompt = Some(prompt.clone());
    }
    if args.fast {
        request = request.with_profile(NavigationProfile::Fast);
    }

    Ok(request)
}

async fn build_engine(args: &ScrapeArgs) -> Result<DynEngine> {
    let mut pages = PageBuilder::new();
    if args.prompt.is_some() {
        let api_key = args
            .llm_api_key
            .as_deref()
            .context("--prompt needs an LLM key (SIFT_LLM_API_KEY or --llm-api-key)")?;
        pages = pages.with_extractor(
            OpenAiExtractor::with_base_url(api_key, &args.model, &args.base_url)
                .map_err(|e| anyhow::anyhow!(e))?,
        );
    }

    match args.engine {
        EngineArg::Http => {
            let engine = HttpEngine::new(pages).map_err(|e| anyhow::anyhow!(e))?;
            let engine = if args.allow_private {
                engine.allow_private_urls()
            } else {
                engine
            };
            Ok(engine.into())
        }
        #[cfg(feature = "browser")]
        EngineArg::Browser => {
            let engine = sift_client::BrowserEngine::launch(pages)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            let engine = if args.allow_private {
                engine.allow_private_urls()
            } else {
                engine
            };
            Ok(engine.into())
        }
        #[cfg(not(feature = "browser"))]
        EngineArg::Browser => {
            anyhow::bail!("--engine browser requires sift built with the `browser` feature")
        }
    }
}

async fn cmd_scrape(args: ScrapeArgs) -> Result<()> {
    let request = build_request(&args)?;
    let engine = build_engine(&args).await?;
    let orchestrator = FetchOrchestrator::new(engine, CacheStore::new(&CacheConfig::default()));

    tracing::info!(url = %request.url, fields = request.selectors.len(), "Scraping");

    let result = orchestrator
        .scrape(&request)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("Failed to scrape {}", request.url))?;

    for warning in &result.metadata.warnings {
        tracing::warn!(%warning, "Extraction warning");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
