#[cfg(feature = "browser")]
pub mod browser;
pub mod cleaner;
pub mod engine;
pub mod http;
pub mod llm;
pub mod page;
pub mod webhook;

#[cfg(feature = "browser")]
pub use browser::BrowserEngine;
pub use cleaner::HtmdCleaner;
pub use engine::DynEngine;
pub use http::HttpEngine;
pub use llm::OpenAiExtractor;
pub use page::PageBuilder;
pub use webhook::ReqwestWebhookSender;
