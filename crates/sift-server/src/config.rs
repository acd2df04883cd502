use std::str::FromStr;
use std::time::Duration;

use sift_core::cache::CacheConfig;
use sift_core::error::AppError;
use sift_core::webhook::DeliveryConfig;

/// Which engine serves page fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    #[default]
    Http,
    Browser,
}

impl FromStr for EngineKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(EngineKind::Http),
            "browser" => Ok(EngineKind::Browser),
            _ => Err(AppError::ConfigError(format!(
                "Invalid SIFT_ENGINE '{s}': expected 'http' or 'browser'"
            ))),
        }
    }
}

/// OpenAI-compatible endpoint used for custom prompts.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Server configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer token required on scrape and task routes; `None` leaves them open.
    pub api_key: Option<String>,
    pub cache: CacheConfig,
    pub delivery: DeliveryConfig,
    pub engine: EngineKind,
    /// `None` disables custom-prompt extraction.
    pub llm: Option<LlmConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = CacheConfig::default();
        let delivery_defaults = DeliveryConfig::default();

        let port = parse_var(&var, "SIFT_PORT")?.unwrap_or(3000);
        let api_key = var("SIFT_API_KEY").filter(|k| !k.trim().is_empty());

        let cache = CacheConfig {
            ttl: positive_secs(&var, "SIFT_CACHE_TTL_SECS")?.unwrap_or(defaults.ttl),
            sweep_period: positive_secs(&var, "SIFT_CACHE_SWEEP_SECS")?
                .unwrap_or(defaults.sweep_period),
            max_entries: parse_var(&var, "SIFT_CACHE_MAX_ENTRIES")?.unwrap_or(defaults.max_entries),
        };

        let max_attempts: u32 =
            parse_var(&var, "SIFT_WEBHOOK_ATTEMPTS")?.unwrap_or(delivery_defaults.max_attempts);
        if max_attempts == 0 {
            return Err(AppError::ConfigError(
                "SIFT_WEBHOOK_ATTEMPTS must be at least 1".into(),
            ));
        }
        let delivery = DeliveryConfig {
            max_attempts,
            retry_delay: parse_var(&var, "SIFT_WEBHOOK_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(delivery_defaults.retry_delay),
        };

        let engine = var("SIFT_ENGINE")
            .map(|raw| raw.parse())
            .transpose()?
            .unwrap_or_default();

        let llm = var("SIFT_LLM_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .map(|api_key| LlmConfig {
                api_key,
                model: var("SIFT_LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                base_url: var("SIFT_LLM_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            });

        Ok(Self {
            port,
            api_key,
            cache,
            delivery,
            engine,
            llm,
        })
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, AppError> {
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| {
                AppError::ConfigError(format!("Invalid {key} '{raw}': expected a non-negative integer"))
            })
        })
        .transpose()
}

fn positive_secs(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<Duration>, AppError> {
    match parse_var::<u64>(var, key)? {
        Some(0) => Err(AppError::ConfigError(format!("{key} must be at least 1"))),
        other => Ok(other.map(Duration::from_secs)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.api_key.is_none());
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.cache.sweep_period, Duration::from_secs(60));
        assert_eq!(config.delivery.max_attempts, 3);
        assert_eq!(config.delivery.retry_delay, Duration::from_secs(5));
        assert_eq!(config.engine, EngineKind::Http);
        assert!(config.llm.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("SIFT_PORT", "8080"),
            ("SIFT_API_KEY", "secret"),
            ("SIFT_CACHE_TTL_SECS", "300"),
            ("SIFT_WEBHOOK_ATTEMPTS", "5"),
            ("SIFT_ENGINE", "Browser"),
            ("SIFT_LLM_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.cache.ttl, Duration::from_secs(300));
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.engine, EngineKind::Browser);
        assert_eq!(config.llm.unwrap().model, "gpt-4o-mini");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(load(&[("SIFT_PORT", "eighty")]).is_err());
        assert!(load(&[("SIFT_CACHE_TTL_SECS", "0")]).is_err());
        assert!(load(&[("SIFT_WEBHOOK_ATTEMPTS", "0")]).is_err());
        assert!(load(&[("SIFT_ENGINE", "curl")]).is_err());
    }

    #[test]
    fn blank_api_key_disables_auth() {
        assert!(load(&[("SIFT_API_KEY", "  ")]).unwrap().api_key.is_none());
    }
}
