//! Configuration for newsdesk
//!
//! Read from the environment (and a `.env` file when present). Every field
//! has a default so an empty environment yields a usable offline setup.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::GNEWS_BASE_URL;
use crate::error::{NewsdeskError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Upstream API
    pub gnews_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub gnews_base_url: String,
    #[serde(default = "default_language")]
    pub news_language: String,
    #[serde(default = "default_max_articles")]
    pub news_max_articles: u32,
    #[serde(default = "default_query")]
    pub default_query: String,

    // Quota and cache
    #[serde(default = "default_daily_limit")]
    pub daily_request_limit: u32,
    #[serde(default = "default_freshness_secs")]
    pub cache_freshness_secs: u64,
    /// Humantime override for the freshness window ("30m", "2h")
    pub cache_freshness: Option<String>,

    // Rate limiting (requests per minute)
    #[serde(default = "default_upstream_rate_limit")]
    pub upstream_rate_limit_rpm: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    // Storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    // Local HTTP API
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// Start with the network marked unavailable
    #[serde(default)]
    pub offline: bool,
}

fn default_base_url() -> String {
    GNEWS_BASE_URL.to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_articles() -> u32 {
    50
}

fn default_query() -> String {
    "technology".to_string()
}

fn default_daily_limit() -> u32 {
    90 // GNews free tier allows 100/day; keep headroom
}

fn default_freshness_secs() -> u64 {
    3600
}

fn default_upstream_rate_limit() -> u32 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gnews_api_key: None,
            gnews_base_url: default_base_url(),
            news_language: default_language(),
            news_max_articles: default_max_articles(),
            default_query: default_query(),
            daily_request_limit: default_daily_limit(),
            cache_freshness_secs: default_freshness_secs(),
            cache_freshness: None,
            upstream_rate_limit_rpm: default_upstream_rate_limit(),
            request_timeout_secs: default_request_timeout(),
            data_dir: default_data_dir(),
            bind_address: default_bind_address(),
            server_port: default_server_port(),
            metrics_enabled: default_metrics_enabled(),
            offline: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.daily_request_limit == 0 {
            return Err(invalid("DAILY_REQUEST_LIMIT must be greater than 0"));
        }
        if self.news_max_articles == 0 {
            return Err(invalid("NEWS_MAX_ARTICLES must be greater than 0"));
        }
        if self.cache_freshness()?.is_zero() {
            return Err(invalid("cache freshness window must be greater than 0"));
        }
        if self.server_port == 0 {
            return Err(invalid("SERVER_PORT must not be 0"));
        }
        url::Url::parse(&self.gnews_base_url)
            .map_err(|e| invalid(&format!("GNEWS_BASE_URL is not a valid URL: {e}")))?;
        Ok(())
    }

    /// Freshness window; `CACHE_FRESHNESS` wins over `CACHE_FRESHNESS_SECS`
    pub fn cache_freshness(&self) -> Result<Duration> {
        match self.cache_freshness.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => humantime::parse_duration(text)
                .map_err(|e| invalid(&format!("CACHE_FRESHNESS '{text}': {e}"))),
            _ => Ok(Duration::from_secs(self.cache_freshness_secs)),
        }
    }

    /// Checks if the upstream API key is configured
    pub fn has_api_key(&self) -> bool {
        self.gnews_api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    pub fn server_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.server_port)
            .parse()
            .map_err(|e| invalid(&format!("invalid bind address: {e}")))
    }
}

fn invalid(message: &str) -> NewsdeskError {
    NewsdeskError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.gnews_base_url, "https://gnews.io/api/v4");
        assert_eq!(config.daily_request_limit, 90);
        assert_eq!(config.news_max_articles, 50);
        assert_eq!(config.cache_freshness().unwrap(), Duration::from_secs(3600));
        assert!(!config.has_api_key());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_humantime_freshness() {
        let config = Config {
            cache_freshness: Some("30m".to_string()),
            ..Default::default()
        };
        assert_eq!(config.cache_freshness().unwrap(), Duration::from_secs(1800));

        let bad = Config {
            cache_freshness: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(bad.cache_freshness().is_err());
    }

    #[test]
    fn test_validation() {
        let zero_limit = Config {
            daily_request_limit: 0,
            ..Default::default()
        };
        assert!(zero_limit.validate().is_err());

        let bad_url = Config {
            gnews_base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let zero_freshness = Config {
            cache_freshness_secs: 0,
            ..Default::default()
        };
        assert!(zero_freshness.validate().is_err());
    }

    #[test]
    fn test_server_addr() {
        let config = Config::default();
        assert_eq!(config.server_addr().unwrap().port(), 8080);
    }
}
