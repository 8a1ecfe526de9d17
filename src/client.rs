//! GNews HTTP Client
//!
//! Outbound calls to the news API:
//! - `GET {base}/search` and `GET {base}/top-headlines`
//! - per-minute smoothing with a direct rate limiter
//! - no retries; a failed call is reported once and the caller decides
//!
//! HTTP 429 is surfaced as [`NewsdeskError::UpstreamRateLimited`] so the
//! gateway can treat it like an exhausted quota.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{NewsdeskError, Result};
use crate::schemas::FilterOptions;

pub const GNEWS_BASE_URL: &str = "https://gnews.io/api/v4";

/// Raw upstream response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GNewsResponse {
    #[serde(default)]
    pub total_articles: u64,
    #[serde(default)]
    pub articles: Vec<GNewsArticle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GNewsArticle {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub url: String,
    #[serde(default)]
    pub image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: GNewsSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GNewsSource {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Seam between the gateway and the remote news API
#[async_trait]
pub trait NewsApi: Send + Sync {
    /// Searches articles matching the filters
    async fn search(&self, filters: &FilterOptions) -> Result<GNewsResponse>;

    /// Fetches the current top headlines
    async fn top_headlines(&self) -> Result<GNewsResponse>;
}

/// Configuration for the GNews client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// API base URL, without trailing slash
    pub base_url: String,
    /// API token sent as `token`
    pub api_key: String,
    /// Article language (`lang`)
    pub language: String,
    /// Articles per call (`max`)
    pub max_articles: u32,
    /// Query used when the filters carry none
    pub default_query: String,
    /// Outbound calls per minute
    pub rate_limit_rpm: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: GNEWS_BASE_URL.to_string(),
            api_key: String::new(),
            language: "en".to_string(),
            max_articles: 50,
            default_query: "technology".to_string(),
            rate_limit_rpm: 30,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("newsdesk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.gnews_base_url.trim_end_matches('/').to_string(),
            api_key: config.gnews_api_key.clone().unwrap_or_default(),
            language: config.news_language.clone(),
            max_articles: config.news_max_articles,
            default_query: config.default_query.clone(),
            rate_limit_rpm: config.upstream_rate_limit_rpm,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            ..Default::default()
        }
    }
}

/// GNews API client with outbound rate smoothing
pub struct GNewsClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    config: HttpClientConfig,
}

impl GNewsClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(config.rate_limit_rpm).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Query parameters for a search call
    pub fn search_params(&self, filters: &FilterOptions) -> Vec<(&'static str, String)> {
        let mut params = vec![
            (
                "q",
                filters
                    .query_text()
                    .unwrap_or(&self.config.default_query)
                    .to_string(),
            ),
            ("token", self.config.api_key.clone()),
            ("lang", self.config.language.clone()),
            ("max", self.config.max_articles.to_string()),
            ("sortby", filters.effective_sort_by().upstream_value().to_string()),
        ];

        if let Some(from) = filters.from_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(("from", from.to_string()));
        }
        if let Some(to) = filters.to_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(("to", to.to_string()));
        }
        params
    }

    /// Query parameters for a headlines call
    pub fn headline_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.config.api_key.clone()),
            ("lang", self.config.language.clone()),
            ("max", self.config.max_articles.to_string()),
        ]
    }

    async fn get(&self, endpoint: &str, params: &[(&'static str, String)]) -> Result<GNewsResponse> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.config.base_url, endpoint);
        debug!(url = %url, "Calling news API");

        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint, "News API rate limit exceeded");
            return Err(NewsdeskError::UpstreamRateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsdeskError::ApiError {
                code: status.as_u16().to_string(),
                message: body,
            });
        }

        let text = response.text().await?;
        let parsed: GNewsResponse = serde_json::from_str(&text)?;

        debug!(
            endpoint,
            total = parsed.total_articles,
            returned = parsed.articles.len(),
            "News API call succeeded"
        );
        Ok(parsed)
    }
}

#[async_trait]
impl NewsApi for GNewsClient {
    async fn search(&self, filters: &FilterOptions) -> Result<GNewsResponse> {
        let params = self.search_params(filters);
        self.get("search", &params).await
    }

    async fn top_headlines(&self) -> Result<GNewsResponse> {
        let params = self.headline_params();
        self.get("top-headlines", &params).await
    }
}
