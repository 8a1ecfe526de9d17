//! Article Schema
//!
//! Enriched articles and the response envelope handed to callers.
//! Field names match the dashboard's JSON (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{ArticleType, Category};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleSource {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
    #[serde(default)]
    pub image: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub source: ArticleSource,
    pub category: Category,
    #[serde(rename = "type", default)]
    pub article_type: ArticleType,
    pub read_time: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Article {
    /// Author label used for grouping
    pub fn author_or_unknown(&self) -> &str {
        self.author.as_deref().filter(|a| !a.is_empty()).unwrap_or("Unknown")
    }
}

/// Where the articles in a response came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Live data (or a fresh cache entry of live data)
    Success,
    /// Stale cache entry or stored articles served while degraded
    Cached,
    /// Stored articles served because the network is down
    Offline,
    /// The static placeholder record
    Fallback,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Cached => "cached",
            ResponseStatus::Offline => "offline",
            ResponseStatus::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewsResponse {
    pub total_articles: u64,
    pub articles: Vec<Article>,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NewsResponse {
    pub fn new(total_articles: u64, articles: Vec<Article>, status: ResponseStatus) -> Self {
        Self {
            total_articles,
            articles,
            status,
            error: None,
        }
    }

    /// Re-labels a response as degraded with an explanation
    pub fn degraded(mut self, status: ResponseStatus, error: impl Into<String>) -> Self {
        self.status = status;
        self.error = Some(error.into());
        self
    }

    /// The single placeholder record returned when nothing else is available
    pub fn fallback(now: DateTime<Utc>) -> Self {
        let article = Article {
            id: "fallback_1".to_string(),
            title: "News Service Temporarily Unavailable".to_string(),
            description: "We're experiencing technical difficulties. Please try again later."
                .to_string(),
            content: "The news service is currently unavailable. This is sample content to demonstrate the application's fallback functionality."
                .to_string(),
            url: "#".to_string(),
            image: Some("/placeholder.svg?height=200&width=300".to_string()),
            published_at: now,
            author: Some("System".to_string()),
            source: ArticleSource {
                name: "System".to_string(),
                url: "#".to_string(),
            },
            category: Category::General,
            article_type: ArticleType::News,
            read_time: 1,
            tags: vec!["system".to_string(), "fallback".to_string()],
        };

        Self::new(1, vec![article], ResponseStatus::Fallback)
    }
}
