//! Search filter options
//!
//! Doubles as request parameter and as cache key material, so it knows how
//! to normalize itself into an order-independent list of pairs.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::article::Article;
use super::common::{ArticleType, Category, SortBy, SortOrder};
use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub article_type: Option<ArticleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

fn clean(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FilterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn sort(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = Some(sort_by);
        self.sort_order = Some(sort_order);
        self
    }

    pub fn date_range(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_date = Some(from.into());
        self.to_date = Some(to.into());
        self
    }

    /// Builds filters from URL query pairs (`q`, `author`, `source`,
    /// `category`, `type`, `from`, `to`, `sortBy`, `sortOrder`).
    pub fn from_query_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut filters = FilterOptions::default();
        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "q" | "query" => filters.query = Some(value.to_string()),
                "author" => filters.author = Some(value.to_string()),
                "source" => filters.source = Some(value.to_string()),
                "category" => filters.category = Some(value.parse()?),
                "type" => filters.article_type = Some(value.parse()?),
                "from" | "fromDate" => filters.from_date = Some(value.to_string()),
                "to" | "toDate" => filters.to_date = Some(value.to_string()),
                "sortBy" => filters.sort_by = Some(value.parse()?),
                "sortOrder" => filters.sort_order = Some(value.parse()?),
                _ => {}
            }
        }
        Ok(filters)
    }

    /// Search text, if any
    pub fn query_text(&self) -> Option<&str> {
        clean(&self.query)
    }

    pub fn effective_sort_by(&self) -> SortBy {
        self.sort_by.unwrap_or_default()
    }

    pub fn effective_sort_order(&self) -> SortOrder {
        self.sort_order.unwrap_or_default()
    }

    pub fn from_bound(&self) -> Option<DateTime<Utc>> {
        clean(&self.from_date).and_then(|s| parse_bound(s, NaiveTime::MIN))
    }

    pub fn to_bound(&self) -> Option<DateTime<Utc>> {
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        clean(&self.to_date).and_then(|s| parse_bound(s, end_of_day))
    }

    /// Normalized (field, value) pairs sorted by field name.
    ///
    /// Trimmed, empty values dropped, sort defaults made explicit.
    pub fn normalized_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> = Vec::new();

        let text_fields = [
            ("author", &self.author),
            ("fromDate", &self.from_date),
            ("query", &self.query),
            ("source", &self.source),
            ("toDate", &self.to_date),
        ];
        for (name, value) in text_fields {
            if let Some(v) = clean(value) {
                pairs.push((name, v.to_string()));
            }
        }

        if let Some(category) = self.category {
            pairs.push(("category", category.as_str().to_string()));
        }
        if let Some(article_type) = self.article_type {
            pairs.push(("type", article_type.as_str().to_string()));
        }
        pairs.push(("sortBy", self.effective_sort_by().as_str().to_string()));
        pairs.push(("sortOrder", self.effective_sort_order().as_str().to_string()));

        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    /// Whether any filter is applied locally after the upstream call
    pub fn has_local_refinements(&self) -> bool {
        clean(&self.author).is_some()
            || clean(&self.source).is_some()
            || self.category.is_some()
            || self.article_type.is_some()
    }

    /// Matches the attribute filters (author, source, category, type).
    pub fn matches_attributes(&self, article: &Article) -> bool {
        if let Some(source) = clean(&self.source) {
            if !article.source.name.eq_ignore_ascii_case(source) {
                return false;
            }
        }
        if let Some(author) = clean(&self.author) {
            if !article.author_or_unknown().eq_ignore_ascii_case(author) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if article.category != category {
                return false;
            }
        }
        if let Some(article_type) = self.article_type {
            if article.article_type != article_type {
                return false;
            }
        }
        true
    }

    /// Full local match, used when serving stored articles without the
    /// upstream search (query text and date range included).
    pub fn matches(&self, article: &Article) -> bool {
        if !self.matches_attributes(article) {
            return false;
        }
        if let Some(query) = self.query_text() {
            let needle = query.to_lowercase();
            let found = [&article.title, &article.description, &article.content]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }
        if let Some(from) = self.from_bound() {
            if article.published_at < from {
                return false;
            }
        }
        if let Some(to) = self.to_bound() {
            if article.published_at > to {
                return false;
            }
        }
        true
    }

    /// Orders articles by publication date when sorting by date.
    /// Other sort fields keep the upstream order.
    pub fn apply_order(&self, articles: &mut [Article]) {
        if self.effective_sort_by() != SortBy::Date {
            return;
        }
        match self.effective_sort_order() {
            SortOrder::Asc => articles.sort_by(|a, b| a.published_at.cmp(&b.published_at)),
            SortOrder::Desc => articles.sort_by(|a, b| b.published_at.cmp(&a.published_at)),
        }
    }
}

/// Parses an RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
fn parse_bound(value: &str, time_of_day: NaiveTime) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(time_of_day).and_utc())
}
