//! Common Schema Primitives
//!
//! Shared enums used across all schemas

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NewsdeskError;

// ============================================
// COMMON ENUMS
// ============================================

/// Article category derived from its text
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Technology,
    Business,
    Sports,
    Health,
    Politics,
    Entertainment,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Technology => "technology",
            Category::Business => "business",
            Category::Sports => "sports",
            Category::Health => "health",
            Category::Politics => "politics",
            Category::Entertainment => "entertainment",
            Category::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleType {
    #[default]
    News,
    Blog,
}

impl ArticleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleType::News => "news",
            ArticleType::Blog => "blog",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Date,
    Relevance,
    Popularity,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Date => "date",
            SortBy::Relevance => "relevance",
            SortBy::Popularity => "popularity",
        }
    }

    /// Value understood by the upstream `sortby` parameter
    pub fn upstream_value(&self) -> &'static str {
        match self {
            SortBy::Date => "publishedAt",
            SortBy::Relevance | SortBy::Popularity => "relevance",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Whether a payout rule (or row) applies to a source or an author
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
    Source,
    Author,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Source => "source",
            RateType::Author => "author",
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $label:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = NewsdeskError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase();
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| NewsdeskError::ValidationError(format!("unknown {}: {}", $label, s)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_enum!(Category, "category", [
    Category::Technology,
    Category::Business,
    Category::Sports,
    Category::Health,
    Category::Politics,
    Category::Entertainment,
    Category::General,
]);
impl_str_enum!(ArticleType, "article type", [ArticleType::News, ArticleType::Blog]);
impl_str_enum!(SortBy, "sort field", [SortBy::Date, SortBy::Relevance, SortBy::Popularity]);
impl_str_enum!(SortOrder, "sort order", [SortOrder::Asc, SortOrder::Desc]);
impl_str_enum!(RateType, "rate type", [RateType::Source, RateType::Author]);
