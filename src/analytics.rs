//! Grouped article analytics for the dashboard charts and stats cards

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::payout::AggregationEngine;
use crate::schemas::{Article, PayoutRate};

pub const TOP_SOURCES: usize = 5;
pub const TOP_AUTHORS: usize = 10;
pub const TOP_TAGS: usize = 10;
pub const TOP_CATEGORIES: usize = 5;
pub const TIMELINE_DAYS: usize = 14;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CountBucket {
    pub label: String,
    pub count: usize,
}

/// Counts labels and returns the `limit` largest buckets.
///
/// Equal counts keep first-seen order.
fn top_counts<'a>(labels: impl Iterator<Item = &'a str>, limit: usize) -> Vec<CountBucket> {
    let mut buckets: Vec<CountBucket> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        match index.get(label) {
            Some(&i) => buckets[i].count += 1,
            None => {
                index.insert(label, buckets.len());
                buckets.push(CountBucket {
                    label: label.to_string(),
                    count: 1,
                });
            }
        }
    }
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    buckets.truncate(limit);
    buckets
}

pub fn by_source(articles: &[Article]) -> Vec<CountBucket> {
    top_counts(articles.iter().map(|a| a.source.name.as_str()), TOP_SOURCES)
}

pub fn by_author(articles: &[Article]) -> Vec<CountBucket> {
    top_counts(articles.iter().map(Article::author_or_unknown), TOP_AUTHORS)
}

pub fn by_tag(articles: &[Article]) -> Vec<CountBucket> {
    top_counts(
        articles.iter().flat_map(|a| a.tags.iter().map(String::as_str)),
        TOP_TAGS,
    )
}

pub fn by_category(articles: &[Article]) -> Vec<CountBucket> {
    top_counts(articles.iter().map(|a| a.category.as_str()), TOP_CATEGORIES)
}

/// Articles per UTC publication date: the most recent days, oldest first
pub fn timeline(articles: &[Article]) -> Vec<CountBucket> {
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for article in articles {
        *days.entry(article.published_at.date_naive()).or_insert(0) += 1;
    }

    let skip = days.len().saturating_sub(TIMELINE_DAYS);
    days.into_iter()
        .skip(skip)
        .map(|(day, count)| CountBucket {
            label: day.format("%Y-%m-%d").to_string(),
            count,
        })
        .collect()
}

/// Figures shown on the dashboard stats cards
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_articles: usize,
    pub unique_sources: usize,
    pub unique_authors: usize,
    pub average_read_time: u32,
    pub published_today: usize,
    pub total_payout: f64,
}

impl DashboardStats {
    pub fn compute(
        articles: &[Article],
        rates: &[PayoutRate],
        engine: &AggregationEngine,
        today: NaiveDate,
    ) -> Self {
        let unique_sources: HashSet<&str> = articles.iter().map(|a| a.source.name.as_str()).collect();
        let unique_authors: HashSet<&str> = articles.iter().map(Article::author_or_unknown).collect();

        let average_read_time = if articles.is_empty() {
            0
        } else {
            let sum: u64 = articles.iter().map(|a| u64::from(a.read_time)).sum();
            (sum as f64 / articles.len() as f64).round() as u32
        };

        Self {
            total_articles: articles.len(),
            unique_sources: unique_sources.len(),
            unique_authors: unique_authors.len(),
            average_read_time,
            published_today: articles
                .iter()
                .filter(|a| a.published_at.date_naive() == today)
                .count(),
            total_payout: engine.total_payout(articles, rates),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub sources: Vec<CountBucket>,
    pub authors: Vec<CountBucket>,
    pub tags: Vec<CountBucket>,
    pub categories: Vec<CountBucket>,
    pub timeline: Vec<CountBucket>,
    pub stats: DashboardStats,
}

impl AnalyticsReport {
    pub fn build(
        articles: &[Article],
        rates: &[PayoutRate],
        engine: &AggregationEngine,
        today: NaiveDate,
    ) -> Self {
        Self {
            sources: by_source(articles),
            authors: by_author(articles),
            tags: by_tag(articles),
            categories: by_category(articles),
            timeline: timeline(articles),
            stats: DashboardStats::compute(articles, rates, engine, today),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{ArticleSource, ArticleType, Category};
    use chrono::{Duration, TimeZone, Utc};

    fn article(source: &str, day_offset: i64, read_time: u32, tags: &[&str]) -> Article {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        Article {
            id: format!("{source}_{day_offset}"),
            title: "Title".to_string(),
            description: String::new(),
            content: String::new(),
            url: "https://example.com".to_string(),
            image: None,
            published_at: base + Duration::days(day_offset),
            author: Some(source.to_string()),
            source: ArticleSource {
                name: source.to_string(),
                url: String::new(),
            },
            category: if read_time > 2 { Category::Business } else { Category::General },
            article_type: ArticleType::News,
            read_time,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_source_counts_sorted_and_limited() {
        let mut articles = Vec::new();
        for (i, source) in ["A", "B", "B", "C", "C", "C", "D", "E", "F"].iter().enumerate() {
            articles.push(article(source, i as i64, 1, &[]));
        }

        let buckets = by_source(&articles);
        assert_eq!(buckets.len(), TOP_SOURCES);
        assert_eq!(buckets[0], CountBucket { label: "C".to_string(), count: 3 });
        assert_eq!(buckets[1].label, "B");
        // ties keep first-seen order
        assert_eq!(buckets[2].label, "A");
        assert_eq!(buckets[3].label, "D");
    }

    #[test]
    fn test_tags_and_categories() {
        let articles = vec![
            article("A", 0, 3, &["rust", "cargo"]),
            article("B", 0, 1, &["rust"]),
        ];
        let tags = by_tag(&articles);
        assert_eq!(tags[0], CountBucket { label: "rust".to_string(), count: 2 });

        let categories = by_category(&articles);
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].label, "business");
    }

    #[test]
    fn test_timeline_keeps_last_fourteen_days() {
        let articles: Vec<Article> = (0..20).map(|d| article("A", d, 1, &[])).collect();
        let days = timeline(&articles);
        assert_eq!(days.len(), TIMELINE_DAYS);
        assert_eq!(days[0].label, "2024-03-07");
        assert_eq!(days[13].label, "2024-03-20");
        assert!(days.windows(2).all(|w| w[0].label < w[1].label));
    }

    #[test]
    fn test_dashboard_stats() {
        let articles = vec![
            article("NYT", 0, 1, &[]),
            article("NYT", 1, 2, &[]),
            article("BBC", 1, 4, &[]),
        ];
        let rates = vec![PayoutRate::for_source("NYT", 75.0)];
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

        let stats = DashboardStats::compute(&articles, &rates, &AggregationEngine::new(), today);
        assert_eq!(stats.total_articles, 3);
        assert_eq!(stats.unique_sources, 2);
        assert_eq!(stats.unique_authors, 2);
        assert_eq!(stats.average_read_time, 2);
        assert_eq!(stats.published_today, 2);
        assert_eq!(stats.total_payout, 175.0);
    }

    #[test]
    fn test_empty_report() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let report = AnalyticsReport::build(&[], &[], &AggregationEngine::new(), today);
        assert!(report.sources.is_empty());
        assert!(report.timeline.is_empty());
        assert_eq!(report.stats.average_read_time, 0);
    }
}
