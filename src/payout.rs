//! Payout Aggregation
//!
//! Articles are grouped by source or author and multiplied by a per-article
//! rate. Which rate applies is decided by an ordered [`RateChain`]: the first
//! strategy that yields a rate wins.
//!
//! Source chain: exact source rule, then the "Default" source rule, then 25.
//! Author chain: exact author rule, then 30.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{NewsdeskError, Result};
use crate::schemas::{Article, PayoutData, PayoutRate, RateType, DEFAULT_SOURCE};
use crate::store::OfflineStore;

pub const FALLBACK_SOURCE_RATE: f64 = 25.0;
pub const FALLBACK_AUTHOR_RATE: f64 = 30.0;

/// One step of rate resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateStrategy {
    /// Source rule whose name equals the group name
    ExactSource,
    /// The source rule named "Default"
    DefaultSource,
    /// Author rule whose name equals the group name
    ExactAuthor,
    /// Fixed rate
    Constant(f64),
}

impl RateStrategy {
    fn resolve(&self, name: &str, rates: &[PayoutRate]) -> Option<f64> {
        match self {
            RateStrategy::ExactSource => find_rate(rates, RateType::Source, name),
            RateStrategy::DefaultSource => find_rate(rates, RateType::Source, DEFAULT_SOURCE),
            RateStrategy::ExactAuthor => find_rate(rates, RateType::Author, name),
            RateStrategy::Constant(rate) => Some(*rate),
        }
    }
}

/// First matching rule of the given type; names compare exactly
fn find_rate(rates: &[PayoutRate], rate_type: RateType, name: &str) -> Option<f64> {
    rates
        .iter()
        .find(|r| r.rate_type == rate_type && r.target() == Some(name))
        .map(|r| r.rate)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateChain {
    steps: Vec<RateStrategy>,
}

impl RateChain {
    pub fn new(steps: Vec<RateStrategy>) -> Self {
        Self { steps }
    }

    pub fn for_sources() -> Self {
        Self::new(vec![
            RateStrategy::ExactSource,
            RateStrategy::DefaultSource,
            RateStrategy::Constant(FALLBACK_SOURCE_RATE),
        ])
    }

    pub fn for_authors() -> Self {
        Self::new(vec![
            RateStrategy::ExactAuthor,
            RateStrategy::Constant(FALLBACK_AUTHOR_RATE),
        ])
    }

    /// Rate for `name`; 0 only if the chain has no constant tail and nothing matched
    pub fn resolve(&self, name: &str, rates: &[PayoutRate]) -> f64 {
        self.steps
            .iter()
            .find_map(|step| step.resolve(name, rates))
            .unwrap_or(0.0)
    }
}

/// Counts per group key, in first-seen order
fn count_in_order<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        match index.get(key) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(key, order.len());
                order.push((key, 1));
            }
        }
    }
    order
}

#[derive(Debug, Clone)]
pub struct AggregationEngine {
    source_chain: RateChain,
    author_chain: RateChain,
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self {
            source_chain: RateChain::for_sources(),
            author_chain: RateChain::for_authors(),
        }
    }
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// One row per source name, in order of first appearance
    pub fn calculate_payouts(&self, articles: &[Article], rates: &[PayoutRate]) -> Vec<PayoutData> {
        count_in_order(articles.iter().map(|a| a.source.name.as_str()))
            .into_iter()
            .map(|(source, count)| {
                let rate = self.source_chain.resolve(source, rates);
                PayoutData {
                    source: source.to_string(),
                    author: None,
                    articles: count,
                    rate,
                    total: count as f64 * rate,
                    payout_type: RateType::Source,
                }
            })
            .collect()
    }

    /// One row per author ("Unknown" when absent), in order of first appearance
    pub fn payouts_by_author(&self, articles: &[Article], rates: &[PayoutRate]) -> Vec<PayoutData> {
        let groups = count_in_order(articles.iter().map(Article::author_or_unknown));

        let mut first_source: HashMap<&str, &str> = HashMap::new();
        for article in articles {
            first_source
                .entry(article.author_or_unknown())
                .or_insert(article.source.name.as_str());
        }

        groups
            .into_iter()
            .map(|(author, count)| {
                let rate = self.author_chain.resolve(author, rates);
                PayoutData {
                    source: first_source.get(author).copied().unwrap_or_default().to_string(),
                    author: Some(author.to_string()),
                    articles: count,
                    rate,
                    total: count as f64 * rate,
                    payout_type: RateType::Author,
                }
            })
            .collect()
    }

    /// Source rows keyed by source name
    pub fn payouts_by_source(
        &self,
        articles: &[Article],
        rates: &[PayoutRate],
    ) -> HashMap<String, PayoutData> {
        self.calculate_payouts(articles, rates)
            .into_iter()
            .map(|row| (row.source.clone(), row))
            .collect()
    }

    pub fn total_payout(&self, articles: &[Article], rates: &[PayoutRate]) -> f64 {
        self.calculate_payouts(articles, rates)
            .iter()
            .map(|row| row.total)
            .sum()
    }
}

// ============================================
// RATE BOOK
// ============================================

/// Editable set of payout rules, persisted through the offline store
pub struct RateBook {
    store: Arc<dyn OfflineStore>,
}

impl RateBook {
    pub fn new(store: Arc<dyn OfflineStore>) -> Self {
        Self { store }
    }

    /// Rules seeded when nothing has been configured yet
    pub fn defaults() -> Vec<PayoutRate> {
        vec![
            PayoutRate::for_source("The New York Times", 75.0),
            PayoutRate::for_source("The Associated Press", 60.0),
            PayoutRate::for_source(DEFAULT_SOURCE, 35.0),
        ]
    }

    /// Stored rules, seeding the defaults on first use
    pub async fn load(&self) -> Result<Vec<PayoutRate>> {
        let rates = self.store.get_payout_rates().await?;
        if !rates.is_empty() {
            return Ok(rates);
        }

        let defaults = Self::defaults();
        self.store.save_payout_rates(&defaults).await?;
        info!(count = defaults.len(), "Seeded default payout rates");
        Ok(defaults)
    }

    /// Inserts a rule or updates the one with the same (source, author, type)
    pub async fn upsert(&self, rate: PayoutRate) -> Result<PayoutRate> {
        rate.validate()?;
        let mut rates = self.load().await?;

        let saved = match rates.iter_mut().find(|r| {
            r.rate_type == rate.rate_type && r.source == rate.source && r.author == rate.author
        }) {
            Some(existing) => {
                existing.rate = rate.rate;
                existing.updated_at = Utc::now();
                debug!(id = %existing.id, rate = existing.rate, "Updated payout rate");
                existing.clone()
            }
            None => {
                debug!(id = %rate.id, rate = rate.rate, "Added payout rate");
                rates.push(rate.clone());
                rate
            }
        };

        self.store.save_payout_rates(&rates).await?;
        Ok(saved)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut rates = self.load().await?;
        let before = rates.len();
        rates.retain(|r| r.id != id);
        if rates.len() == before {
            return Err(NewsdeskError::ValidationError(format!("no payout rate with id {id}")));
        }
        self.store.save_payout_rates(&rates).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{ArticleSource, ArticleType, Category};
    use crate::store::MemoryStore;

    fn article(source: &str, author: Option<&str>) -> Article {
        Article {
            id: uuid::Uuid::new_v4().to_string(),
            title: "Title".to_string(),
            description: String::new(),
            content: String::new(),
            url: "https://example.com".to_string(),
            image: None,
            published_at: Utc::now(),
            author: author.map(str::to_string),
            source: ArticleSource {
                name: source.to_string(),
                url: String::new(),
            },
            category: Category::General,
            article_type: ArticleType::News,
            read_time: 1,
            tags: Vec::new(),
        }
    }

    fn seeded_rates() -> Vec<PayoutRate> {
        vec![
            PayoutRate::for_source("NYT", 75.0),
            PayoutRate::for_source("Default", 35.0),
        ]
    }

    #[test]
    fn test_source_payouts() {
        let articles = vec![
            article("NYT", None),
            article("BBC", None),
            article("NYT", None),
        ];
        let engine = AggregationEngine::new();
        let rows = engine.calculate_payouts(&articles, &seeded_rates());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "NYT");
        assert_eq!(rows[0].articles, 2);
        assert_eq!(rows[0].rate, 75.0);
        assert_eq!(rows[0].total, 150.0);
        assert_eq!(rows[1].source, "BBC");
        assert_eq!(rows[1].rate, 35.0);
        assert_eq!(rows[1].total, 35.0);
        assert_eq!(engine.total_payout(&articles, &seeded_rates()), 185.0);
    }

    #[test]
    fn test_source_chain_constant_tail() {
        let engine = AggregationEngine::new();
        let rows = engine.calculate_payouts(&[article("BBC", None)], &[]);
        assert_eq!(rows[0].rate, FALLBACK_SOURCE_RATE);
    }

    #[test]
    fn test_author_payouts() {
        let articles = vec![
            article("NYT", Some("Jane")),
            article("BBC", None),
            article("CNN", Some("Jane")),
        ];
        let rates = vec![PayoutRate::for_author("Jane", 50.0)];
        let rows = AggregationEngine::new().payouts_by_author(&articles, &rates);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].author.as_deref(), Some("Jane"));
        assert_eq!(rows[0].source, "NYT");
        assert_eq!(rows[0].total, 100.0);
        assert_eq!(rows[1].author.as_deref(), Some("Unknown"));
        assert_eq!(rows[1].rate, FALLBACK_AUTHOR_RATE);
    }

    #[test]
    fn test_author_rules_do_not_apply_to_sources() {
        let rates = vec![PayoutRate::for_author("BBC", 99.0)];
        let rows = AggregationEngine::new().calculate_payouts(&[article("BBC", None)], &rates);
        assert_eq!(rows[0].rate, FALLBACK_SOURCE_RATE);
    }

    #[test]
    fn test_totals_add_up() {
        let articles: Vec<Article> = ["A", "B", "A", "C", "B", "A"]
            .iter()
            .map(|s| article(s, None))
            .collect();
        let engine = AggregationEngine::new();
        let rows = engine.calculate_payouts(&articles, &seeded_rates());
        let counted: usize = rows.iter().map(|r| r.articles).sum();
        assert_eq!(counted, articles.len());
        for row in &rows {
            assert_eq!(row.total, row.articles as f64 * row.rate);
        }

        let by_source = engine.payouts_by_source(&articles, &seeded_rates());
        assert_eq!(by_source["A"].articles, 3);
    }

    #[test]
    fn test_empty_input() {
        let engine = AggregationEngine::new();
        assert!(engine.calculate_payouts(&[], &seeded_rates()).is_empty());
        assert_eq!(engine.total_payout(&[], &seeded_rates()), 0.0);
    }

    #[tokio::test]
    async fn test_rate_book_upsert_and_delete() {
        let book = RateBook::new(Arc::new(MemoryStore::new()));

        let seeded = book.load().await.unwrap();
        assert_eq!(seeded.len(), 3);

        let updated = book
            .upsert(PayoutRate::for_source("The New York Times", 80.0))
            .await
            .unwrap();
        let rates = book.load().await.unwrap();
        assert_eq!(rates.len(), 3);
        let nyt = rates
            .iter()
            .find(|r| r.source.as_deref() == Some("The New York Times"))
            .unwrap();
        assert_eq!(nyt.rate, 80.0);
        assert_eq!(nyt.id, updated.id);

        let added = book.upsert(PayoutRate::for_author("Jane", 20.0)).await.unwrap();
        assert_eq!(book.load().await.unwrap().len(), 4);

        book.delete(&added.id).await.unwrap();
        assert_eq!(book.load().await.unwrap().len(), 3);
        assert!(book.delete("missing").await.is_err());
        assert!(book.upsert(PayoutRate::for_source("BBC", -5.0)).await.is_err());
    }
}
