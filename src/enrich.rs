//! Article Enrichment
//!
//! Rule-based classification of raw article text:
//! - category from fixed keyword lists checked in priority order
//! - read time at 200 words per minute
//! - up to five keyword tags by frequency
//!
//! The keyword tables are part of the observable behavior; changing them
//! silently changes how articles are categorized.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::client::GNewsArticle;
use crate::schemas::{Article, ArticleSource, ArticleType, Category};

const WORDS_PER_MINUTE: usize = 200;
const MAX_TAGS: usize = 5;
const MIN_TAG_LEN: usize = 4;

/// Keyword sets in priority order; the first category with a hit wins.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Technology,
        &["tech", "ai", "software", "computer", "digital", "internet"],
    ),
    (
        Category::Business,
        &["business", "economy", "finance", "market", "stock", "company"],
    ),
    (
        Category::Sports,
        &["sport", "football", "basketball", "soccer", "game", "player"],
    ),
    (
        Category::Health,
        &["health", "medical", "doctor", "hospital", "medicine", "covid"],
    ),
    (
        Category::Politics,
        &["politics", "government", "election", "president", "congress"],
    ),
    (
        Category::Entertainment,
        &["entertainment", "movie", "music", "celebrity", "film"],
    ),
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Classifies text into a category. Keywords match as substrings.
pub fn categorize(text: &str) -> Category {
    let lower = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::General)
}

/// Estimated reading time in whole minutes, never less than one.
pub fn estimate_read_time(content: &str) -> u32 {
    let words = content.split_whitespace().count();
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

/// Most frequent non-stop-words longer than three characters.
///
/// Ties keep first-occurrence order so output is deterministic.
pub fn extract_tags(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut order: Vec<(&str, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for word in lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| w.len() >= MIN_TAG_LEN && !STOP_WORDS.contains(w))
    {
        match index.get(word) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(word, order.len());
                order.push((word, 1));
            }
        }
    }

    // stable sort keeps first-occurrence order among equal counts
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(MAX_TAGS)
        .map(|(word, _)| word.to_string())
        .collect()
}

/// Turns raw upstream articles into enriched [`Article`]s
#[derive(Debug, Clone, Default)]
pub struct ArticleEnricher;

impl ArticleEnricher {
    pub fn new() -> Self {
        Self
    }

    /// Enriches one raw article under the given id
    pub fn enrich(&self, raw: GNewsArticle, id: String) -> Article {
        let description = raw.description.unwrap_or_default();
        let content = raw.content.unwrap_or_default();
        let summary_text = format!("{} {}", raw.title, description);

        let read_time = if content.trim().is_empty() {
            estimate_read_time(&description)
        } else {
            estimate_read_time(&content)
        };

        let source = ArticleSource {
            name: raw.source.name,
            url: raw.source.url.unwrap_or_default(),
        };
        let author = if source.name.trim().is_empty() {
            "Unknown".to_string()
        } else {
            source.name.clone()
        };

        Article {
            id,
            category: categorize(&summary_text),
            tags: extract_tags(&summary_text),
            title: raw.title,
            description,
            content,
            url: raw.url,
            image: raw.image.filter(|i| !i.is_empty()),
            published_at: raw.published_at,
            author: Some(author),
            source,
            article_type: ArticleType::News,
            read_time,
        }
    }

    /// Enriches a batch, assigning ids `<prefix>_<millis>_<index>`
    pub fn enrich_all(
        &self,
        raw: Vec<GNewsArticle>,
        prefix: &str,
        fetched_at: DateTime<Utc>,
    ) -> Vec<Article> {
        let stamp = fetched_at.timestamp_millis();
        let articles: Vec<Article> = raw
            .into_iter()
            .enumerate()
            .map(|(i, a)| self.enrich(a, format!("{prefix}_{stamp}_{i}")))
            .collect();

        debug!(prefix, count = articles.len(), "Enriched articles");
        articles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_priority() {
        assert_eq!(categorize("New software release for laptops"), Category::Technology);
        assert_eq!(categorize("Stock market closes higher"), Category::Business);
        assert_eq!(categorize("Football club signs new striker"), Category::Sports);
        assert_eq!(categorize("Hospital capacity under pressure"), Category::Health);
        assert_eq!(categorize("Election results announced"), Category::Politics);
        assert_eq!(categorize("Film festival opens"), Category::Entertainment);
        assert_eq!(categorize("Weather update"), Category::General);
        // technology outranks business when both match
        assert_eq!(categorize("Tech company earnings"), Category::Technology);
    }

    #[test]
    fn test_categorize_is_substring_based() {
        // "ai" inside "Spain" counts as a technology keyword
        assert_eq!(categorize("Floods in Spain"), Category::Technology);
    }

    #[test]
    fn test_read_time() {
        assert_eq!(estimate_read_time(""), 1);
        assert_eq!(estimate_read_time("   "), 1);
        assert_eq!(estimate_read_time(&"word ".repeat(400)), 2);
        assert_eq!(estimate_read_time(&"word ".repeat(401)), 3);
        assert_eq!(estimate_read_time(&"word ".repeat(199)), 1);
    }

    #[test]
    fn test_extract_tags() {
        let text = "Rust compiler update: the compiler gets faster, rust users cheer. Compiler!";
        let tags = extract_tags(text);
        assert_eq!(tags, vec!["compiler", "rust", "update", "gets", "faster"]);
    }

    #[test]
    fn test_extract_tags_filters_short_and_stop_words() {
        let tags = extract_tags("With the cat and a dog, with them all: with");
        assert_eq!(tags, vec!["them"]);

        for tag in extract_tags("The quick brown fox jumps over the lazy dog with ease") {
            assert!(tag.len() > 3);
            assert!(!STOP_WORDS.contains(&tag.as_str()));
        }
    }

    #[test]
    fn test_extract_tags_idempotent() {
        let text = "Markets rally as markets digest earnings; earnings beat markets";
        assert_eq!(extract_tags(text), extract_tags(text));
        assert_eq!(extract_tags(text)[0], "markets");
    }
}
