//! Offline Fallback Store
//!
//! Keeps the last fetched articles, payout rates and user preferences so the
//! gateway has something to serve when the network or the quota is gone.
//!
//! Articles are keyed by their canonical URL, so refetching a story replaces
//! the stored copy instead of adding another one.
//!
//! [`FileStore`] persists everything to one JSON document under the data
//! directory, written to a temp file first and renamed into place.
//! [`MemoryStore`] keeps the same state in memory only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{NewsdeskError, Result};
use crate::schemas::{Article, PayoutRate};

const STORE_FILE: &str = "store.json";

const TRACKING_PARAMS: &[&str] = &[
    "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content",
    "fbclid", "gclid", "msclkid", "mc_cid", "mc_eid", "_ga", "_gl", "yclid", "twclid",
];

/// Normalized URL: no fragment, no tracking params, remaining params sorted,
/// no trailing slash. `None` when the URL does not parse.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }

    Some(url.to_string())
}

/// Key an article is stored under: its canonical URL, else its id
pub fn article_key(article: &Article) -> String {
    canonicalize_url(&article.url).unwrap_or_else(|| article.id.clone())
}

/// Persistence collaborator used by the gateway and the rate book
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Inserts articles, replacing any stored copy with the same canonical URL
    async fn save_articles(&self, articles: &[Article]) -> Result<()>;

    /// All stored articles, newest first
    async fn get_articles(&self) -> Result<Vec<Article>>;

    /// Stored articles whose source name matches (case-insensitive)
    async fn articles_by_source(&self, source: &str) -> Result<Vec<Article>>;

    /// Stored articles published within `[from, to]`
    async fn articles_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Article>>;

    async fn clear_articles(&self) -> Result<()>;

    /// Replaces the whole rate collection
    async fn save_payout_rates(&self, rates: &[PayoutRate]) -> Result<()>;

    async fn get_payout_rates(&self) -> Result<Vec<PayoutRate>>;

    async fn save_preference(&self, key: &str, value: serde_json::Value) -> Result<()>;

    async fn get_preference(&self, key: &str) -> Result<Option<serde_json::Value>>;
}

/// Serialized store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    #[serde(default)]
    pub articles: BTreeMap<String, Article>,
    #[serde(default)]
    pub payout_rates: BTreeMap<String, PayoutRate>,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
}

impl StoreState {
    fn upsert_articles<'a>(&mut self, articles: impl IntoIterator<Item = &'a Article>) {
        for article in articles {
            self.articles.insert(article_key(article), article.clone());
        }
    }

    /// Re-keys articles loaded from an older file, collapsing duplicates
    fn reindex(&mut self) {
        let loaded = std::mem::take(&mut self.articles);
        let mut by_age: Vec<&Article> = loaded.values().collect();
        by_age.sort_by(|a, b| a.published_at.cmp(&b.published_at));
        self.upsert_articles(by_age);
    }

    fn articles_where(&self, predicate: impl Fn(&Article) -> bool) -> Vec<Article> {
        let mut found: Vec<Article> = self
            .articles
            .values()
            .filter(|a| predicate(*a))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        found
    }

    fn replace_rates(&mut self, rates: &[PayoutRate]) {
        self.payout_rates = rates.iter().map(|r| (r.id.clone(), r.clone())).collect();
    }

    fn rates(&self) -> Vec<PayoutRate> {
        let mut rates: Vec<PayoutRate> = self.payout_rates.values().cloned().collect();
        rates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rates
    }
}

// ============================================
// FILE STORE
// ============================================

pub struct FileStore {
    file_path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileStore {
    /// Opens (or creates) the store under `data_dir`
    pub async fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).await?;
        let file_path = data_dir.join(STORE_FILE);

        let state = if fs::try_exists(&file_path).await? {
            match Self::load_from_file(&file_path).await {
                Ok(mut state) => {
                    state.reindex();
                    info!(
                        path = %file_path.display(),
                        articles = state.articles.len(),
                        rates = state.payout_rates.len(),
                        "Loaded offline store"
                    );
                    state
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load offline store, starting fresh");
                    StoreState::default()
                }
            }
        } else {
            info!(path = %file_path.display(), "No offline store yet, starting fresh");
            StoreState::default()
        };

        Ok(Self {
            file_path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    async fn load_from_file(path: &Path) -> Result<StoreState> {
        let contents = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn save_to_file(&self, state: &StoreState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;

        let temp_path = self.file_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path)
            .await
            .map_err(|e| NewsdeskError::StorageError(format!("rename failed: {e}")))?;

        debug!(path = %self.file_path.display(), "Offline store saved");
        Ok(())
    }

    /// Applies `change` to a copy and swaps it in once it is on disk
    async fn mutate(&self, change: impl FnOnce(&mut StoreState)) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        change(&mut next);
        self.save_to_file(&next).await?;
        *state = next;
        Ok(())
    }
}

#[async_trait]
impl OfflineStore for FileStore {
    async fn save_articles(&self, articles: &[Article]) -> Result<()> {
        self.mutate(|s| s.upsert_articles(articles)).await
    }

    async fn get_articles(&self) -> Result<Vec<Article>> {
        Ok(self.state.lock().await.articles_where(|_| true))
    }

    async fn articles_by_source(&self, source: &str) -> Result<Vec<Article>> {
        Ok(self
            .state
            .lock()
            .await
            .articles_where(|a| a.source.name.eq_ignore_ascii_case(source)))
    }

    async fn articles_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        Ok(self
            .state
            .lock()
            .await
            .articles_where(|a| a.published_at >= from && a.published_at <= to))
    }

    async fn clear_articles(&self) -> Result<()> {
        self.mutate(|s| s.articles.clear()).await
    }

    async fn save_payout_rates(&self, rates: &[PayoutRate]) -> Result<()> {
        self.mutate(|s| s.replace_rates(rates)).await
    }

    async fn get_payout_rates(&self) -> Result<Vec<PayoutRate>> {
        Ok(self.state.lock().await.rates())
    }

    async fn save_preference(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.mutate(|s| {
            s.preferences.insert(key.to_string(), value);
        })
        .await
    }

    async fn get_preference(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.state.lock().await.preferences.get(key).cloned())
    }
}

// ============================================
// MEMORY STORE
// ============================================

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineStore for MemoryStore {
    async fn save_articles(&self, articles: &[Article]) -> Result<()> {
        self.state.lock().await.upsert_articles(articles);
        Ok(())
    }

    async fn get_articles(&self) -> Result<Vec<Article>> {
        Ok(self.state.lock().await.articles_where(|_| true))
    }

    async fn articles_by_source(&self, source: &str) -> Result<Vec<Article>> {
        Ok(self
            .state
            .lock()
            .await
            .articles_where(|a| a.source.name.eq_ignore_ascii_case(source)))
    }

    async fn articles_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        Ok(self
            .state
            .lock()
            .await
            .articles_where(|a| a.published_at >= from && a.published_at <= to))
    }

    async fn clear_articles(&self) -> Result<()> {
        self.state.lock().await.articles.clear();
        Ok(())
    }

    async fn save_payout_rates(&self, rates: &[PayoutRate]) -> Result<()> {
        self.state.lock().await.replace_rates(rates);
        Ok(())
    }

    async fn get_payout_rates(&self) -> Result<Vec<PayoutRate>> {
        Ok(self.state.lock().await.rates())
    }

    async fn save_preference(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.state.lock().await.preferences.insert(key.to_string(), value);
        Ok(())
    }

    async fn get_preference(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.state.lock().await.preferences.get(key).cloned())
    }
}
