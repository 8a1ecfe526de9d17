//! News Gateway
//!
//! Every article request goes through [`NewsGateway`], which decides in this
//! order:
//!
//! 1. network marked offline: serve stored articles, never touch the network
//! 2. fresh cache entry: serve it
//! 3. quota exhausted: degraded resolution
//! 4. one remote call: enrich, cache, persist; on failure degraded resolution
//!
//! Degraded resolution tries the stale cache entry, then stored articles
//! matching the filters, then the static fallback record. The caller always
//! gets a [`NewsResponse`]; failures show up in its `status` and `error`.
//!
//! Quota usage is written to the store's preferences after every change, and
//! [`NewsGateway::open`] picks it up again in the next process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{
    CacheConfig, CacheKey, CacheStats, FetchCache, QuotaCounter, QuotaUsage, HEADLINES_ENDPOINT,
    SEARCH_ENDPOINT,
};
use crate::client::{GNewsResponse, NewsApi};
use crate::clock::Clock;
use crate::enrich::ArticleEnricher;
use crate::error::{NewsdeskError, Result};
use crate::metrics;
use crate::schemas::{Article, FilterOptions, NewsResponse, ResponseStatus};
use crate::store::OfflineStore;

const SEARCH_ID_PREFIX: &str = "gnews";
const HEADLINES_ID_PREFIX: &str = "headlines";

/// Preference key holding the persisted [`QuotaUsage`]
pub const QUOTA_PREFERENCE: &str = "quotaUsage";

/// Connectivity flag observed by the gateway
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            info!(online, "Network status changed");
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

#[derive(Clone, Copy)]
enum NewsRequest<'a> {
    Search(&'a FilterOptions),
    Headlines,
}

impl NewsRequest<'_> {
    fn endpoint(&self) -> &'static str {
        match self {
            NewsRequest::Search(_) => SEARCH_ENDPOINT,
            NewsRequest::Headlines => HEADLINES_ENDPOINT,
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self {
            NewsRequest::Search(_) => SEARCH_ID_PREFIX,
            NewsRequest::Headlines => HEADLINES_ID_PREFIX,
        }
    }

    fn cache_key(&self) -> CacheKey {
        match self {
            NewsRequest::Search(filters) => CacheKey::for_search(filters),
            NewsRequest::Headlines => CacheKey::for_headlines(),
        }
    }

    fn filters(&self) -> Option<&FilterOptions> {
        match self {
            NewsRequest::Search(filters) => Some(filters),
            NewsRequest::Headlines => None,
        }
    }
}

pub struct NewsGateway {
    api: Arc<dyn NewsApi>,
    cache: FetchCache,
    enricher: ArticleEnricher,
    store: Arc<dyn OfflineStore>,
    network: Arc<NetworkStatus>,
    clock: Arc<dyn Clock>,
}

impl NewsGateway {
    pub fn new(
        api: Arc<dyn NewsApi>,
        store: Arc<dyn OfflineStore>,
        cache_config: CacheConfig,
        network: Arc<NetworkStatus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_cache(api, store, FetchCache::new(cache_config, clock.clone()), network, clock)
    }

    /// Like [`NewsGateway::new`], but continues today's quota usage saved in `store`
    pub async fn open(
        api: Arc<dyn NewsApi>,
        store: Arc<dyn OfflineStore>,
        cache_config: CacheConfig,
        network: Arc<NetworkStatus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let saved = load_quota_usage(store.as_ref()).await;
        let quota = QuotaCounter::from_usage(saved, clock.today(), cache_config.daily_limit);
        info!(used = quota.used(), daily_limit = quota.daily_limit(), "Quota usage restored");
        metrics::set_quota_used(quota.used());

        let cache = FetchCache::with_quota(cache_config, clock.clone(), quota);
        Self::with_cache(api, store, cache, network, clock)
    }

    /// Uses a prepared cache (e.g. with a partly spent quota)
    pub fn with_cache(
        api: Arc<dyn NewsApi>,
        store: Arc<dyn OfflineStore>,
        cache: FetchCache,
        network: Arc<NetworkStatus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            cache,
            enricher: ArticleEnricher::new(),
            store,
            network,
            clock,
        }
    }

    pub async fn search(&self, filters: &FilterOptions) -> NewsResponse {
        self.resolve(NewsRequest::Search(filters)).await
    }

    pub async fn headlines(&self) -> NewsResponse {
        self.resolve(NewsRequest::Headlines).await
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn remaining_requests(&self) -> u32 {
        self.cache.remaining_requests()
    }

    pub fn network(&self) -> &Arc<NetworkStatus> {
        &self.network
    }

    async fn resolve(&self, request: NewsRequest<'_>) -> NewsResponse {
        let response = self.resolve_inner(request).await;
        metrics::record_response(response.status);
        response
    }

    async fn resolve_inner(&self, request: NewsRequest<'_>) -> NewsResponse {
        let endpoint = request.endpoint();

        if !self.network.is_online() {
            debug!(endpoint, "Network offline, serving stored articles");
            return self.offline_response(request).await;
        }

        let key = request.cache_key();
        match self.cache.get(&key) {
            Some(entry) if self.cache.is_fresh(&entry) => {
                metrics::record_cache_lookup(metrics::LOOKUP_HIT);
                debug!(key = %key, "Serving fresh cache entry");
                return entry.response;
            }
            Some(_) => metrics::record_cache_lookup(metrics::LOOKUP_STALE),
            None => metrics::record_cache_lookup(metrics::LOOKUP_MISS),
        }

        if !self.cache.try_acquire() {
            metrics::record_remote_call(endpoint, metrics::OUTCOME_QUOTA_EXHAUSTED);
            return self
                .degraded(request, &key, "Daily request limit reached".to_string())
                .await;
        }
        self.save_quota().await;

        let result = {
            let _timer = metrics::RemoteTimer::new(endpoint);
            match request {
                NewsRequest::Search(filters) => self.api.search(filters).await,
                NewsRequest::Headlines => self.api.top_headlines().await,
            }
        };

        match result {
            Ok(raw) => {
                metrics::record_remote_call(endpoint, metrics::OUTCOME_SUCCESS);
                let response = self.build_response(request, raw);
                self.cache.put(key, response.clone());
                self.persist(&response.articles).await;
                info!(
                    endpoint,
                    articles = response.articles.len(),
                    remaining = self.cache.remaining_requests(),
                    "Fetched live articles"
                );
                response
            }
            Err(NewsdeskError::UpstreamRateLimited) => {
                metrics::record_remote_call(endpoint, metrics::OUTCOME_RATE_LIMITED);
                // upstream refused the call; it should not count against our quota
                self.cache.release();
                self.save_quota().await;
                self.degraded(request, &key, "Upstream rate limit exceeded (HTTP 429)".to_string())
                    .await
            }
            Err(e) => {
                metrics::record_remote_call(endpoint, metrics::OUTCOME_ERROR);
                warn!(endpoint, error = %e, "Remote call failed");
                self.degraded(request, &key, format!("Failed to fetch news: {e}"))
                    .await
            }
        }
    }

    fn build_response(&self, request: NewsRequest<'_>, raw: GNewsResponse) -> NewsResponse {
        let mut articles = self
            .enricher
            .enrich_all(raw.articles, request.id_prefix(), self.clock.now());

        let mut total = raw.total_articles;
        if let Some(filters) = request.filters() {
            if filters.has_local_refinements() {
                articles.retain(|a| filters.matches_attributes(a));
                total = articles.len() as u64;
            }
            filters.apply_order(&mut articles);
        }

        NewsResponse::new(total, articles, ResponseStatus::Success)
    }

    async fn save_quota(&self) {
        let usage = self.cache.quota_usage();
        metrics::set_quota_used(usage.used);

        let value = match serde_json::to_value(usage) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to encode quota usage");
                return;
            }
        };
        if let Err(e) = self.store.save_preference(QUOTA_PREFERENCE, value).await {
            warn!(error = %e, "Failed to persist quota usage");
        }
    }

    async fn persist(&self, articles: &[Article]) {
        if articles.is_empty() {
            return;
        }
        if let Err(e) = self.store.save_articles(articles).await {
            warn!(error = %e, count = articles.len(), "Failed to persist articles");
        }
    }

    async fn stored_matching(&self, request: NewsRequest<'_>) -> Result<Vec<Article>> {
        let mut articles = self.store.get_articles().await?;
        if let Some(filters) = request.filters() {
            articles.retain(|a| filters.matches(a));
            filters.apply_order(&mut articles);
        }
        Ok(articles)
    }

    async fn stored_or_empty(&self, request: NewsRequest<'_>) -> Vec<Article> {
        match self.stored_matching(request).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(error = %e, "Failed to read stored articles");
                Vec::new()
            }
        }
    }

    async fn degraded(&self, request: NewsRequest<'_>, key: &CacheKey, error: String) -> NewsResponse {
        if let Some(entry) = self.cache.get(key) {
            info!(key = %key, reason = %error, "Serving stale cache entry");
            return entry.response.degraded(ResponseStatus::Cached, error);
        }

        let stored = self.stored_or_empty(request).await;
        if !stored.is_empty() {
            info!(count = stored.len(), reason = %error, "Serving stored articles");
            return NewsResponse::new(stored.len() as u64, stored, ResponseStatus::Cached)
                .degraded(ResponseStatus::Cached, error);
        }

        warn!(reason = %error, "No cached or stored articles, serving fallback");
        NewsResponse::fallback(self.clock.now()).degraded(ResponseStatus::Fallback, error)
    }

    async fn offline_response(&self, request: NewsRequest<'_>) -> NewsResponse {
        let stored = self.stored_or_empty(request).await;
        if stored.is_empty() {
            return NewsResponse::fallback(self.clock.now())
                .degraded(ResponseStatus::Fallback, "Network unavailable and no stored articles");
        }
        NewsResponse::new(stored.len() as u64, stored, ResponseStatus::Offline)
            .degraded(ResponseStatus::Offline, "Network unavailable, serving stored articles")
    }
}

async fn load_quota_usage(store: &dyn OfflineStore) -> Option<QuotaUsage> {
    match store.get_preference(QUOTA_PREFERENCE).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(usage) => Some(usage),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable quota usage");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Failed to read quota usage");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{GNewsArticle, GNewsSource};
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Scripted upstream: pops one canned result per call
    struct ScriptedApi {
        calls: AtomicUsize,
        results: Mutex<Vec<Result<GNewsResponse>>>,
    }

    impl ScriptedApi {
        fn new(mut results: Vec<Result<GNewsResponse>>) -> Self {
            results.reverse();
            Self {
                calls: AtomicUsize::new(0),
                results: Mutex::new(results),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> Result<GNewsResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .pop()
                .unwrap_or_else(|| Err(NewsdeskError::ApiError {
                    code: "500".to_string(),
                    message: "script exhausted".to_string(),
                }))
        }
    }

    #[async_trait]
    impl NewsApi for ScriptedApi {
        async fn search(&self, _filters: &FilterOptions) -> Result<GNewsResponse> {
            self.next()
        }

        async fn top_headlines(&self) -> Result<GNewsResponse> {
            self.next()
        }
    }

    fn raw(title: &str, source: &str) -> GNewsArticle {
        GNewsArticle {
            title: title.to_string(),
            description: Some(format!("{title} description")),
            content: Some("Some content here".to_string()),
            url: format!("https://example.com/{}", title.replace(' ', "-")),
            image: None,
            published_at: Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap(),
            source: GNewsSource {
                name: source.to_string(),
                url: None,
            },
        }
    }

    fn page(articles: Vec<GNewsArticle>) -> Result<GNewsResponse> {
        Ok(GNewsResponse {
            total_articles: 100,
            articles,
        })
    }

    struct Harness {
        api: Arc<ScriptedApi>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        gateway: NewsGateway,
    }

    fn harness(results: Vec<Result<GNewsResponse>>, daily_limit: u32) -> Harness {
        let api = Arc::new(ScriptedApi::new(results));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new());
        let gateway = NewsGateway::new(
            api.clone(),
            store.clone(),
            CacheConfig {
                freshness: Duration::hours(1),
                daily_limit,
            },
            Arc::new(NetworkStatus::default()),
            clock.clone(),
        );
        Harness {
            api,
            clock,
            store,
            gateway,
        }
    }

    #[tokio::test]
    async fn test_success_enriches_and_caches() {
        let h = harness(vec![page(vec![raw("Football final", "BBC"), raw("Budget vote", "CNN")])], 90);

        let response = h.gateway.search(&FilterOptions::new().query("news")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.total_articles, 100);
        assert_eq!(response.articles.len(), 2);
        assert!(response.articles[0].id.starts_with("gnews_"));
        assert!(response.articles[1].id.ends_with("_1"));
        assert_eq!(response.articles[0].author.as_deref(), Some("BBC"));

        // second call is a fresh hit
        let again = h.gateway.search(&FilterOptions::new().query("news")).await;
        assert_eq!(again, response);
        assert_eq!(h.api.calls(), 1);
        assert_eq!(h.gateway.remaining_requests(), 89);

        // persisted for offline use
        assert_eq!(h.store.get_articles().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refetch_keeps_one_stored_copy() {
        let h = harness(
            vec![
                page(vec![raw("Same story", "NYT")]),
                page(vec![raw("Same story", "NYT")]),
            ],
            90,
        );

        h.gateway.headlines().await;
        h.clock.advance(Duration::hours(2));
        let refetched = h.gateway.headlines().await;
        assert_eq!(refetched.status, ResponseStatus::Success);
        assert_eq!(h.api.calls(), 2);

        let stored = h.store.get_articles().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, refetched.articles[0].id);
    }

    #[tokio::test]
    async fn test_quota_usage_saved_to_store() {
        let h = harness(
            vec![
                page(vec![raw("First", "BBC")]),
                Err(NewsdeskError::UpstreamRateLimited),
            ],
            90,
        );

        h.gateway.headlines().await;
        let saved = h.store.get_preference(QUOTA_PREFERENCE).await.unwrap().unwrap();
        assert_eq!(saved["used"], 1);
        assert_eq!(saved["day"], "2024-01-15");

        // the refunded unit is saved too
        h.gateway.search(&FilterOptions::new().query("other")).await;
        let saved = h.store.get_preference(QUOTA_PREFERENCE).await.unwrap().unwrap();
        assert_eq!(saved["used"], 1);
    }

    #[tokio::test]
    async fn test_open_continues_saved_usage() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        ));
        store
            .save_preference(QUOTA_PREFERENCE, serde_json::json!({"day": "2024-01-15", "used": 90}))
            .await
            .unwrap();

        let api = Arc::new(ScriptedApi::new(vec![page(vec![raw("Never served", "BBC")])]));
        let gateway = NewsGateway::open(
            api.clone(),
            store.clone(),
            CacheConfig::default(),
            Arc::new(NetworkStatus::default()),
            clock.clone(),
        )
        .await;

        assert_eq!(gateway.remaining_requests(), 0);
        let response = gateway.headlines().await;
        assert_eq!(response.status, ResponseStatus::Fallback);
        assert_eq!(api.calls(), 0);

        // a garbled value is ignored
        store
            .save_preference(QUOTA_PREFERENCE, serde_json::json!("garbage"))
            .await
            .unwrap();
        let reopened = NewsGateway::open(
            api,
            store,
            CacheConfig::default(),
            Arc::new(NetworkStatus::default()),
            clock,
        )
        .await;
        assert_eq!(reopened.remaining_requests(), 90);
    }

    #[tokio::test]
    async fn test_headline_ids() {
        let h = harness(vec![page(vec![raw("Top story", "AP")])], 90);
        let response = h.gateway.headlines().await;
        assert!(response.articles[0].id.starts_with("headlines_"));
    }

    #[tokio::test]
    async fn test_local_refinements() {
        let h = harness(
            vec![page(vec![raw("One", "BBC"), raw("Two", "CNN"), raw("Three", "bbc")])],
            90,
        );

        let response = h.gateway.search(&FilterOptions::new().source("BBC")).await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.articles.len(), 2);
        assert_eq!(response.total_articles, 2);
    }

    #[tokio::test]
    async fn test_quota_exhausted_without_cache_serves_fallback() {
        let h = harness(vec![], 0);

        let response = h.gateway.headlines().await;
        assert_eq!(response.status, ResponseStatus::Fallback);
        assert_eq!(response.articles[0].id, "fallback_1");
        assert!(response.error.is_some());
        assert_eq!(h.api.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_entry_served_when_quota_exhausted() {
        let h = harness(vec![page(vec![raw("Old news", "BBC")])], 1);
        let first = h.gateway.headlines().await;
        assert_eq!(first.status, ResponseStatus::Success);

        h.clock.advance(Duration::hours(2));
        let second = h.gateway.headlines().await;
        assert_eq!(second.status, ResponseStatus::Cached);
        assert_eq!(second.articles, first.articles);
        assert!(second.error.unwrap().contains("limit"));
        assert_eq!(h.api.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_refunds_quota() {
        let h = harness(vec![Err(NewsdeskError::UpstreamRateLimited)], 90);

        let response = h.gateway.headlines().await;
        assert_eq!(response.status, ResponseStatus::Fallback);
        assert_eq!(h.gateway.remaining_requests(), 90);
    }

    #[tokio::test]
    async fn test_transport_error_uses_stored_articles() {
        let h = harness(
            vec![
                page(vec![raw("Stored one", "BBC")]),
                Err(NewsdeskError::ApiError {
                    code: "503".to_string(),
                    message: "down".to_string(),
                }),
            ],
            90,
        );
        h.gateway.headlines().await;
        h.gateway.clear_cache();

        let response = h.gateway.search(&FilterOptions::new().source("BBC")).await;
        assert_eq!(response.status, ResponseStatus::Cached);
        assert_eq!(response.articles.len(), 1);
        assert!(response.error.unwrap().contains("503"));
        // the failed call still spent a unit
        assert_eq!(h.gateway.remaining_requests(), 88);
    }

    #[tokio::test]
    async fn test_offline_never_calls_network() {
        let h = harness(vec![page(vec![raw("Anything", "BBC")])], 90);
        h.gateway.network().set_online(false);

        let empty = h.gateway.headlines().await;
        assert_eq!(empty.status, ResponseStatus::Fallback);

        h.store
            .save_articles(&ArticleEnricher::new().enrich_all(
                vec![raw("Saved", "AP")],
                "gnews",
                h.clock.now(),
            ))
            .await
            .unwrap();
        let stored = h.gateway.headlines().await;
        assert_eq!(stored.status, ResponseStatus::Offline);
        assert_eq!(stored.articles[0].title, "Saved");

        assert_eq!(h.api.calls(), 0);
        assert_eq!(h.gateway.remaining_requests(), 90);
    }
}
