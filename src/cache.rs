//! Fetch Cache and Daily Quota
//!
//! Responses are cached per [`CacheKey`] with a freshness window. Entries are
//! never evicted: a stale entry is still the best degraded answer we have.
//!
//! The quota counts remote calls per UTC calendar day. [`FetchCache::try_acquire`]
//! is the only gate a remote call passes through, so the roll-over, the check
//! and the increment happen under one lock. [`QuotaUsage`] is the counter's
//! persisted form, so a later process continues the same day's count.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::schemas::{FilterOptions, NewsResponse};

pub const SEARCH_ENDPOINT: &str = "search";
pub const HEADLINES_ENDPOINT: &str = "top-headlines";

/// Canonical cache key: endpoint plus form-urlencoded, key-sorted params.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from arbitrary pairs. Keys are sorted and blank values
    /// dropped, so neither insertion order nor empty fields change the key.
    pub fn from_pairs<'a, I>(endpoint: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut pairs: Vec<(&str, &str)> = pairs
            .into_iter()
            .map(|(k, v)| (k, v.trim()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        pairs.sort();

        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Self(format!("{endpoint}?{query}"))
    }

    pub fn for_search(filters: &FilterOptions) -> Self {
        let pairs = filters.normalized_pairs();
        Self::from_pairs(
            SEARCH_ENDPOINT,
            pairs.iter().map(|(k, v)| (*k, v.as_str())),
        )
    }

    pub fn for_headlines() -> Self {
        Self::from_pairs(HEADLINES_ENDPOINT, std::iter::empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: NewsResponse,
    pub stored_at: DateTime<Utc>,
}

/// Day and count as saved between processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub day: NaiveDate,
    pub used: u32,
}

/// Remote calls made on one calendar day
#[derive(Debug, Clone)]
pub struct QuotaCounter {
    day: NaiveDate,
    request_count: u32,
    daily_limit: u32,
}

impl QuotaCounter {
    pub fn new(today: NaiveDate, daily_limit: u32) -> Self {
        Self {
            day: today,
            request_count: 0,
            daily_limit,
        }
    }

    /// Counter that has already spent `used` units today
    pub fn with_used(today: NaiveDate, daily_limit: u32, used: u32) -> Self {
        Self {
            day: today,
            request_count: used.min(daily_limit),
            daily_limit,
        }
    }

    /// Continues saved usage if it is from today, otherwise starts at zero
    pub fn from_usage(saved: Option<QuotaUsage>, today: NaiveDate, daily_limit: u32) -> Self {
        match saved {
            Some(usage) if usage.day == today => Self::with_used(today, daily_limit, usage.used),
            _ => Self::new(today, daily_limit),
        }
    }

    pub fn usage(&self) -> QuotaUsage {
        QuotaUsage {
            day: self.day,
            used: self.request_count,
        }
    }

    /// Resets the count when the day has changed
    pub fn roll(&mut self, today: NaiveDate) {
        if today != self.day {
            debug!(previous = %self.day, today = %today, "Quota day rolled over");
            self.day = today;
            self.request_count = 0;
        }
    }

    pub fn can_request(&mut self, today: NaiveDate) -> bool {
        self.roll(today);
        self.request_count < self.daily_limit
    }

    pub fn try_acquire(&mut self, today: NaiveDate) -> bool {
        if !self.can_request(today) {
            return false;
        }
        self.request_count += 1;
        true
    }

    pub fn release(&mut self, today: NaiveDate) {
        self.roll(today);
        self.request_count = self.request_count.saturating_sub(1);
    }

    pub fn used(&self) -> u32 {
        self.request_count
    }

    pub fn remaining(&mut self, today: NaiveDate) -> u32 {
        self.roll(today);
        self.daily_limit - self.request_count
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub freshness: Duration,
    pub daily_limit: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::hours(1),
            daily_limit: 90,
        }
    }
}

/// Snapshot for status reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub fresh_entries: usize,
    pub requests_used: u32,
    pub requests_remaining: u32,
    pub daily_limit: u32,
    pub freshness_secs: i64,
}

pub struct FetchCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    quota: Mutex<QuotaCounter>,
}

impl FetchCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let quota = QuotaCounter::new(clock.today(), config.daily_limit);
        info!(
            daily_limit = config.daily_limit,
            freshness_secs = config.freshness.num_seconds(),
            "Fetch cache initialized"
        );
        Self {
            config,
            clock,
            entries: RwLock::new(HashMap::new()),
            quota: Mutex::new(quota),
        }
    }

    /// Starts from a counter that has already been partly spent
    pub fn with_quota(config: CacheConfig, clock: Arc<dyn Clock>, quota: QuotaCounter) -> Self {
        let cache = Self::new(config, clock);
        *cache.quota.lock() = quota;
        cache
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    pub fn put(&self, key: CacheKey, response: NewsResponse) {
        let entry = CacheEntry {
            response,
            stored_at: self.clock.now(),
        };
        debug!(key = %key, articles = entry.response.articles.len(), "Cached response");
        self.entries.write().insert(key, entry);
    }

    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.clock.now() - entry.stored_at < self.config.freshness
    }

    pub fn can_make_request(&self) -> bool {
        self.quota.lock().can_request(self.clock.today())
    }

    /// Claims one unit of today's quota, or reports exhaustion
    pub fn try_acquire(&self) -> bool {
        let acquired = self.quota.lock().try_acquire(self.clock.today());
        if !acquired {
            warn!(daily_limit = self.config.daily_limit, "Daily request quota exhausted");
        }
        acquired
    }

    /// Returns a unit the upstream refused to serve
    pub fn release(&self) {
        self.quota.lock().release(self.clock.today());
    }

    pub fn requests_used(&self) -> u32 {
        let mut quota = self.quota.lock();
        quota.roll(self.clock.today());
        quota.used()
    }

    /// Current day and count, rolled to today
    pub fn quota_usage(&self) -> QuotaUsage {
        let mut quota = self.quota.lock();
        quota.roll(self.clock.today());
        quota.usage()
    }

    pub fn remaining_requests(&self) -> u32 {
        self.quota.lock().remaining(self.clock.today())
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let (entries, fresh_entries) = {
            let entries = self.entries.read();
            let fresh = entries
                .values()
                .filter(|e| now - e.stored_at < self.config.freshness)
                .count();
            (entries.len(), fresh)
        };

        let mut quota = self.quota.lock();
        let remaining = quota.remaining(self.clock.today());

        CacheStats {
            entries,
            fresh_entries,
            requests_used: quota.used(),
            requests_remaining: remaining,
            daily_limit: quota.daily_limit(),
            freshness_secs: self.config.freshness.num_seconds(),
        }
    }

    /// Drops all entries; the quota is untouched
    pub fn clear(&self) {
        self.entries.write().clear();
        info!("Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
