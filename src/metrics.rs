//! Prometheus Metrics for the news gateway
//!
//! Metrics include:
//! - cache lookups by outcome (hit, stale, miss)
//! - remote API calls by endpoint and outcome
//! - responses by status (success, cached, offline, fallback)
//! - quota units spent today
//! - remote call latency

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramOpts,
    HistogramVec, IntCounterVec, IntGauge, Encoder, TextEncoder,
};
use tracing::error;

use crate::schemas::ResponseStatus;

// ============================================
// METRIC DEFINITIONS
// ============================================

pub const LOOKUP_HIT: &str = "hit";
pub const LOOKUP_STALE: &str = "stale";
pub const LOOKUP_MISS: &str = "miss";

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_RATE_LIMITED: &str = "rate_limited";
pub const OUTCOME_ERROR: &str = "error";
pub const OUTCOME_QUOTA_EXHAUSTED: &str = "quota_exhausted";

static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsdesk_cache_lookups_total",
        "Cache lookups by outcome",
        &["outcome"]
    )
    .expect("Failed to create cache_lookups metric")
});

static REMOTE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsdesk_remote_calls_total",
        "Remote API calls by endpoint and outcome",
        &["endpoint", "outcome"]
    )
    .expect("Failed to create remote_calls metric")
});

static REMOTE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];
    register_histogram_vec!(
        HistogramOpts::new(
            "newsdesk_remote_latency_seconds",
            "Latency of remote API calls in seconds"
        )
        .buckets(buckets),
        &["endpoint"]
    )
    .expect("Failed to create remote_latency metric")
});

static RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "newsdesk_responses_total",
        "Gateway responses by status",
        &["status"]
    )
    .expect("Failed to create responses metric")
});

static QUOTA_USED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "newsdesk_quota_used",
        "Remote requests spent against today's quota"
    )
    .expect("Failed to create quota_used metric")
});

// ============================================
// METRICS API
// ============================================

pub fn record_cache_lookup(outcome: &str) {
    CACHE_LOOKUPS.with_label_values(&[outcome]).inc();
}

pub fn record_remote_call(endpoint: &str, outcome: &str) {
    REMOTE_CALLS.with_label_values(&[endpoint, outcome]).inc();
}

pub fn record_remote_latency(endpoint: &str, latency_secs: f64) {
    REMOTE_LATENCY.with_label_values(&[endpoint]).observe(latency_secs);
}

pub fn record_response(status: ResponseStatus) {
    RESPONSES.with_label_values(&[status.as_str()]).inc();
}

pub fn set_quota_used(used: u32) {
    QUOTA_USED.set(i64::from(used));
}

// ============================================
// METRICS COLLECTION
// ============================================

/// Collects all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Measures a remote call and records it when dropped
pub struct RemoteTimer {
    endpoint: &'static str,
    start: std::time::Instant,
}

impl RemoteTimer {
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for RemoteTimer {
    fn drop(&mut self) {
        record_remote_latency(self.endpoint, self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        record_cache_lookup(LOOKUP_MISS);
        record_remote_call("search", OUTCOME_SUCCESS);
        record_response(ResponseStatus::Cached);
        set_quota_used(3);

        let metrics = gather_metrics();
        assert!(metrics.contains("newsdesk_cache_lookups_total"));
        assert!(metrics.contains("newsdesk_remote_calls_total"));
        assert!(metrics.contains("newsdesk_responses_total"));
        assert!(metrics.contains("newsdesk_quota_used"));
    }

    #[test]
    fn test_remote_timer() {
        {
            let _timer = RemoteTimer::new("top-headlines");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let metrics = gather_metrics();
        assert!(metrics.contains("newsdesk_remote_latency_seconds"));
    }
}
