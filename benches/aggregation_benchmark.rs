//! Aggregation Benchmarks
//!
//! Measures enrichment, payout aggregation and analytics over article batches.
//! Run with: cargo bench

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use newsdesk::analytics::AnalyticsReport;
use newsdesk::cache::CacheKey;
use newsdesk::client::{GNewsArticle, GNewsSource};
use newsdesk::enrich::{extract_tags, ArticleEnricher};
use newsdesk::payout::{AggregationEngine, RateBook};
use newsdesk::schemas::{Article, FilterOptions, PayoutRate};

const SOURCES: &[&str] = &["The New York Times", "BBC", "Reuters", "The Associated Press", "CNN"];

fn raw_batch(size: usize) -> Vec<GNewsArticle> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..size)
        .map(|i| GNewsArticle {
            title: format!("Market update {i}: software stocks rally on earnings"),
            description: Some("Investors weigh economy data and company guidance".to_string()),
            content: Some("word ".repeat(150 + i % 400)),
            url: format!("https://example.com/{i}"),
            image: None,
            published_at: base + Duration::hours(i as i64),
            source: GNewsSource {
                name: SOURCES[i % SOURCES.len()].to_string(),
                url: None,
            },
        })
        .collect()
}

fn enriched_batch(size: usize) -> Vec<Article> {
    ArticleEnricher::new().enrich_all(raw_batch(size), "gnews", Utc::now())
}

fn rates() -> Vec<PayoutRate> {
    let mut rates = RateBook::defaults();
    rates.push(PayoutRate::for_source("BBC", 40.0));
    rates.push(PayoutRate::for_author("Reuters", 55.0));
    rates
}

/// Benchmark enrichment throughput
fn bench_enrichment(c: &mut Criterion) {
    let mut group = c.benchmark_group("enrichment");

    for size in [50, 500].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(format!("enrich_{}", size), size, |b, &size| {
            let enricher = ArticleEnricher::new();
            b.iter_batched(
                || raw_batch(size),
                |raw| black_box(enricher.enrich_all(raw, "gnews", Utc::now())),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.bench_function("extract_tags", |b| {
        let text = "Rust compiler update: the compiler gets faster, rust users cheer the release";
        b.iter(|| black_box(extract_tags(black_box(text))))
    });

    group.finish();
}

/// Benchmark payout aggregation with different batch sizes
fn bench_payouts(c: &mut Criterion) {
    let mut group = c.benchmark_group("payouts");
    let engine = AggregationEngine::new();
    let rates = rates();

    for size in [100, 1_000, 10_000].iter() {
        let articles = enriched_batch(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(format!("by_source_{}", size), &articles, |b, articles| {
            b.iter(|| black_box(engine.calculate_payouts(articles, &rates)))
        });
        group.bench_with_input(format!("by_author_{}", size), &articles, |b, articles| {
            b.iter(|| black_box(engine.payouts_by_author(articles, &rates)))
        });
    }

    group.finish();
}

/// Benchmark the full analytics report
fn bench_analytics(c: &mut Criterion) {
    let articles = enriched_batch(1_000);
    let rates = rates();
    let engine = AggregationEngine::new();
    let today = Utc::now().date_naive();

    c.bench_function("analytics_report_1000", |b| {
        b.iter(|| black_box(AnalyticsReport::build(&articles, &rates, &engine, today)))
    });
}

/// Benchmark cache key derivation
fn bench_cache_key(c: &mut Criterion) {
    let filters = FilterOptions::new()
        .query("artificial intelligence")
        .source("BBC")
        .author("Jane Doe")
        .date_range("2024-01-01", "2024-01-31");

    c.bench_function("cache_key_search", |b| {
        b.iter(|| black_box(CacheKey::for_search(black_box(&filters))))
    });
}

criterion_group!(
    benches,
    bench_enrichment,
    bench_payouts,
    bench_analytics,
    bench_cache_key,
);

criterion_main!(benches);
