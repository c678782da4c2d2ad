//! # Cache Benchmarks
//!
//! Key derivation and cache lookups on the read hot path.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crm_gateway::caching::{CacheConfig, CacheKey, CacheManager};
use crm_gateway::core::types::{Ordering, Paging, UpstreamRequest};
use crm_gateway::EntityRequest;

fn benchmark_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_key");

    let by_id = EntityRequest::by_id("Product", "5f1c2a9e");
    group.bench_function("typed_by_id", |b| {
        b.iter(|| CacheKey::for_entity_request(black_box(&by_id)))
    });

    let listing = EntityRequest::list_all("Account")
        .with_paging(Paging::new(200, 400))
        .with_ordering(Ordering::desc("createdAt"))
        .with_select(["id", "name", "industry"]);
    group.bench_function("typed_list_all", |b| {
        b.iter(|| CacheKey::for_entity_request(black_box(&listing)))
    });

    let raw = UpstreamRequest::get("/Account")
        .with_query("where[0][type]", "equals")
        .with_query("where[0][attribute]", "industry")
        .with_query("where[0][value]", "Retail")
        .with_query("maxSize", "50");
    group.bench_function("raw_field_filter", |b| {
        b.iter(|| CacheKey::for_request(black_box(&raw)))
    });

    // Long parameter sections are hashed
    let mut wide = UpstreamRequest::get("/Account");
    for i in 0..20 {
        wide = wide.with_query(format!("where[{}][value]", i), format!("value-{}", i));
    }
    group.bench_function("raw_hashed_params", |b| {
        b.iter(|| CacheKey::for_request(black_box(&wide)))
    });

    group.finish();
}

fn benchmark_cache_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_lookup");

    for entries in [100usize, 10_000] {
        let cache = rt.block_on(async {
            let cache = CacheManager::new(CacheConfig::default());
            for i in 0..entries {
                let key = CacheKey::by_id("Product", &i.to_string());
                cache.set(&key, Arc::new(json!({"id": i})), None).await;
            }
            cache
        });

        let hit = CacheKey::by_id("Product", "42");
        group.bench_with_input(BenchmarkId::new("hit", entries), &entries, |b, _| {
            b.iter(|| rt.block_on(cache.get(black_box(&hit))))
        });

        let miss = CacheKey::by_id("Product", "absent");
        group.bench_with_input(BenchmarkId::new("miss", entries), &entries, |b, _| {
            b.iter(|| rt.block_on(cache.get(black_box(&miss))))
        });
    }

    let cache = rt.block_on(async { CacheManager::new(CacheConfig::default()) });
    let payload = Arc::new(json!({"list": [], "total": 0}));
    group.bench_function("set", |b| {
        b.iter(|| {
            rt.block_on(cache.set(
                black_box(&CacheKey::list_all("Account")),
                Arc::clone(&payload),
                None,
            ))
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_key_derivation, benchmark_cache_lookup);
criterion_main!(benches);
