//! Throughput Benchmark for wafstate
//!
//! Measures the in-memory persistence engine and `setvar` evaluation
//! under request-like workloads.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use wafstate::actions::{self, RuleInfo};
use wafstate::collection::CollectionName;
use wafstate::storage::{MemoryEngine, PersistentEngine};
use wafstate::waf::{Waf, WafConfig};

/// Benchmark field writes
fn bench_set(c: &mut Criterion) {
    let engine = MemoryEngine::new();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_new_instance", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("10.0.{}.{}", (i >> 8) & 0xff, i & 0xff);
            engine.set("IP", &key, "country", "NL").unwrap();
            i += 1;
        });
    });

    group.bench_function("set_existing_instance", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let field = format!("field_{}", i % 32);
            engine.set("SESSION", "abc", &field, "value").unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark field reads
fn bench_get(c: &mut Criterion) {
    let engine = MemoryEngine::new();

    // Pre-populate with data
    for i in 0..10_000 {
        let key = format!("session:{}", i);
        engine.set("SESSION", &key, "hits", &i.to_string()).unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("session:{}", i % 10_000);
            black_box(engine.get("SESSION", &key, "hits").unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get("SESSION", &key, "hits").unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark delta updates
fn bench_sum(c: &mut Criterion) {
    let engine = MemoryEngine::new();

    let mut group = c.benchmark_group("sum");
    group.throughput(Throughput::Elements(1));

    // Single counter (high contention)
    group.bench_function("single_counter", |b| {
        b.iter(|| {
            engine.sum("GLOBAL", "global", "requests", 1).unwrap();
        });
    });

    // Multiple counters (low contention)
    group.bench_function("multiple_counters", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("10.0.0.{}", i % 1000);
            engine.sum("IP", &key, "hits", 1).unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent delta updates on one counter
fn bench_concurrent_sum(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_same_counter", |b| {
        b.iter(|| {
            let engine = Arc::new(MemoryEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for _ in 0..10_000 {
                            engine.sum("SESSION", "abc", "counter", 1).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.get("SESSION", "abc", "counter").unwrap());
        });
    });

    group.finish();
}

/// Benchmark setvar evaluation against both collection variants
fn bench_setvar(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let config = WafConfig::new().with_engine_provider(MemoryEngine::provider(Default::default()));
    let waf = Waf::new(config).unwrap();

    let tx_delta = actions::get("setvar", "TX.anomaly_score=+%{tx.critical}").unwrap();
    let session_delta = actions::get("setvar", "SESSION.hits=+1").unwrap();
    let rule = RuleInfo::new(942100);

    let mut group = c.benchmark_group("setvar");
    group.throughput(Throughput::Elements(1));

    group.bench_function("tx_delta_with_macro", |b| {
        let mut tx = waf.new_transaction();
        tx.tx_collection_mut().set_one("critical", "5");
        b.iter(|| {
            tx_delta.evaluate(&rule, &mut tx);
        });
    });

    group.bench_function("session_delta", |b| {
        let mut tx = waf.new_transaction();
        tx.init_collection(CollectionName::Session, "abc").unwrap();
        b.iter(|| {
            session_delta.evaluate(&rule, &mut tx);
        });
    });

    group.bench_function("pooled_transaction", |b| {
        b.iter(|| {
            let mut tx = waf.new_transaction();
            tx.init_collection(CollectionName::Session, "abc").unwrap();
            session_delta.evaluate(&rule, &mut tx);
            tx.close();
        });
    });

    group.finish();
    waf.close_persistent_engine().unwrap();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_sum,
    bench_concurrent_sum,
    bench_setvar,
);

criterion_main!(benches);
