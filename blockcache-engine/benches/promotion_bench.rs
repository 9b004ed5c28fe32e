//! Promotion Benchmarks - Always vs NHit
//!
//! Measures the per-miss admission cost on the hot path, including the
//! occurrence table under eviction pressure and under contention.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use blockcache_engine::{EngineConfig, PromotionPolicy, PromotionPolicyType, Request};

fn policy(kind: PromotionPolicyType, capacity: usize) -> PromotionPolicy {
    let mut config = EngineConfig::default();
    config.promotion.policy = kind;
    config.promotion.nhit.table_capacity = Some(capacity);
    PromotionPolicy::init(&config).unwrap()
}

/// Spread line numbers over `span` lines with a multiplicative hash
fn line(i: u64, span: u64) -> u64 {
    i.wrapping_mul(0x9E37_79B9_7F4A_7C15) % span
}

fn bench_should_promote(c: &mut Criterion) {
    let mut group = c.benchmark_group("should_promote");
    group.throughput(Throughput::Elements(1));

    for kind in [PromotionPolicyType::Always, PromotionPolicyType::Nhit] {
        let policy = policy(kind, 65_536);
        let mut i = 0u64;

        group.bench_function(BenchmarkId::new("policy", kind), |b| {
            b.iter(|| {
                i += 1;
                let request = Request::new(0, line(i, 16_384) * 4096, 4096, 0);
                black_box(policy.should_promote(black_box(&request)))
            });
        });

        policy.deinit();
    }

    group.finish();
}

fn bench_nhit_eviction_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("nhit_eviction");

    for capacity in [1_024usize, 16_384, 262_144] {
        let policy = policy(PromotionPolicyType::Nhit, capacity);
        let mut i = 0u64;

        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            b.iter(|| {
                i += 1;
                // Working set much larger than the table keeps it full.
                let request = Request::new(0, line(i, 1 << 24) * 4096, 4096, 0);
                black_box(policy.should_promote(&request))
            });
        });

        policy.deinit();
    }

    group.finish();
}

fn bench_nhit_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("nhit_contention");

    for threads in [1u64, 4, 8] {
        let policy = Arc::new(policy(PromotionPolicyType::Nhit, 65_536));
        group.throughput(Throughput::Elements(threads * 1_000));

        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let policy = Arc::clone(&policy);
                        thread::spawn(move || {
                            for i in 0..1_000u64 {
                                let request =
                                    Request::new(t as u16, line(i, 4_096) * 4096, 4096, 0);
                                black_box(policy.should_promote(&request));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });

        if let Ok(policy) = Arc::try_unwrap(policy) {
            policy.deinit();
        }
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_should_promote,
    bench_nhit_eviction_pressure,
    bench_nhit_contention
);
criterion_main!(benches);
