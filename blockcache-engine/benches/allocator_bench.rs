use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use blockcache_engine::Allocator;

fn bench_new_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator_new_delete");

    for size in [16usize, 256, 4096] {
        let allocator = Allocator::create(size, format_args!("bench_{}", size)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let item = allocator.new_item().unwrap();
                allocator.delete(black_box(item));
            });
        });

        allocator.destroy();
    }

    group.finish();
}

fn bench_crc32(c: &mut Criterion) {
    let data: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();

    c.bench_function("crc32_64k", |b| {
        b.iter(|| black_box(blockcache_engine::crc32(0, black_box(&data))));
    });
}

criterion_group!(benches, bench_new_delete, bench_crc32);
criterion_main!(benches);
