//! # Pool Benchmarks
//!
//! Performance benchmarks for cookiepool-core operations.
//!
//! Run with: `cargo bench -p cookiepool-core`

use cookiepool_core::{CookiePool, IdentityKey, PoolConfig, derive_fingerprint};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// Open a pool in `dir` holding `size` live records under province "bj".
fn create_filled_pool(dir: &tempfile::TempDir, size: usize) -> CookiePool {
    let pool = CookiePool::open(&PoolConfig::for_database(dir.path().join("bench.db")))
        .expect("open");
    for i in 0..size {
        pool.save(&IdentityKey::new("bj", i.to_string()), "{}", 3600)
            .expect("save");
    }
    pool
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_fingerprint(c: &mut Criterion) {
    c.bench_function("fingerprint", |b| {
        b.iter(|| black_box(derive_fingerprint(&["bj", "123456789618"])))
    });
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("save");
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = create_filled_pool(&dir, 0);

    group.bench_function("insert", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            black_box(pool.save(&IdentityKey::new("gd", i.to_string()), "{}", 3600))
        });
    });

    let key = IdentityKey::new("gd", "hot");
    group.bench_function("overwrite", |b| {
        b.iter(|| black_box(pool.save(&key, "{\"_ga\":\"GA1\"}", 3600)));
    });

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for size in [100, 1000, 10000].iter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = create_filled_pool(&dir, *size);
        let key = IdentityKey::new("bj", "");

        group.bench_with_input(BenchmarkId::new("random_one", size), size, |b, _| {
            b.iter(|| black_box(pool.query(&key, 1, true)));
        });

        let exact = IdentityKey::new("bj", (size / 2).to_string());
        group.bench_with_input(BenchmarkId::new("exact", size), size, |b, _| {
            b.iter(|| black_box(pool.query(&exact, 1, true)));
        });
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = tempfile::tempdir().expect("tempdir");
            let pool = create_filled_pool(&dir, 0);
            b.iter(|| {
                for i in 0..size {
                    let _ = pool.save(&IdentityKey::new("sh", i.to_string()), "{}", -1);
                }
                black_box(pool.sweep_expired())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_save, bench_query, bench_sweep);
criterion_main!(benches);
