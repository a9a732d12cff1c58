use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicI64, Ordering},
    },
    thread::scope,
    time::Instant,
};
use wuid::{H28L36, H32L32, Layout, Lease, Wuid, WuidBuilder};

// Number of IDs generated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 4096;

fn loaded<L: Layout>(builder: WuidBuilder<L>) -> Wuid<L> {
    let high = Arc::new(AtomicI64::new(0));
    let generator = builder.build().unwrap();
    generator
        .load_with(move || Ok(Lease::new(high.fetch_add(1, Ordering::Relaxed) + 1)))
        .unwrap();
    generator
}

/// Benchmarks the hot path on a single thread. A fresh generator per
/// iteration keeps the low segment far from any renewal threshold.
fn bench_generator<L: Layout>(
    c: &mut Criterion,
    group_name: &str,
    generator_factory: impl Fn() -> Wuid<L>,
) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter_custom(|iters| {
            let mut elapsed = core::time::Duration::ZERO;
            for _ in 0..iters {
                let generator = generator_factory();
                let start = Instant::now();
                for _ in 0..TOTAL_IDS {
                    black_box(generator.try_next().unwrap());
                }
                elapsed += start.elapsed();
            }
            elapsed
        });
    });

    group.finish();
}

/// Benchmarks contended access to one shared generator.
fn bench_generator_threaded<L: Layout>(
    c: &mut Criterion,
    group_name: &str,
    generator_factory: impl Fn() -> Wuid<L>,
) {
    let mut group = c.benchmark_group(group_name);
    for thread_count in [1, 2, 4, 8] {
        let total_ids = TOTAL_IDS * thread_count;
        group.throughput(Throughput::Elements(total_ids as u64));

        group.bench_function(
            format!("elems/{total_ids}/threads/{thread_count}"),
            |b| {
                b.iter_custom(|iters| {
                    let mut elapsed = core::time::Duration::ZERO;
                    for _ in 0..iters {
                        let generator = generator_factory();
                        let barrier = Barrier::new(thread_count + 1);
                        let start = scope(|s| {
                            for _ in 0..thread_count {
                                s.spawn(|| {
                                    barrier.wait();
                                    for _ in 0..TOTAL_IDS {
                                        black_box(generator.try_next().unwrap());
                                    }
                                });
                            }
                            barrier.wait();
                            Instant::now()
                        });
                        elapsed += start.elapsed();
                    }
                    elapsed
                });
            },
        );
    }
    group.finish();
}

fn benchmark_plain(c: &mut Criterion) {
    bench_generator::<H28L36>(c, "wuid/h28l36", || loaded(Wuid::builder("bench")));
    bench_generator::<H32L32>(c, "wuid/h32l32", || loaded(WuidBuilder::new("bench")));
}

fn benchmark_transforms(c: &mut Criterion) {
    bench_generator::<H28L36>(c, "wuid/h28l36/obfuscated", || {
        loaded(Wuid::builder("bench").obfuscation(42))
    });
    bench_generator::<H28L36>(c, "wuid/h28l36/step_floor", || {
        loaded(Wuid::builder("bench").step(16, 10))
    });
}

fn benchmark_threaded(c: &mut Criterion) {
    bench_generator_threaded::<H28L36>(c, "wuid/h28l36/threaded", || {
        loaded(Wuid::builder("bench"))
    });
}

criterion_group!(
    benches,
    benchmark_plain,
    benchmark_transforms,
    benchmark_threaded
);
criterion_main!(benches);
