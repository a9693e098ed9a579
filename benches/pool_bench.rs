//! Benchmarks for the worker pool and timer scheduler.
//!
//! Benchmarks cover:
//! - Task submission and completion throughput
//! - Result handle round trips
//! - Timer insertion and due-timer dispatch
//! - SyncMap state transitions

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus_timer_pool::config::{PoolConfig, SchedulerConfig};
use prometheus_timer_pool::core::{RepeatState, TimerScheduler, WorkerPool};
use prometheus_timer_pool::{CountDownLatch, SyncMap};

// ============================================================================
// Helper Functions
// ============================================================================

fn started_pool(core: usize, max: usize) -> WorkerPool {
    let pool = WorkerPool::new(
        PoolConfig::new()
            .with_core_threads(core)
            .with_max_threads(max)
            .with_max_queue_size(0)
            .with_idle_timeout(Duration::from_secs(5)),
    );
    pool.start().unwrap();
    pool
}

fn started_scheduler(workers: usize) -> TimerScheduler {
    let scheduler = TimerScheduler::with_config(SchedulerConfig {
        pool: PoolConfig::new()
            .with_core_threads(workers)
            .with_max_threads(workers)
            .with_max_queue_size(0)
            .with_idle_timeout(Duration::from_secs(5)),
    });
    scheduler.start().unwrap();
    scheduler
}

// ============================================================================
// Pool Benchmarks
// ============================================================================

fn bench_pool_execute_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_execute_throughput");

    for workers in [1, 4, 8] {
        let pool = started_pool(workers, workers);
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                let done = Arc::new(CountDownLatch::new(1_000));
                for i in 0..1_000_u64 {
                    let done = Arc::clone(&done);
                    pool.execute(move || {
                        black_box(i);
                        done.count_down();
                    })
                    .unwrap();
                }
                done.wait();
            });
        });
        pool.shutdown();
    }
    group.finish();
}

fn bench_pool_run_round_trip(c: &mut Criterion) {
    let pool = started_pool(2, 2);
    c.bench_function("pool_run_round_trip", |b| {
        b.iter(|| {
            let handle = pool.run(|| black_box(21_u64) * 2).unwrap();
            black_box(handle.wait().unwrap());
        });
    });
    pool.shutdown();
}

fn bench_pool_elastic_burst(c: &mut Criterion) {
    let pool = started_pool(2, 16);
    c.bench_function("pool_elastic_burst", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..64_u64)
                .map(|i| {
                    pool.run(move || {
                        std::thread::sleep(Duration::from_micros(50));
                        i
                    })
                    .unwrap()
                })
                .collect();
            for handle in handles {
                black_box(handle.wait().unwrap());
            }
        });
    });
    pool.shutdown();
}

// ============================================================================
// Timer Benchmarks
// ============================================================================

fn bench_timer_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_insert");

    for size in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let scheduler = TimerScheduler::new();
                let base = Instant::now() + Duration::from_secs(3_600);
                for i in 0..size {
                    scheduler
                        .add_at_time(base + Duration::from_micros(i * 7 % 1_000), || {})
                        .unwrap();
                }
                black_box(scheduler.pending_count());
            });
        });
    }
    group.finish();
}

fn bench_timer_dispatch_due(c: &mut Criterion) {
    let scheduler = started_scheduler(4);
    c.bench_function("timer_dispatch_due_500", |b| {
        b.iter(|| {
            let done = Arc::new(CountDownLatch::new(500));
            let now = Instant::now();
            for _ in 0..500 {
                let done = Arc::clone(&done);
                scheduler.add_at_time(now, move || done.count_down()).unwrap();
            }
            done.wait();
        });
    });
    scheduler.stop();
}

// ============================================================================
// SyncMap Benchmarks
// ============================================================================

fn bench_sync_map_repeat_states(c: &mut Criterion) {
    c.bench_function("sync_map_insert_replace_remove", |b| {
        let map = SyncMap::new();
        b.iter(|| {
            for id in 0..1_000_u64 {
                map.insert(id, RepeatState::Running);
            }
            for id in 0..1_000_u64 {
                black_box(map.replace(&id, RepeatState::Cancelled));
            }
            for id in 0..1_000_u64 {
                black_box(map.remove(&id));
            }
        });
    });
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    pool_benches,
    bench_pool_execute_throughput,
    bench_pool_run_round_trip,
    bench_pool_elastic_burst
);

criterion_group!(timer_benches, bench_timer_insert, bench_timer_dispatch_due);

criterion_group!(map_benches, bench_sync_map_repeat_states);

criterion_main!(pool_benches, timer_benches, map_benches);
