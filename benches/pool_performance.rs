//! Pool performance benchmarks: registry operations and batch lifecycle
//! calls across a range of pool sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use healthguard::context::BoundedContext;
use healthguard::engine_config::EngineConfig;
use healthguard::last_run::LastRun;
use healthguard::pool::{new_monitor, Pool};
use std::sync::Arc;
use std::time::Duration;

fn always_ok() -> healthguard::middleware::HealthCheckFn {
    Arc::new(|_ctx| Box::pin(async { Ok(()) }))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn fill_pool(rt: &tokio::runtime::Runtime, pool: &Pool, count: usize) {
    let ctx = BoundedContext::with_timeout(Duration::from_secs(5));
    rt.block_on(async {
        for i in 0..count {
            pool.add(&ctx, format!("monitor-{i}"), new_monitor(format!("monitor-{i}"), always_ok()))
                .await
                .unwrap();
        }
    });
}

fn bench_add_and_list(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("pool_add_and_list");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("add", size), &size, |b, &size| {
            b.iter(|| {
                let pool = Pool::new(EngineConfig::default());
                fill_pool(&rt, &pool, size);
                black_box(&pool);
            })
        });

        let pool = Pool::new(EngineConfig::default());
        fill_pool(&rt, &pool, size);
        group.bench_with_input(BenchmarkId::new("list", size), &size, |b, _| {
            b.iter(|| black_box(pool.list()))
        });
    }

    group.finish();
}

fn bench_batch_lifecycle(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("pool_batch_lifecycle");

    for size in [10, 50, 200] {
        group.bench_with_input(BenchmarkId::new("start_then_stop", size), &size, |b, &size| {
            let pool = Pool::new(EngineConfig::default());
            fill_pool(&rt, &pool, size);
            let ctx = BoundedContext::with_timeout(Duration::from_secs(30));
            b.iter(|| {
                rt.block_on(async {
                    pool.start(&ctx, &[]).await.unwrap();
                    pool.stop(&ctx, &[]).await.unwrap();
                });
            })
        });
    }

    group.finish();
}

fn bench_hysteresis_tick(c: &mut Criterion) {
    let cfg = healthguard::config::RunConfigBuilder::new()
        .name("bench")
        .fall_count_warn(3)
        .fall_count_ko(3)
        .rise_count_ko(3)
        .rise_count_warn(3)
        .build();

    c.bench_function("last_run_set_status_tick", |b| {
        let lr = LastRun::new();
        b.iter(|| {
            lr.set_status(None, Duration::from_micros(500), black_box(&cfg));
        })
    });
}

criterion_group!(benches, bench_add_and_list, bench_batch_lifecycle, bench_hysteresis_tick);
criterion_main!(benches);
