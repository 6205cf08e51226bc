//! Stopping a monitor must not wait for an in-flight slow check: the
//! in-flight check's context is cancelled promptly, `stop` returns inside
//! its own bounded context, and no further ticks fire afterward.

use healthguard::config::RunConfigBuilder;
use healthguard::context::BoundedContext;
use healthguard::monitor::Monitor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn stop_returns_promptly_while_a_check_is_blocked() {
    let tick_count = Arc::new(AtomicUsize::new(0));
    let tick_count_for_check = tick_count.clone();

    let check: healthguard::middleware::HealthCheckFn = Arc::new(move |ctx: BoundedContext| {
        let tick_count = tick_count_for_check.clone();
        Box::pin(async move {
            tick_count.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => Ok(()),
                _ = ctx.done() => Err("cancelled".to_string()),
            }
        })
    });

    let cfg = RunConfigBuilder::new()
        .name("blocker")
        .interval_check(Duration::from_millis(20))
        .check_timeout(Duration::from_secs(5))
        .build();
    let monitor = Monitor::new(check, cfg);

    let start_ctx = BoundedContext::with_timeout(Duration::from_secs(5));
    monitor.start(&start_ctx).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stop_ctx = BoundedContext::with_timeout(Duration::from_secs(2));
    let stopped_at = std::time::Instant::now();
    monitor.stop(&stop_ctx).await.unwrap();

    assert!(
        stopped_at.elapsed() < Duration::from_millis(500),
        "stop should not wait for the full 1s check to finish"
    );
    assert!(!monitor.is_running());

    let count_after_stop = tick_count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        tick_count.load(Ordering::SeqCst),
        count_after_stop,
        "no further ticks fire once stopped"
    );
}

#[tokio::test]
async fn restart_short_circuits_and_leaves_monitor_running() {
    let check: healthguard::middleware::HealthCheckFn = Arc::new(|_ctx| Box::pin(async { Ok(()) }));
    let cfg = RunConfigBuilder::new()
        .name("svc")
        .interval_check(Duration::from_millis(20))
        .build();
    let monitor = Monitor::new(check, cfg);
    let ctx = BoundedContext::with_timeout(Duration::from_secs(5));

    monitor.start(&ctx).await.unwrap();
    monitor.restart(&ctx).await.unwrap();
    assert!(monitor.is_running());
    monitor.stop(&ctx).await.unwrap();
}
