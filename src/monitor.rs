//! A single named health check: configuration, the hysteresis record, and
//! the background runner that ticks it on an interval.
//!
//! Mirrors the storage layer's coordinator-over-backend shape (a struct
//! holding `Arc`s to shared state, delegating lifecycle calls to a
//! background task) but the "backend" here is the user's health check
//! function running through the middleware chain on its own schedule.

use crate::config::RunConfig;
use crate::context::{BoundedContext, CancelToken};
use crate::error::{HealthError, Result};
use crate::last_run::LastRun;
use crate::metrics::{collect_sample, MetricCollector, MetricNames};
use crate::middleware::{self, default_chain, HealthCheckFn};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Opaque key/value metadata passed through with a monitor, exposed
/// verbatim by the pool's `info` shell command. `BTreeMap` rather than
/// `HashMap` so iteration order is stable for the text/shell output below
/// (matches the teacher's `BTreeMap` choice for its own stable-ordered
/// listings, e.g. `storage/archive.rs`'s `service_names`).
pub type InfoMetadata = BTreeMap<String, String>;

/// Bound on how long `start` will wait for the runner to report itself
/// running before giving up with [`HealthError::StartTimeout`].
const START_WAIT_BOUND: Duration = Duration::from_secs(15);
/// Poll interval `start` uses while waiting for the runner to come up.
const START_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct RunnerHandle {
    cancel: CancelToken,
    running: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

/// A named health check with its own schedule, hysteresis state, and
/// optional metrics feed.
pub struct Monitor {
    name: String,
    info: RwLock<InfoMetadata>,
    health_check: RwLock<HealthCheckFn>,
    run_config: Arc<ArcSwap<RunConfig>>,
    last_run: Arc<LastRun>,
    runner: RwLock<Option<RunnerHandle>>,
    metric_names: RwLock<MetricNames>,
    metric_collector: Arc<RwLock<Option<MetricCollector>>>,
}

impl Monitor {
    pub fn new(check: HealthCheckFn, config: RunConfig) -> Self {
        Self {
            name: config.name().to_string(),
            info: RwLock::new(InfoMetadata::new()),
            health_check: RwLock::new(check),
            run_config: Arc::new(ArcSwap::from_pointee(config)),
            last_run: Arc::new(LastRun::new()),
            runner: RwLock::new(None),
            metric_names: RwLock::new(MetricNames::new()),
            metric_collector: Arc::new(RwLock::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The monitor's opaque info metadata bag, snapshotted.
    pub fn info(&self) -> InfoMetadata {
        self.info.read().clone()
    }

    /// Replaces the whole metadata bag.
    pub fn set_info(&self, info: InfoMetadata) {
        *self.info.write() = info;
    }

    /// Sets (or overwrites) a single metadata entry.
    pub fn set_info_entry(&self, key: impl Into<String>, value: impl Into<String>) {
        self.info.write().insert(key.into(), value.into());
    }

    /// A single-line summary of the metadata bag (`key=value` pairs,
    /// comma-separated in key order) for the text/JSON status encodings,
    /// which carry one `<info>` string rather than the full bag.
    pub fn info_summary(&self) -> String {
        self.info
            .read()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn config(&self) -> Arc<RunConfig> {
        self.run_config.load_full()
    }

    pub fn last_run(&self) -> &LastRun {
        &self.last_run
    }

    pub fn is_running(&self) -> bool {
        self.runner
            .read()
            .as_ref()
            .map(|r| r.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Swaps in a new configuration. Takes effect on the runner's next
    /// tick — in-flight ticks keep running against the configuration they
    /// started with.
    pub fn set_config(&self, config: RunConfig) {
        self.run_config.store(Arc::new(config));
    }

    /// Replaces the health check function. Only effective before the next
    /// `Start` — a running monitor keeps dispatching through the chain it
    /// built at `Start` time.
    pub fn set_health_check(&self, check: HealthCheckFn) {
        *self.health_check.write() = check;
    }

    pub fn set_metric_collector(&self, collector: Option<MetricCollector>) {
        *self.metric_collector.write() = collector;
    }

    pub fn metric_names(&self) -> MetricNames {
        self.metric_names.read().clone()
    }

    pub fn set_metric_names(&self, names: MetricNames) {
        *self.metric_names.write() = names;
    }

    /// Unions `names` into the existing registered list in order, skipping
    /// any already present (spec §4.5's `RegisterMetricNamesAppend`).
    pub fn append_metric_names(&self, names: &[&str]) {
        crate::metrics::register_names_append(&mut self.metric_names.write(), names);
    }

    /// Feeds one sample per registered metric name to the registered
    /// collector, if any, and returns every sample produced so a caller
    /// (e.g. the pool, forwarding to its registered
    /// [`crate::metrics::PrometheusSource`]) can also observe them. The
    /// runner's own per-tick loop duplicates this logic inline (it has no
    /// `Arc<Monitor>` to call back into from its spawned task);
    /// [`crate::pool::Pool::trigger_collect_metrics`] calls this directly
    /// out-of-band on its own interval so a collector still fires for
    /// monitors ticking slower than the pool-wide collection interval.
    pub fn collect_metrics(&self) -> Vec<crate::metrics::MetricSample> {
        let collector = self.metric_collector.read();
        self.metric_names
            .read()
            .iter()
            .map(|metric_name| {
                let sample = collect_sample(metric_name, &self.last_run);
                if let Some(collector) = collector.as_ref() {
                    collector(&sample);
                }
                sample
            })
            .collect()
    }

    /// Starts the background runner. If one is already running, it is
    /// stopped first and a fresh one takes its place — starting an
    /// already-started monitor transparently restarts it (spec §4.3, §8).
    /// Blocks until the new runner reports itself up, bounded at 15s polled
    /// every 50ms; exceeding that bound is a [`HealthError::StartTimeout`]
    /// even though the runner keeps coming up in the background.
    ///
    /// `ctx`'s cancellation governs the runner for its entire lifetime, not
    /// just the `start` call: if `ctx` (or its parent) is cancelled while
    /// the runner is still running, the runner stops exactly as if `stop`
    /// had been called (spec §5, "If the parent context of a running
    /// Monitor is cancelled externally, the Monitor transitions to stopped
    /// as if Stop had been called"). `ctx`'s deadline, by contrast, only
    /// bounds this `start` call itself, not the runner's subsequent
    /// lifetime.
    pub async fn start(&self, ctx: &BoundedContext) -> Result<()> {
        {
            let guard = self.runner.read();
            if guard.is_some() {
                drop(guard);
                self.stop(ctx).await?;
            }
        }

        let cancel = CancelToken::new();
        let running = Arc::new(AtomicBool::new(false));

        let layers = default_chain(self.health_check.read().clone());
        let run_config = self.run_config.clone();
        let last_run = self.last_run.clone();
        let metric_names = self.metric_names.read().clone();
        let metric_collector_for_task = self.metric_collector.clone();
        let runner_cancel = cancel.clone();
        let runner_running = running.clone();
        let name = self.name.clone();

        // Link the caller's context to the runner's own cancel token: if
        // the caller's context (or a parent it derives from) is cancelled
        // at any point while the runner is alive, the runner observes it
        // the same way it observes an explicit `stop`. This forwarder
        // exits as soon as either side cancels, so it never outlives the
        // runner it is watching.
        let parent_cancel = ctx.cancel_handle();
        let forward_target = cancel.clone();
        let forward_watch = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent_cancel.cancelled() => forward_target.cancel(),
                _ = forward_watch.cancelled() => {}
            }
        });

        let task = tokio::spawn(async move {
            runner_running.store(true, Ordering::SeqCst);
            let mut sleep_for = run_config.load().interval_check();
            loop {
                tokio::select! {
                    _ = runner_cancel.cancelled() => break,
                    _ = tokio::time::sleep(sleep_for) => {}
                }
                if runner_cancel.is_cancelled() {
                    break;
                }

                let cfg = run_config.load_full();
                let tick_ctx =
                    BoundedContext::with_cancel_and_timeout(runner_cancel.clone(), cfg.check_timeout());
                middleware::run(&layers, &tick_ctx, &cfg, &last_run).await;

                if let Some(collector) = metric_collector_for_task.read().as_ref() {
                    for metric_name in metric_names.iter() {
                        let sample = collect_sample(metric_name, &last_run);
                        collector(&sample);
                    }
                }

                sleep_for = next_interval(&last_run, &cfg);
            }
            // Cleared on every exit path (explicit `stop` or an externally
            // cancelled parent context alike) so `is_running` reflects
            // reality even though `stop` is what usually clears the
            // `runner` slot itself.
            runner_running.store(false, Ordering::SeqCst);
            debug!(monitor = name.as_str(), "runner stopped");
        });

        *self.runner.write() = Some(RunnerHandle {
            cancel,
            running: running.clone(),
            task,
        });

        let deadline = tokio::time::Instant::now() + START_WAIT_BOUND;
        while !running.load(Ordering::SeqCst) {
            if tokio::time::Instant::now() >= deadline {
                return Err(HealthError::StartTimeout {
                    name: self.name.clone(),
                    waited_ms: START_WAIT_BOUND.as_millis() as u64,
                });
            }
            tokio::time::sleep(START_POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// Stops the background runner, if running, waiting for it to exit or
    /// for `ctx` to expire, whichever comes first.
    pub async fn stop(&self, ctx: &BoundedContext) -> Result<()> {
        let handle = self.runner.write().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        handle.cancel.cancel();

        tokio::select! {
            _ = handle.task => Ok(()),
            _ = ctx.done() => Err(HealthError::StopTimeout { name: self.name.clone() }),
        }
    }

    pub async fn restart(&self, ctx: &BoundedContext) -> Result<()> {
        self.stop(ctx).await?;
        self.start(ctx).await
    }

    /// A fresh `Monitor` under `new_name` sharing this monitor's current
    /// configuration, health check, and metric registration, but with its
    /// own unstarted runner and a blank `LastRun`.
    pub fn clone_as(&self, new_name: impl Into<String>) -> Self {
        let new_name = new_name.into();
        let config = RunConfig::normalize(crate::config::RawRunConfig {
            name: new_name.clone(),
            check_timeout: self.config().check_timeout(),
            interval_check: self.config().interval_check(),
            interval_fall: self.config().interval_fall(),
            interval_rise: self.config().interval_rise(),
            fall_count_ko: self.config().fall_count_ko(),
            fall_count_warn: self.config().fall_count_warn(),
            rise_count_ko: self.config().rise_count_ko(),
            rise_count_warn: self.config().rise_count_warn(),
        });
        Monitor {
            name: new_name,
            info: RwLock::new(self.info()),
            health_check: RwLock::new(self.health_check.read().clone()),
            run_config: Arc::new(ArcSwap::from_pointee(config)),
            last_run: Arc::new(LastRun::new()),
            runner: RwLock::new(None),
            metric_names: RwLock::new(self.metric_names()),
            metric_collector: Arc::new(RwLock::new(None)),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(handle) = self.runner.get_mut().take() {
            handle.cancel.cancel();
            handle.task.abort();
            warn!(monitor = self.name.as_str(), "monitor dropped while running");
        }
    }
}

fn next_interval(last_run: &LastRun, cfg: &RunConfig) -> Duration {
    if last_run.is_fall() {
        cfg.interval_fall()
    } else if last_run.is_rise() {
        cfg.interval_rise()
    } else {
        cfg.interval_check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfigBuilder;
    use std::sync::atomic::AtomicUsize;

    fn always_ok() -> HealthCheckFn {
        Arc::new(|_ctx| Box::pin(async { Ok(()) }))
    }

    #[tokio::test]
    async fn start_reports_running_and_stop_tears_it_down() {
        let cfg = RunConfigBuilder::new()
            .name("svc")
            .interval_check(Duration::from_millis(20))
            .build();
        let monitor = Monitor::new(always_ok(), cfg);
        let ctx = BoundedContext::with_timeout(Duration::from_secs(5));

        monitor.start(&ctx).await.unwrap();
        assert!(monitor.is_running());

        // Reaching OK from a fresh KO record takes two ticks (KO->Warn,
        // Warn->OK) at the default threshold of 1 each, so wait for several
        // 20ms ticks rather than assuming a single one suffices.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(monitor.last_run().status(), crate::status::Status::OK);

        monitor.stop(&ctx).await.unwrap();
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn external_cancellation_of_the_start_context_stops_the_runner() {
        let cfg = RunConfigBuilder::new()
            .name("svc")
            .interval_check(Duration::from_millis(15))
            .build();
        let monitor = Monitor::new(always_ok(), cfg);
        let ctx = BoundedContext::with_timeout(Duration::from_secs(30));

        monitor.start(&ctx).await.unwrap();
        assert!(monitor.is_running());

        // No explicit `stop` — cancel the same context handed to `start`,
        // standing in for a parent context being cancelled externally.
        ctx.cancel_handle().cancel();

        tokio::time::timeout(Duration::from_secs(1), async {
            while monitor.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("external cancellation must stop the runner without an explicit stop()");
    }

    #[tokio::test]
    async fn starting_an_already_running_monitor_transparently_restarts_it() {
        let saw_cancellation = Arc::new(AtomicBool::new(false));
        let saw_cancellation_for_check = saw_cancellation.clone();
        let check: HealthCheckFn = Arc::new(move |ctx: BoundedContext| {
            let saw_cancellation = saw_cancellation_for_check.clone();
            Box::pin(async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(500)) => Ok(()),
                    _ = ctx.done() => {
                        saw_cancellation.store(true, Ordering::SeqCst);
                        Err("cancelled".to_string())
                    }
                }
            })
        });

        let cfg = RunConfigBuilder::new()
            .name("svc")
            .interval_check(Duration::from_millis(15))
            .check_timeout(Duration::from_secs(5))
            .build();
        let monitor = Monitor::new(check, cfg);
        let ctx = BoundedContext::with_timeout(Duration::from_secs(5));

        monitor.start(&ctx).await.unwrap();
        // Let the first runner pick up a tick so its check is mid-sleep.
        tokio::time::sleep(Duration::from_millis(40)).await;

        // Starting again must stop the in-flight runner (cancelling its
        // current tick) before spawning a fresh one, not no-op.
        monitor.start(&ctx).await.unwrap();
        assert!(
            saw_cancellation.load(Ordering::SeqCst),
            "restarting an already-running monitor must cancel its in-flight tick"
        );
        assert!(monitor.is_running(), "the new runner must come up after the restart");

        monitor.stop(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let cfg = RunConfigBuilder::new().name("svc").build();
        let monitor = Monitor::new(always_ok(), cfg);
        let ctx = BoundedContext::with_timeout(Duration::from_secs(1));
        monitor.stop(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn metric_collector_receives_a_sample_per_tick() {
        let cfg = RunConfigBuilder::new()
            .name("svc")
            .interval_check(Duration::from_millis(15))
            .build();
        let monitor = Monitor::new(always_ok(), cfg);
        monitor.set_metric_names(crate::metrics::register_names(&["latency"]));
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_collector = count.clone();
        monitor.set_metric_collector(Some(Box::new(move |_sample| {
            count_for_collector.fetch_add(1, Ordering::SeqCst);
        })));

        let ctx = BoundedContext::with_timeout(Duration::from_secs(5));
        monitor.start(&ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(70)).await;
        monitor.stop(&ctx).await.unwrap();

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn clone_as_preserves_config_but_resets_last_run() {
        let cfg = RunConfigBuilder::new().name("svc").build();
        let monitor = Monitor::new(always_ok(), cfg);
        let ctx = BoundedContext::with_timeout(Duration::from_secs(5));
        monitor.start(&ctx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        monitor.stop(&ctx).await.unwrap();

        let clone = monitor.clone_as("svc-2");
        assert_eq!(clone.name(), "svc-2");
        assert_eq!(clone.config().check_timeout(), monitor.config().check_timeout());
        assert_eq!(clone.last_run().status(), crate::status::Status::KO);
        assert!(!clone.is_running());
    }

    #[test]
    fn info_entries_are_summarized_in_key_order() {
        let cfg = RunConfigBuilder::new().name("svc").build();
        let monitor = Monitor::new(always_ok(), cfg);
        assert_eq!(monitor.info_summary(), "");

        monitor.set_info_entry("region", "us-east-1");
        monitor.set_info_entry("tier", "primary");
        assert_eq!(monitor.info_summary(), "region=us-east-1, tier=primary");
        assert_eq!(monitor.info().len(), 2);
    }

    #[test]
    fn append_metric_names_unions_without_duplicating() {
        let cfg = RunConfigBuilder::new().name("svc").build();
        let monitor = Monitor::new(always_ok(), cfg);
        monitor.set_metric_names(crate::metrics::register_names(&["latency"]));
        monitor.append_metric_names(&["latency", "uptime"]);
        assert_eq!(
            monitor.metric_names().as_slice(),
            ["latency".to_string(), "uptime".to_string()]
        );
    }

    #[test]
    fn clone_as_carries_over_info_metadata() {
        let cfg = RunConfigBuilder::new().name("svc").build();
        let monitor = Monitor::new(always_ok(), cfg);
        monitor.set_info_entry("region", "us-east-1");

        let clone = monitor.clone_as("svc-2");
        assert_eq!(clone.info(), monitor.info());
    }
}
