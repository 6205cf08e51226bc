//! The monitor pool: a keyed registry coordinating many [`Monitor`]s,
//! providing batch lifecycle, pool-wide metric collection, and the shell
//! command surface an embedding application exposes to operators.
//!
//! Grounded on the teacher's `StorageManager` (a coordinator struct holding
//! `Arc`s to the things it manages, delegating the real work rather than
//! owning it directly) and `StorageHealthMonitor` (atomic counters classified
//! against configured thresholds, the same shape as a monitor's own status
//! classification here, just one level up).

use crate::config::RunConfig;
use crate::context::BoundedContext;
use crate::diagnostics::{DiagnosticsCollector, LogSink};
use crate::encoding::StatusView;
use crate::engine_config::EngineConfig;
use crate::error::{HealthError, Result};
use crate::metrics::PrometheusSource;
use crate::middleware::HealthCheckFn;
use crate::monitor::Monitor;
use crate::status::Status;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// A keyed collection of monitors sharing no state of their own besides the
/// registry itself, a metrics-registered flag, the optional metrics/log
/// collaborators registered through [`Pool::register_metrics`], and a
/// recent-error diagnostics ring buffer fed by every monitor's failures.
pub struct Pool {
    monitors: DashMap<String, Arc<Monitor>>,
    metrics_registered: AtomicBool,
    prometheus_source: RwLock<Option<Arc<dyn PrometheusSource>>>,
    log_sink: RwLock<Option<Arc<dyn LogSink>>>,
    diagnostics: Arc<DiagnosticsCollector>,
    config: arc_swap::ArcSwap<EngineConfig>,
}

impl Pool {
    pub fn new(config: EngineConfig) -> Self {
        let diagnostics = Arc::new(DiagnosticsCollector::new(config.diagnostics_capacity));
        Self {
            monitors: DashMap::new(),
            metrics_registered: AtomicBool::new(false),
            prometheus_source: RwLock::new(None),
            log_sink: RwLock::new(None),
            diagnostics,
            config: arc_swap::ArcSwap::from_pointee(config),
        }
    }

    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.load_full()
    }

    /// Swaps in a new pool-wide configuration. Does not touch any
    /// already-running monitor's `RunConfig` — those are only ever changed
    /// through `Monitor::set_config`.
    pub fn set_config(&self, config: EngineConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn diagnostics(&self) -> &DiagnosticsCollector {
        &self.diagnostics
    }

    /// Inserts `monitor` under `name`, replacing whatever was registered
    /// there before. If `auto_start_on_add` is set in this pool's
    /// [`EngineConfig`], at least one other monitor is already running, and
    /// `monitor` is not itself running, it is started immediately.
    pub async fn add(&self, ctx: &BoundedContext, name: impl Into<String>, monitor: Monitor) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(HealthError::EmptyName);
        }
        let monitor = Arc::new(monitor);
        let should_start =
            self.config().auto_start_on_add && self.is_running() && !monitor.is_running();
        self.monitors.insert(name, monitor.clone());
        if should_start {
            monitor.start(ctx).await?;
        }
        Ok(())
    }

    /// Upsert semantics identical to [`Pool::add`]; kept as a distinct entry
    /// point because callers reach for "set" when they mean to replace an
    /// existing monitor by construction, and "add" when registering a new
    /// one — the pool does not need to tell those apart.
    pub async fn set(&self, ctx: &BoundedContext, name: impl Into<String>, monitor: Monitor) -> Result<()> {
        self.add(ctx, name, monitor).await
    }

    pub fn get(&self, name: &str) -> Option<Arc<Monitor>> {
        self.monitors.get(name).map(|entry| entry.value().clone())
    }

    /// Removes the monitor registered under `name`, returning it. Its
    /// runner is torn down by `Monitor`'s own `Drop` once the last `Arc`
    /// reference is released; no separate metric-label deregistration step
    /// is needed since metric names live on the monitor itself.
    pub fn delete(&self, name: &str) -> Option<Arc<Monitor>> {
        self.monitors.remove(name).map(|(_, monitor)| monitor)
    }

    pub fn list(&self) -> Vec<String> {
        self.monitors.iter().map(|e| e.key().clone()).collect()
    }

    /// Iterates every registered monitor in unspecified order, stopping
    /// early the first time `f` returns `false`.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<Monitor>) -> bool,
    {
        for entry in self.monitors.iter() {
            if !f(entry.key(), entry.value()) {
                break;
            }
        }
    }

    fn snapshot(&self, names: &[String]) -> Vec<(String, Arc<Monitor>)> {
        if names.is_empty() {
            self.monitors
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect()
        } else {
            names
                .iter()
                .filter_map(|n| self.get(n).map(|m| (n.clone(), m)))
                .collect()
        }
    }

    /// Starts every monitor named in `names` (or all, if empty), continuing
    /// past individual failures and aggregating them into a single
    /// [`HealthError::Batch`]. Never holds the pool's internal map locked
    /// while a monitor's own `start` is in flight.
    pub async fn start(&self, ctx: &BoundedContext, names: &[String]) -> Result<()> {
        self.run_batch(ctx, names, |m, ctx| async move { m.start(ctx).await })
            .await
    }

    pub async fn stop(&self, ctx: &BoundedContext, names: &[String]) -> Result<()> {
        self.run_batch(ctx, names, |m, ctx| async move { m.stop(ctx).await })
            .await
    }

    pub async fn restart(&self, ctx: &BoundedContext, names: &[String]) -> Result<()> {
        self.run_batch(ctx, names, |m, ctx| async move { m.restart(ctx).await })
            .await
    }

    /// Drives `op` over a snapshot of the matching monitors. Generic over
    /// the future `op` returns (rather than boxing it) so each closure can
    /// borrow `ctx` for exactly `run_batch`'s own call, with no need to
    /// coerce to a `'static` trait object.
    async fn run_batch<'c, F, Fut>(&self, ctx: &'c BoundedContext, names: &[String], op: F) -> Result<()>
    where
        F: Fn(Arc<Monitor>, &'c BoundedContext) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let targets = self.snapshot(names);
        let attempted = targets.len();
        let mut failures = Vec::new();

        for (name, monitor) in targets {
            if let Err(err) = op(monitor, ctx).await {
                failures.push((name, Box::new(err)));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HealthError::Batch {
                attempted,
                failures,
            })
        }
    }

    /// True if any registered monitor is currently running.
    pub fn is_running(&self) -> bool {
        self.monitors.iter().any(|e| e.value().is_running())
    }

    /// The longest cumulative uptime among registered monitors — pool
    /// uptime is defined as the max over its children, not a sum.
    pub fn uptime(&self) -> Duration {
        self.monitors
            .iter()
            .map(|e| e.value().last_run().uptime())
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Registers this pool's metrics/log collaborators (spec §4.6:
    /// `RegisterMetrics(promSource, logSink)`), storing whichever of the two
    /// are supplied so [`Pool::trigger_collect_metrics`] can forward samples
    /// and failures to them. Idempotent registration is an error — an
    /// embedding application must `unregister_metrics` before registering
    /// again, matching the source's single-registration guard. Either
    /// collaborator may be omitted (`None`); the core only ever forwards to
    /// whichever is present, never requires both.
    pub fn register_metrics(
        &self,
        prometheus_source: Option<Arc<dyn PrometheusSource>>,
        log_sink: Option<Arc<dyn LogSink>>,
    ) -> Result<()> {
        if self
            .metrics_registered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(HealthError::MetricsAlreadyRegistered);
        }
        *self.prometheus_source.write() = prometheus_source;
        *self.log_sink.write() = log_sink;
        Ok(())
    }

    pub fn unregister_metrics(&self) {
        self.metrics_registered.store(false, Ordering::SeqCst);
        self.prometheus_source.write().take();
        self.log_sink.write().take();
    }

    pub fn metrics_registered(&self) -> bool {
        self.metrics_registered.load(Ordering::SeqCst)
    }

    /// Runs until `ctx` expires or is cancelled, invoking every monitor's
    /// metric collector once per `interval` (spec §4.6), forwarding the
    /// samples produced to the registered `PrometheusSource` (if any), and
    /// recording/forwarding any standing failure to the diagnostics ring
    /// buffer and the registered `LogSink` (if any). A single slow
    /// collector delays only the monitors after it in this sweep, never
    /// callers of the pool.
    pub async fn trigger_collect_metrics(&self, ctx: &BoundedContext, interval: Duration) {
        loop {
            tokio::select! {
                _ = ctx.done() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if ctx.is_expired() {
                return;
            }
            for entry in self.monitors.iter() {
                let monitor = entry.value();
                let samples = monitor.collect_metrics();
                if let Some(source) = self.prometheus_source.read().as_ref() {
                    for sample in &samples {
                        source.observe(sample);
                    }
                }
                if let Some(err) = monitor.last_run().last_error() {
                    error!(monitor = monitor.name(), error = %err, "monitor check failed");
                    self.diagnostics.record(monitor.name(), &err);
                    if let Some(sink) = self.log_sink.read().as_ref() {
                        sink.log(monitor.name(), &err);
                    }
                }
            }
        }
    }

    fn status_view(monitor: &Monitor) -> StatusView {
        let last_run = monitor.last_run();
        StatusView {
            status: last_run.status(),
            name: monitor.name().to_string(),
            info: monitor.info_summary(),
            latency: last_run.latency(),
            uptime: last_run.uptime(),
            downtime: last_run.downtime(),
            message: last_run.last_error().unwrap_or_default(),
        }
    }

    /// Runs the named shell command against `args` (monitor names, or all
    /// when empty), writing human-readable lines to `out`/`err_out`. Unknown
    /// monitor names are silently skipped.
    pub async fn run_shell_command(
        &self,
        ctx: &BoundedContext,
        command: &str,
        args: &[String],
        out: &mut dyn Write,
        err_out: &mut dyn Write,
    ) -> Result<()> {
        match command {
            "list" => {
                for name in self.list() {
                    let _ = writeln!(out, "{name}");
                }
                Ok(())
            }
            "info" => {
                let mut first = true;
                let targets = self.snapshot(args);
                for (name, monitor) in targets {
                    if !first {
                        let _ = writeln!(out);
                    }
                    first = false;
                    let _ = writeln!(out, "{name}");
                    for (key, value) in monitor.info() {
                        let _ = writeln!(out, "{key}: {value}");
                    }
                }
                Ok(())
            }
            "start" => {
                for (name, monitor) in self.snapshot(args) {
                    let _ = writeln!(out, "Starting monitor '{name}'");
                    if let Err(e) = monitor.start(ctx).await {
                        let _ = writeln!(err_out, "{name}: {e}");
                    }
                }
                Ok(())
            }
            "stop" => {
                for (name, monitor) in self.snapshot(args) {
                    let _ = writeln!(out, "Stopping monitor '{name}'");
                    if let Err(e) = monitor.stop(ctx).await {
                        let _ = writeln!(err_out, "{name}: {e}");
                    }
                }
                Ok(())
            }
            "restart" => {
                for (name, monitor) in self.snapshot(args) {
                    let _ = writeln!(out, "Stopping monitor '{name}'");
                    if let Err(e) = monitor.stop(ctx).await {
                        let _ = writeln!(err_out, "{name}: {e}");
                        continue;
                    }
                    let _ = writeln!(out, "Starting monitor '{name}'");
                    if let Err(e) = monitor.start(ctx).await {
                        let _ = writeln!(err_out, "{name}: {e}");
                    }
                }
                Ok(())
            }
            "status" => {
                for (name, monitor) in self.snapshot(args) {
                    let view = Self::status_view(&monitor);
                    if view.status == Status::OK {
                        let _ = writeln!(out, "OK - {name}");
                    } else {
                        let _ = writeln!(err_out, "{} - {name}: {}", view.status, view.message);
                    }
                }
                Ok(())
            }
            other => Err(HealthError::invalid_state(format!(
                "unknown shell command '{other}'"
            ))),
        }
    }
}

/// Convenience constructor matching `Monitor::new` + a default config,
/// useful in tests and simple embeddings that don't build a `RunConfig`
/// themselves.
pub fn new_monitor(name: impl Into<String>, check: HealthCheckFn) -> Monitor {
    let name = name.into();
    Monitor::new(check, RunConfig::default_named(name))
}

impl Drop for Pool {
    fn drop(&mut self) {
        if self.is_running() {
            info!("pool dropped while monitors were still running");
        }
    }
}
