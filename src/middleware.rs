//! The ordered wrapper chain a monitor dispatches each tick through.
//!
//! The innermost layer is the user's health check. Everything else wraps
//! around it: latency timing is added right outside the check (timing
//! only the user's function, nothing else), then uptime/downtime/rise-time
//! /fall-time accounting wrap around that, each reading `LastRun`'s status
//! before and after the inner call to decide what it contributed this
//! tick. Only the latency layer is mandatory; the others are installed by
//! default but a caller assembling a custom [`Chain`] may omit them.

use crate::context::BoundedContext;
use crate::error::{CHECK_TIMEOUT_ERROR, NO_HEALTHCHECK_ERROR};
use crate::last_run::LastRun;
use crate::config::RunConfig;
use crate::status::Status;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The terminal result of a dispatch through the chain: whether the check
/// succeeded, and how long the dispatch took (filled in by the latency
/// layer as it unwinds).
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub err: Option<String>,
    pub elapsed: Duration,
}

/// A boxed async health check function: `ctx -> Result<(), message>`.
pub type HealthCheckFn =
    Arc<dyn Fn(BoundedContext) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// One layer of the chain. Implementations call `chain.next().await` to
/// dispatch inward, inspecting or acting on the result as it bubbles back
/// out. The innermost layer (the health check itself) does not call
/// `next()` — it is the base case.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome;
}

/// Mutable dispatch state for one tick. Borrowed by every layer in turn;
/// `next()` advances the cursor and hands control to the next-innermost
/// layer.
pub struct Chain<'a> {
    layers: &'a [Arc<dyn Middleware>],
    pos: usize,
    ctx: &'a BoundedContext,
    run_config: &'a RunConfig,
    last_run: &'a LastRun,
}

impl<'a> Chain<'a> {
    pub fn ctx(&self) -> &BoundedContext {
        self.ctx
    }

    pub fn config(&self) -> &RunConfig {
        self.run_config
    }

    pub fn last_run(&self) -> &LastRun {
        self.last_run
    }

    /// Dispatches to the next-innermost layer. Calling this past the
    /// innermost layer is a bug in a `Middleware` impl (the base case
    /// never calls it); it returns a fallback outcome rather than
    /// panicking so a misbehaving custom layer degrades instead of
    /// crashing the runner.
    pub async fn next(&mut self) -> TickOutcome {
        if self.pos == 0 {
            return TickOutcome {
                err: Some(NO_HEALTHCHECK_ERROR.to_string()),
                elapsed: Duration::ZERO,
            };
        }
        self.pos -= 1;
        let layer = Arc::clone(&self.layers[self.pos]);
        layer.handle(self).await
    }
}

/// Runs one full tick of `layers` against `ctx`/`cfg`/`last_run`. `layers`
/// must have the user's health check at index 0 and every wrapper added
/// after it in the order it should be invoked from the outside in —
/// `default_chain` builds this ordering for you.
pub async fn run(
    layers: &[Arc<dyn Middleware>],
    ctx: &BoundedContext,
    cfg: &RunConfig,
    last_run: &LastRun,
) -> TickOutcome {
    let mut chain = Chain {
        layers,
        pos: layers.len(),
        ctx,
        run_config: cfg,
        last_run,
    };
    chain.next().await
}

/// The innermost layer: invokes the installed health check function.
///
/// Races the check against `chain.ctx().done()` rather than trusting the
/// check to observe its own deadline — spec §5's "the user health check
/// may block; it is bounded by the per-check context" and scenario S4 both
/// require the engine itself to enforce `checkTimeout` against a
/// non-cooperative check, not merely offer it a cancellation signal to poll.
pub struct UserCheckMiddleware {
    pub check: HealthCheckFn,
}

#[async_trait]
impl Middleware for UserCheckMiddleware {
    async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome {
        let fut = (self.check)(chain.ctx.clone());
        let checked = AssertUnwindSafe(fut).catch_unwind();
        let err = tokio::select! {
            result = checked => match result {
                Ok(result) => result.err(),
                Err(payload) => Some(panic_message(&*payload)),
            },
            _ = chain.ctx().done() => Some(CHECK_TIMEOUT_ERROR.to_string()),
        };
        TickOutcome {
            err,
            elapsed: Duration::ZERO,
        }
    }
}

/// Renders a caught health-check panic's payload into a recorded error
/// string (spec §4.3: a panicking check must not kill the runner). Mirrors
/// the default panic hook's handling of the two payload shapes the standard
/// library actually produces (`&str` literals and owned `String`s).
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("health check panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("health check panicked: {message}")
    } else {
        "health check panicked".to_string()
    }
}

/// Times the call to the innermost layer and records both `latency` and
/// the final `LastRun` transition for this tick — the one mandatory layer.
pub struct LatencyMiddleware;

#[async_trait]
impl Middleware for LatencyMiddleware {
    async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome {
        let start = Instant::now();
        let mut outcome = chain.next().await;
        outcome.elapsed = start.elapsed();
        chain
            .last_run()
            .set_status(outcome.err.as_deref(), outcome.elapsed, chain.config());
        outcome
    }
}

/// Accumulates elapsed time into an `uptime` sample when both the pre- and
/// post-call status are `OK`.
pub struct UptimeMiddleware;

#[async_trait]
impl Middleware for UptimeMiddleware {
    async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome {
        let pre = chain.last_run().status();
        let outcome = chain.next().await;
        let post = chain.last_run().status();
        if pre == Status::OK && post == Status::OK {
            chain.last_run().stash_uptime_sample(outcome.elapsed);
        }
        outcome
    }
}

/// Symmetrical to [`UptimeMiddleware`] for `KO`.
pub struct DowntimeMiddleware;

#[async_trait]
impl Middleware for DowntimeMiddleware {
    async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome {
        let pre = chain.last_run().status();
        let outcome = chain.next().await;
        let post = chain.last_run().status();
        if pre == Status::KO && post == Status::KO {
            chain.last_run().stash_downtime_sample(outcome.elapsed);
        }
        outcome
    }
}

/// Stashes a `riseTime` sample when this tick landed on an in-progress
/// recovery (`isRise` set by `LastRun::set_status`).
pub struct RiseTimeMiddleware;

#[async_trait]
impl Middleware for RiseTimeMiddleware {
    async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome {
        let outcome = chain.next().await;
        if chain.last_run().is_rise() {
            chain.last_run().stash_rise_time_sample(outcome.elapsed);
        }
        outcome
    }
}

/// Stashes a `fallTime` sample when this tick landed on an in-progress
/// degradation (`isFall` set by `LastRun::set_status`).
pub struct FallTimeMiddleware;

#[async_trait]
impl Middleware for FallTimeMiddleware {
    async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome {
        let outcome = chain.next().await;
        if chain.last_run().is_fall() {
            chain.last_run().stash_fall_time_sample(outcome.elapsed);
        }
        outcome
    }
}

/// The chain a monitor installs unless a caller overrides it: health check,
/// latency (mandatory), uptime, downtime, rise time, fall time, outermost
/// first.
pub fn default_chain(check: HealthCheckFn) -> Vec<Arc<dyn Middleware>> {
    vec![
        Arc::new(UserCheckMiddleware { check }),
        Arc::new(LatencyMiddleware),
        Arc::new(UptimeMiddleware),
        Arc::new(DowntimeMiddleware),
        Arc::new(RiseTimeMiddleware),
        Arc::new(FallTimeMiddleware),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfigBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn check_ok() -> HealthCheckFn {
        Arc::new(|_ctx| Box::pin(async { Ok(()) }))
    }

    fn check_err(msg: &'static str) -> HealthCheckFn {
        Arc::new(move |_ctx| Box::pin(async move { Err(msg.to_string()) }))
    }

    #[tokio::test]
    async fn successful_tick_produces_latency_and_uptime_samples() {
        let cfg = RunConfigBuilder::new()
            .name("svc")
            .rise_count_ko(1)
            .rise_count_warn(1)
            .build();
        let last_run = LastRun::new();
        let ctx = BoundedContext::with_timeout(Duration::from_secs(1));
        let layers = default_chain(check_ok());

        // tick 1: KO -> Warn, no uptime sample (pre-status was KO, not OK)
        run(&layers, &ctx, &cfg, &last_run).await;
        assert_eq!(last_run.status(), Status::Warn);
        assert_eq!(last_run.collect_up_time(), None);

        // tick 2: Warn -> OK, still no uptime sample (pre-status was Warn)
        run(&layers, &ctx, &cfg, &last_run).await;
        assert_eq!(last_run.status(), Status::OK);
        assert_eq!(last_run.collect_up_time(), None);

        // tick 3: OK -> OK, uptime sample now produced
        run(&layers, &ctx, &cfg, &last_run).await;
        assert_eq!(last_run.status(), Status::OK);
        assert!(last_run.collect_up_time().is_some());
        assert!(last_run.collect_latency().is_some());
    }

    #[tokio::test]
    async fn failing_tick_does_not_emit_uptime_sample() {
        let cfg = RunConfigBuilder::new().name("svc").build();
        let last_run = LastRun::new();
        let ctx = BoundedContext::with_timeout(Duration::from_secs(1));
        let layers = default_chain(check_err("boom"));

        run(&layers, &ctx, &cfg, &last_run).await;
        assert_eq!(last_run.status(), Status::KO);
        assert_eq!(last_run.collect_up_time(), None);
        assert_eq!(last_run.last_error(), Some("boom".to_string()));
    }

    #[tokio::test]
    async fn panicking_check_is_recorded_as_an_error_not_propagated() {
        let cfg = RunConfigBuilder::new().name("svc").build();
        let last_run = LastRun::new();
        let ctx = BoundedContext::with_timeout(Duration::from_secs(1));
        let panics: HealthCheckFn = Arc::new(|_ctx| Box::pin(async { panic!("boom") }));
        let layers = default_chain(panics);

        let outcome = run(&layers, &ctx, &cfg, &last_run).await;

        assert_eq!(outcome.err.as_deref(), Some("health check panicked: boom"));
        assert_eq!(last_run.status(), Status::KO);
        assert_eq!(
            last_run.last_error(),
            Some("health check panicked: boom".to_string())
        );
    }

    #[tokio::test]
    async fn non_cooperative_check_is_bounded_by_the_context_deadline() {
        // Scenario S4: a check that never polls `ctx.done()` and just sleeps
        // past the deadline must still be recorded as a failure, not let to
        // run to completion and count as a success.
        let cfg = RunConfigBuilder::new().name("svc").build();
        let last_run = LastRun::new();
        let ctx = BoundedContext::with_timeout(Duration::from_millis(20));
        let sleeps_past_deadline: HealthCheckFn = Arc::new(|_ctx| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
        });
        let layers = default_chain(sleeps_past_deadline);

        let outcome = run(&layers, &ctx, &cfg, &last_run).await;

        assert!(outcome.err.is_some(), "a non-cooperative check must still be bounded");
        assert_eq!(last_run.status(), Status::KO);
    }

    #[tokio::test]
    async fn chain_invokes_layers_in_order_user_check_innermost() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        struct Tagging(Arc<std::sync::Mutex<Vec<&'static str>>>, &'static str);
        #[async_trait]
        impl Middleware for Tagging {
            async fn handle(&self, chain: &mut Chain<'_>) -> TickOutcome {
                self.0.lock().unwrap().push(self.1);
                let outcome = chain.next().await;
                self.0.lock().unwrap().push(self.1);
                outcome
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_inner = calls.clone();
        let check: HealthCheckFn = Arc::new(move |_ctx| {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let layers: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(UserCheckMiddleware { check }),
            Arc::new(Tagging(order.clone(), "outer")),
        ];
        let cfg = RunConfigBuilder::new().name("svc").build();
        let last_run = LastRun::new();
        let ctx = BoundedContext::with_timeout(Duration::from_secs(1));
        run(&layers, &ctx, &cfg, &last_run).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock().unwrap(), vec!["outer", "outer"]);
    }
}
