//! Metric name registration and the sample-consuming collector contract.
//!
//! No Prometheus/OTEL wire format here — this module only defines how a
//! monitor names the metrics it emits and how a caller-supplied collector
//! callback is invoked with that tick's samples. Shaping those samples into
//! an exposition format is left to the embedding application.

use crate::last_run::LastRun;
use crate::status::Status;
use smallvec::SmallVec;
use std::time::Duration;

/// A small, usually-fixed-size list of metric names attached to a monitor.
/// `SmallVec` avoids a heap allocation for the common case of one or two
/// names per monitor.
pub type MetricNames = SmallVec<[String; 4]>;

/// One observation handed to a [`MetricCollector`]. `value` is `None` for
/// samples that were not produced this tick (e.g. `uptime` on a tick that
/// landed on a failure).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub status: Status,
    pub is_rise: bool,
    pub is_fall: bool,
    pub latency: Option<Duration>,
    pub uptime: Option<Duration>,
    pub downtime: Option<Duration>,
    pub rise_time: Option<Duration>,
    pub fall_time: Option<Duration>,
}

/// A callback invoked once per tick (or once per collection interval, for a
/// pool-wide collector) with the samples produced since the last call.
///
/// Modeled as a boxed `Fn` rather than a trait so a monitor can carry a
/// plain closure without an extra generic parameter threading through
/// `Monitor<C>`.
pub type MetricCollector = Box<dyn Fn(&MetricSample) + Send + Sync>;

/// The attach point for whatever turns samples into Prometheus (or any
/// other) wire format — the core only ever produces numeric samples tagged
/// with names (spec §1) and forwards them here; it does not know or care
/// how they are exposed. A [`crate::pool::Pool`] holds at most one,
/// installed through [`crate::pool::Pool::register_metrics`].
pub trait PrometheusSource: Send + Sync {
    fn observe(&self, sample: &MetricSample);
}

/// Reads and drains every consumable sample off `last_run`, pairs it with
/// `name`, and returns it for a collector to consume. Each call drains the
/// samples it reads — calling this twice in a row without an intervening
/// tick returns `None` for every optional field the second time.
pub fn collect_sample(name: &str, last_run: &LastRun) -> MetricSample {
    let (status, is_rise, is_fall) = last_run.collect_status();
    MetricSample {
        name: name.to_string(),
        status,
        is_rise,
        is_fall,
        latency: last_run.collect_latency(),
        uptime: last_run.collect_up_time(),
        downtime: last_run.collect_down_time(),
        rise_time: last_run.collect_rise_time(),
        fall_time: last_run.collect_fall_time(),
    }
}

/// Appends names to a monitor's registered metric name list without
/// clobbering ones already registered (duplicates are dropped).
pub fn register_names_append(existing: &mut MetricNames, additions: &[&str]) {
    for name in additions {
        if !existing.iter().any(|n| n == name) {
            existing.push((*name).to_string());
        }
    }
}

/// Replaces a monitor's registered metric name list outright.
pub fn register_names(names: &[&str]) -> MetricNames {
    names.iter().map(|n| n.to_string()).collect()
}
