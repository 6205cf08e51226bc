//! Supplemented diagnostics: a bounded recent-error ring buffer and a
//! human-readable summary view, grounded on the teacher's
//! `DiagnosticsCollector` (category/operation counters, recent-error ring
//! buffer, `format_user_error`) but scoped down to a single monitor/pool's
//! own errors rather than the whole application's.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

/// The attach point for structured log emission — the core only ever calls
/// a logging sink (spec §1), it does not format or ship log lines itself.
/// A [`crate::pool::Pool`] holds at most one, installed through
/// [`crate::pool::Pool::register_metrics`].
pub trait LogSink: Send + Sync {
    fn log(&self, monitor: &str, message: &str);
}

/// One recorded failure: the monitor it came from, its message, and when
/// it happened (captured as both a monotonic instant, for age math, and a
/// wall-clock timestamp, for display).
#[derive(Debug, Clone)]
pub struct DiagnosticEvent {
    pub monitor: String,
    pub message: String,
    pub at: SystemTime,
    occurred: Instant,
}

impl DiagnosticEvent {
    pub fn age(&self) -> Duration {
        self.occurred.elapsed()
    }
}

/// A bounded ring buffer of the most recent failures seen across a pool
/// (or a single monitor, if constructed with capacity 1 tracking just
/// itself). Oldest events are dropped once capacity is reached.
pub struct DiagnosticsCollector {
    capacity: usize,
    recent: RwLock<VecDeque<DiagnosticEvent>>,
}

impl DiagnosticsCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            recent: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Records a failure. No-op if `message` is empty (nothing to record).
    pub fn record(&self, monitor: &str, message: &str) {
        if message.is_empty() {
            return;
        }
        let mut recent = self.recent.write();
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(DiagnosticEvent {
            monitor: monitor.to_string(),
            message: message.to_string(),
            at: SystemTime::now(),
            occurred: Instant::now(),
        });
    }

    /// The most recent events, newest last.
    pub fn recent(&self) -> Vec<DiagnosticEvent> {
        self.recent.read().iter().cloned().collect()
    }

    /// The most recent events for one monitor only, newest last.
    pub fn recent_for(&self, monitor: &str) -> Vec<DiagnosticEvent> {
        self.recent
            .read()
            .iter()
            .filter(|e| e.monitor == monitor)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recent.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.recent.write().clear();
    }

    /// A one-line-per-event human-readable summary, newest first, suitable
    /// for printing from a shell command handler.
    pub fn format_summary(&self) -> String {
        let events = self.recent();
        if events.is_empty() {
            return "no recent errors".to_string();
        }
        events
            .iter()
            .rev()
            .map(|e| format!("{} ago: {}: {}", format_age(e.age()), e.monitor, e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn format_age(age: Duration) -> String {
    if age.as_secs() < 60 {
        format!("{}s", age.as_secs())
    } else if age.as_secs() < 3600 {
        format!("{}m", age.as_secs() / 60)
    } else {
        format!("{}h", age.as_secs() / 3600)
    }
}
