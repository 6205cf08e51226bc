//! The observable result of a monitor's most recent health check and its
//! accumulated history: current status, hysteresis counters, and cumulative
//! uptime/downtime/risetime/falltime.
//!
//! Single-writer, multi-reader: the owning monitor's tick handler is the
//! only caller of [`LastRun::set_status`]; everyone else only reads. That
//! matches the atomic-counter idiom used for `StorageHealthMonitor`'s error
//! and success counters, so every field that can be a plain atomic is one.

use crate::config::RunConfig;
use crate::error::NEVER_RUN_ERROR;
use crate::status::Status;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

const ORD: Ordering = Ordering::SeqCst;

fn status_from_u8(v: u8) -> Status {
    match v {
        0 => Status::KO,
        1 => Status::Warn,
        _ => Status::OK,
    }
}

/// A sample slot consumed at most once per write: `take()` returns the
/// value and clears it, matching the "collect drains the latest sample"
/// contract used throughout the metrics accessors below.
#[derive(Default)]
struct SampleSlot(Mutex<Option<Duration>>);

impl SampleSlot {
    fn set(&self, d: Duration) {
        *self.0.lock() = Some(d);
    }

    fn take(&self) -> Option<Duration> {
        self.0.lock().take()
    }
}

/// The accumulated state of one monitor's checks.
pub struct LastRun {
    status: AtomicU8,
    is_rise: AtomicBool,
    is_fall: AtomicBool,
    cnt_rise: AtomicU32,
    cnt_fall: AtomicU32,

    uptime_nanos: AtomicU64,
    downtime_nanos: AtomicU64,
    rise_time_nanos: AtomicU64,
    fall_time_nanos: AtomicU64,
    latency_nanos: AtomicU64,

    runtime: Mutex<Instant>,
    last_error: RwLock<String>,

    latency_sample: SampleSlot,
    uptime_sample: SampleSlot,
    downtime_sample: SampleSlot,
    rise_time_sample: SampleSlot,
    fall_time_sample: SampleSlot,
}

impl LastRun {
    /// A fresh, never-run record: status `KO`, all counters zero, error set
    /// to the "never run" sentinel.
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(Status::KO as u8),
            is_rise: AtomicBool::new(false),
            is_fall: AtomicBool::new(false),
            cnt_rise: AtomicU32::new(0),
            cnt_fall: AtomicU32::new(0),
            uptime_nanos: AtomicU64::new(0),
            downtime_nanos: AtomicU64::new(0),
            rise_time_nanos: AtomicU64::new(0),
            fall_time_nanos: AtomicU64::new(0),
            latency_nanos: AtomicU64::new(0),
            runtime: Mutex::new(Instant::now()),
            last_error: RwLock::new(NEVER_RUN_ERROR.to_string()),
            latency_sample: SampleSlot::default(),
            uptime_sample: SampleSlot::default(),
            downtime_sample: SampleSlot::default(),
            rise_time_sample: SampleSlot::default(),
            fall_time_sample: SampleSlot::default(),
        }
    }

    pub fn status(&self) -> Status {
        status_from_u8(self.status.load(ORD))
    }

    pub fn is_rise(&self) -> bool {
        self.is_rise.load(ORD)
    }

    pub fn is_fall(&self) -> bool {
        self.is_fall.load(ORD)
    }

    pub fn cnt_rise(&self) -> u32 {
        self.cnt_rise.load(ORD)
    }

    pub fn cnt_fall(&self) -> u32 {
        self.cnt_fall.load(ORD)
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_nanos(self.uptime_nanos.load(ORD))
    }

    pub fn downtime(&self) -> Duration {
        Duration::from_nanos(self.downtime_nanos.load(ORD))
    }

    pub fn rise_time(&self) -> Duration {
        Duration::from_nanos(self.rise_time_nanos.load(ORD))
    }

    pub fn fall_time(&self) -> Duration {
        Duration::from_nanos(self.fall_time_nanos.load(ORD))
    }

    pub fn latency(&self) -> Duration {
        Duration::from_nanos(self.latency_nanos.load(ORD))
    }

    pub fn last_error(&self) -> Option<String> {
        let e = self.last_error.read();
        if e.is_empty() {
            None
        } else {
            Some(e.clone())
        }
    }

    /// Applies the result of one tick: the heart of the hysteresis state
    /// machine. `err` is `None` on success, `Some(message)` on failure.
    /// `elapsed` is the wall time the check took. Thresholds and the
    /// "stays-on-entry" accounting below come from `cfg`.
    ///
    /// On success: the elapsed time since the previous tick is folded into
    /// `uptime` if the pre-tick status was `OK`, otherwise into `riseTime`.
    /// `cntFall` resets to zero, `cntRise` increments and may cross
    /// `riseCountWarn`/`riseCountKo` to move the status up.
    ///
    /// On failure: elapsed time is folded into `downtime` if the pre-tick
    /// status was `KO`, otherwise into `fallTime`. `cntRise` resets to
    /// zero, `cntFall` increments and may cross `fallCountWarn`/
    /// `fallCountKo` to move the status down. `cntFall` itself is reset
    /// back to zero on every tick the status is already `KO` (it only
    /// counts consecutive failures while still trying to reach `KO`).
    pub fn set_status(&self, err: Option<&str>, elapsed: Duration, cfg: &RunConfig) {
        let now = Instant::now();
        let delta = {
            let mut runtime = self.runtime.lock();
            let delta = now.saturating_duration_since(*runtime);
            *runtime = now;
            delta
        };

        self.latency_nanos
            .store(elapsed.as_nanos() as u64, ORD);
        self.latency_sample.set(elapsed);

        let pre_status = self.status();

        match err {
            None => self.apply_rise(pre_status, delta, cfg),
            Some(message) => self.apply_fall(pre_status, delta, cfg, message),
        }
    }

    /// Per-branch transition exactly as specified: the threshold checked
    /// while at KO is `riseCountKO` (how many consecutive successes move
    /// KO to Warn), the one checked while at Warn is `riseCountWarn` (Warn
    /// to OK) — so reaching OK from KO needs `riseCountKO + riseCountWarn`
    /// consecutive successes, never fewer, even when both are 1.
    fn apply_rise(&self, pre_status: Status, delta: Duration, cfg: &RunConfig) {
        *self.last_error.write() = String::new();
        self.cnt_fall.store(0, ORD);

        match pre_status {
            Status::KO => {
                self.is_fall.store(false, ORD);
                self.is_rise.store(true, ORD);
                add_nanos(&self.rise_time_nanos, delta);
                add_nanos(&self.downtime_nanos, delta);
                let cnt = self.cnt_rise.fetch_add(1, ORD) + 1;
                if cnt >= cfg.rise_count_ko() {
                    self.cnt_rise.store(0, ORD);
                    self.status.store(Status::Warn as u8, ORD);
                }
            }
            Status::Warn => {
                self.is_fall.store(false, ORD);
                add_nanos(&self.rise_time_nanos, delta);
                add_nanos(&self.downtime_nanos, delta);
                let cnt = self.cnt_rise.fetch_add(1, ORD) + 1;
                if cnt >= cfg.rise_count_warn() {
                    self.cnt_rise.store(0, ORD);
                    self.is_rise.store(false, ORD);
                    self.status.store(Status::OK as u8, ORD);
                } else {
                    self.is_rise.store(true, ORD);
                }
            }
            Status::OK => {
                self.cnt_rise.store(0, ORD);
                self.is_fall.store(false, ORD);
                self.is_rise.store(false, ORD);
                add_nanos(&self.uptime_nanos, delta);
                self.status.store(Status::OK as u8, ORD);
            }
        }
    }

    /// Symmetrical to [`apply_rise`](Self::apply_rise): reaching KO from OK
    /// needs `fallCountWarn + fallCountKO` consecutive failures. Both the
    /// OK and Warn branches fold `Δ` into *two* accumulators at once
    /// (`fallTime` plus whichever of `uptime`/`downtime` matches the
    /// pre-tick state) — preserved verbatim from the source algorithm, not
    /// a bug to "fix".
    fn apply_fall(&self, pre_status: Status, delta: Duration, cfg: &RunConfig, message: &str) {
        *self.last_error.write() = message.to_string();
        self.cnt_rise.store(0, ORD);

        match pre_status {
            Status::OK => {
                self.is_fall.store(true, ORD);
                self.is_rise.store(false, ORD);
                add_nanos(&self.fall_time_nanos, delta);
                add_nanos(&self.uptime_nanos, delta);
                let cnt = self.cnt_fall.fetch_add(1, ORD) + 1;
                if cnt >= cfg.fall_count_warn() {
                    self.cnt_fall.store(0, ORD);
                    self.status.store(Status::Warn as u8, ORD);
                }
            }
            Status::Warn => {
                self.is_rise.store(false, ORD);
                add_nanos(&self.fall_time_nanos, delta);
                add_nanos(&self.downtime_nanos, delta);
                let cnt = self.cnt_fall.fetch_add(1, ORD) + 1;
                if cnt >= cfg.fall_count_ko() {
                    self.is_fall.store(false, ORD);
                    self.cnt_fall.store(0, ORD);
                    self.status.store(Status::KO as u8, ORD);
                } else {
                    self.is_fall.store(true, ORD);
                }
            }
            Status::KO => {
                self.cnt_fall.store(0, ORD);
                self.is_fall.store(false, ORD);
                self.is_rise.store(false, ORD);
                add_nanos(&self.downtime_nanos, delta);
                self.status.store(Status::KO as u8, ORD);
            }
        }
    }

    pub fn stash_uptime_sample(&self, d: Duration) {
        self.uptime_sample.set(d);
    }

    pub fn stash_downtime_sample(&self, d: Duration) {
        self.downtime_sample.set(d);
    }

    pub fn stash_rise_time_sample(&self, d: Duration) {
        self.rise_time_sample.set(d);
    }

    pub fn stash_fall_time_sample(&self, d: Duration) {
        self.fall_time_sample.set(d);
    }

    /// Non-consuming snapshot of status plus the rise/fall edge flags, used
    /// by the collection middleware to decide which samples to stash.
    pub fn collect_status(&self) -> (Status, bool, bool) {
        (self.status(), self.is_rise(), self.is_fall())
    }

    pub fn collect_latency(&self) -> Option<Duration> {
        self.latency_sample.take()
    }

    pub fn collect_up_time(&self) -> Option<Duration> {
        self.uptime_sample.take()
    }

    pub fn collect_down_time(&self) -> Option<Duration> {
        self.downtime_sample.take()
    }

    pub fn collect_rise_time(&self) -> Option<Duration> {
        self.rise_time_sample.take()
    }

    pub fn collect_fall_time(&self) -> Option<Duration> {
        self.fall_time_sample.take()
    }
}

impl Default for LastRun {
    fn default() -> Self {
        Self::new()
    }
}

fn add_nanos(counter: &AtomicU64, d: Duration) {
    counter.fetch_add(d.as_nanos() as u64, ORD);
}
