//! Per-monitor configuration: raw input, normalization, and the validated
//! immutable snapshot the rest of the engine observes.
//!
//! Deliberately does not parse duration strings — every duration here is a
//! plain `std::time::Duration`, constructed by callers however they like.

use std::time::Duration;

/// The floor for `checkTimeout`: any configured value below this is raised
/// to it during normalization.
pub const CHECK_TIMEOUT_FLOOR: Duration = Duration::from_secs(5);
/// The floor for `intervalCheck`/`intervalFall`/`intervalRise`.
pub const INTERVAL_FLOOR: Duration = Duration::from_secs(1);

/// A validated, normalized configuration snapshot for one monitor.
///
/// Constructed only through [`RunConfig::normalize`] or [`RunConfigBuilder`],
/// both of which guarantee that a `RunConfig` is never observed with a
/// duration or threshold below its floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    name: String,
    check_timeout: Duration,
    interval_check: Duration,
    interval_fall: Duration,
    interval_rise: Duration,
    fall_count_ko: u32,
    fall_count_warn: u32,
    rise_count_ko: u32,
    rise_count_warn: u32,
}

/// The unvalidated input to [`RunConfig::normalize`]. Every field mirrors a
/// `RunConfig` field one-to-one; the only difference is that values here may
/// violate the floors and zero-threshold rule.
#[derive(Debug, Clone, Default)]
pub struct RawRunConfig {
    pub name: String,
    pub check_timeout: Duration,
    pub interval_check: Duration,
    pub interval_fall: Duration,
    pub interval_rise: Duration,
    pub fall_count_ko: u32,
    pub fall_count_warn: u32,
    pub rise_count_ko: u32,
    pub rise_count_warn: u32,
}

impl RunConfig {
    /// Normalizes a raw configuration in a fixed order: name, then each
    /// duration floored independently, then the fall/rise intervals falling
    /// back to the already-normalized check interval, then thresholds.
    /// This function is total: it never fails, it only clamps.
    pub fn normalize(raw: RawRunConfig) -> Self {
        // 1. name empty -> "not named"
        let name = if raw.name.is_empty() {
            "not named".to_string()
        } else {
            raw.name
        };

        // 2. each interval/duration floored independently.
        let check_timeout = floor(raw.check_timeout, CHECK_TIMEOUT_FLOOR);
        let interval_check = floor(raw.interval_check, INTERVAL_FLOOR);

        // 3. intervalFall/intervalRise: on floor failure, fall back to the
        //    *already-normalized* interval_check, not the raw input.
        let interval_fall = if raw.interval_fall < INTERVAL_FLOOR {
            interval_check
        } else {
            raw.interval_fall
        };
        let interval_rise = if raw.interval_rise < INTERVAL_FLOOR {
            interval_check
        } else {
            raw.interval_rise
        };

        // 4. each threshold: 0 -> 1.
        let fall_count_ko = floor_count(raw.fall_count_ko);
        let fall_count_warn = floor_count(raw.fall_count_warn);
        let rise_count_ko = floor_count(raw.rise_count_ko);
        let rise_count_warn = floor_count(raw.rise_count_warn);

        RunConfig {
            name,
            check_timeout,
            interval_check,
            interval_fall,
            interval_rise,
            fall_count_ko,
            fall_count_warn,
            rise_count_ko,
            rise_count_warn,
        }
    }

    /// A sensible default: 5s timeout, 1s check interval, thresholds of 1
    /// (i.e. no hysteresis — any single failure/success transitions).
    pub fn default_named(name: impl Into<String>) -> Self {
        Self::normalize(RawRunConfig {
            name: name.into(),
            check_timeout: CHECK_TIMEOUT_FLOOR,
            interval_check: INTERVAL_FLOOR,
            interval_fall: INTERVAL_FLOOR,
            interval_rise: INTERVAL_FLOOR,
            fall_count_ko: 1,
            fall_count_warn: 1,
            rise_count_ko: 1,
            rise_count_warn: 1,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn check_timeout(&self) -> Duration {
        self.check_timeout
    }
    pub fn interval_check(&self) -> Duration {
        self.interval_check
    }
    pub fn interval_fall(&self) -> Duration {
        self.interval_fall
    }
    pub fn interval_rise(&self) -> Duration {
        self.interval_rise
    }
    pub fn fall_count_ko(&self) -> u32 {
        self.fall_count_ko
    }
    pub fn fall_count_warn(&self) -> u32 {
        self.fall_count_warn
    }
    pub fn rise_count_ko(&self) -> u32 {
        self.rise_count_ko
    }
    pub fn rise_count_warn(&self) -> u32 {
        self.rise_count_warn
    }
}

fn floor(value: Duration, floor: Duration) -> Duration {
    if value < floor {
        floor
    } else {
        value
    }
}

fn floor_count(value: u32) -> u32 {
    if value == 0 {
        1
    } else {
        value
    }
}

/// Programmatic, fluent construction of a [`RunConfig`]. Always routes
/// through [`RunConfig::normalize`] on `build()`, so a `RunConfigBuilder`
/// can never escape with unnormalized values.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    raw: RawRunConfig,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.raw.name = name.into();
        self
    }

    pub fn check_timeout(mut self, d: Duration) -> Self {
        self.raw.check_timeout = d;
        self
    }

    pub fn interval_check(mut self, d: Duration) -> Self {
        self.raw.interval_check = d;
        self
    }

    pub fn interval_fall(mut self, d: Duration) -> Self {
        self.raw.interval_fall = d;
        self
    }

    pub fn interval_rise(mut self, d: Duration) -> Self {
        self.raw.interval_rise = d;
        self
    }

    pub fn fall_count_ko(mut self, n: u32) -> Self {
        self.raw.fall_count_ko = n;
        self
    }

    pub fn fall_count_warn(mut self, n: u32) -> Self {
        self.raw.fall_count_warn = n;
        self
    }

    pub fn rise_count_ko(mut self, n: u32) -> Self {
        self.raw.rise_count_ko = n;
        self
    }

    pub fn rise_count_warn(mut self, n: u32) -> Self {
        self.raw.rise_count_warn = n;
        self
    }

    pub fn build(self) -> RunConfig {
        RunConfig::normalize(self.raw)
    }
}
