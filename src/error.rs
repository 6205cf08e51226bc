//! Error taxonomy for the health monitoring engine.

use thiserror::Error;

/// Errors surfaced by lifecycle operations (`Start`/`Stop`/`Restart`/`SetConfig`/
/// pool batch operations). Errors encountered *during a tick* are never returned
/// through this type — they are recorded into [`crate::last_run::LastRun`] instead.
#[derive(Error, Debug)]
pub enum HealthError {
    /// Operation called on a monitor or pool that is not initialized or has
    /// already been shut down.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// `SetConfig` received values that could not be normalized into a valid
    /// `RunConfig` (reserved for validation performed outside `normalize`,
    /// which itself never fails — see `RunConfig::normalize`).
    #[error("configuration error: {0}")]
    Config(String),

    /// `Start` did not observe the runner transition to "running" within the
    /// 15s bound.
    #[error("timeout waiting for monitor '{name}' to start after {waited_ms}ms")]
    StartTimeout { name: String, waited_ms: u64 },

    /// `Stop` did not complete before the caller's bounded context expired.
    #[error("timeout waiting for monitor '{name}' to stop")]
    StopTimeout { name: String },

    /// A pool batch operation (`Start`/`Stop`/`Restart`) encountered one or
    /// more per-monitor failures. Holds every failure paired with the name
    /// of the monitor that produced it.
    #[error("{} of {attempted} monitors failed: {}", failures.len(), summarize(failures))]
    Batch {
        attempted: usize,
        failures: Vec<(String, Box<HealthError>)>,
    },

    /// `Pool::RegisterMetrics` called twice without an intervening
    /// `UnregisterMetrics`.
    #[error("metrics already registered for this pool")]
    MetricsAlreadyRegistered,

    /// A monitor name used in `Add`/`Get`/`Set`/`Delete` was empty.
    #[error("monitor name must not be empty")]
    EmptyName,
}

fn summarize(failures: &[(String, Box<HealthError>)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, HealthError>;

impl HealthError {
    /// Creates an [`HealthError::InvalidState`] from any displayable message.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates an [`HealthError::Config`] from any displayable message.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether retrying the same lifecycle operation is likely to help.
    /// Timeouts are transient; state and config errors are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StartTimeout { .. } | Self::StopTimeout { .. } | Self::Batch { .. }
        )
    }

    /// Error category tag, for correlating with logs/metrics the same way
    /// the rest of the engine tags its diagnostics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidState(_) => "state",
            Self::Config(_) => "config",
            Self::StartTimeout { .. } | Self::StopTimeout { .. } => "timeout",
            Self::Batch { .. } => "batch",
            Self::MetricsAlreadyRegistered => "metrics",
            Self::EmptyName => "validation",
        }
    }
}

/// The error a tick records when no health check function is installed.
/// Kept as a fixed sentinel string so downstream equality checks (tests,
/// diagnostics) can match on it directly.
pub const NO_HEALTHCHECK_ERROR: &str = "no valid healthcheck function";

/// The sentinel `lastError` text for a freshly constructed `LastRun` that
/// has not completed a tick yet.
pub const NEVER_RUN_ERROR: &str = "no healthcheck still run";

/// The error a tick records when the health check did not return before
/// its bounded context's deadline. A non-cooperative check (one that never
/// polls `ctx.done()`) is raced against the deadline rather than trusted to
/// respect it — see `UserCheckMiddleware::handle`.
pub const CHECK_TIMEOUT_ERROR: &str = "health check exceeded its check timeout";
