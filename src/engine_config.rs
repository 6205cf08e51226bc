//! Pool-wide configuration: defaults that apply across every monitor in a
//! [`crate::pool::Pool`], as distinct from a single monitor's
//! [`crate::config::RunConfig`].
//!
//! Grounded on the teacher's `core::config::{Config, ConfigBuilder,
//! ConfigWatcher}`: a `serde`-derived struct with YAML (de)serialization, a
//! fluent builder that validates on `build()`, and a file watcher that
//! republishes a validated config over a `tokio::sync::watch` channel. Per
//! the top-level spec's Non-goal on duration-string parsing, every duration
//! here crosses the YAML boundary as a plain integer count of seconds, never
//! a `"30s"`-style string.

use crate::error::{HealthError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pool-wide defaults and operational knobs. Unlike [`crate::config::RunConfig`]
/// this is not normalized/clamped — invalid values are rejected by
/// [`EngineConfig::validate`], matching the teacher's `Config::validate`
/// which returns an error rather than silently repairing bad input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Default period, in whole seconds, between
    /// [`crate::pool::Pool::trigger_collect_metrics`] sweeps.
    pub collect_interval_secs: u64,
    /// Whether the pool emits `tracing` events for lifecycle transitions at
    /// all (set false to run fully quiet, e.g. under test).
    pub logging_enabled: bool,
    /// Minimum `tracing` level name pool operations log at: one of
    /// "trace"/"debug"/"info"/"warn"/"error".
    pub log_level: String,
    /// Whether newly `Add`ed monitors are auto-started when the pool itself
    /// is already running.
    pub auto_start_on_add: bool,
    /// Capacity of the per-pool [`crate::diagnostics::DiagnosticsCollector`]
    /// ring buffer.
    pub diagnostics_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collect_interval_secs: 15,
            logging_enabled: true,
            log_level: "info".to_string(),
            auto_start_on_add: true,
            diagnostics_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration, rejecting values that cannot be
    /// repaired the way [`crate::config::RunConfig::normalize`] repairs
    /// per-monitor settings. This is the ambient config's validation path;
    /// per-monitor `RunConfig` never fails to construct (see
    /// `DESIGN.md`'s open-question resolution on this split).
    pub fn validate(&self) -> Result<()> {
        if self.collect_interval_secs == 0 {
            return Err(HealthError::config(
                "collect_interval_secs must be greater than 0",
            ));
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(HealthError::config(format!(
                    "invalid log_level '{other}': expected trace/debug/info/warn/error"
                )))
            }
        }
        if self.diagnostics_capacity == 0 {
            return Err(HealthError::config(
                "diagnostics_capacity must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_secs)
    }
}

/// Fluent, programmatic construction of an [`EngineConfig`]. Always routes
/// through [`EngineConfig::validate`] at `build()`, mirroring the teacher's
/// `ConfigBuilder::build`.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `yaml` into the builder's working config, replacing any
    /// fields already set.
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| HealthError::config(format!("invalid YAML: {e}")))?;
        Ok(self)
    }

    pub fn collect_interval_secs(mut self, secs: u64) -> Self {
        self.config.collect_interval_secs = secs;
        self
    }

    pub fn logging_enabled(mut self, enabled: bool) -> Self {
        self.config.logging_enabled = enabled;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn auto_start_on_add(mut self, auto: bool) -> Self {
        self.config.auto_start_on_add = auto;
        self
    }

    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.config.diagnostics_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Watches a YAML file on disk and republishes a validated [`EngineConfig`]
/// over a `tokio::sync::watch` channel whenever it changes. Grounded on
/// `core::config::ConfigWatcher`; scoped to pool-wide defaults only — a
/// live monitor's `RunConfig` is never touched by this watcher, it is only
/// ever updated through `Monitor::set_config` (spec §4.3).
pub struct ConfigWatcher {
    path: PathBuf,
    tx: tokio::sync::watch::Sender<EngineConfig>,
    rx: tokio::sync::watch::Receiver<EngineConfig>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>, initial: EngineConfig) -> Self {
        let (tx, rx) = tokio::sync::watch::channel(initial);
        Self {
            path: path.into(),
            tx,
            rx,
        }
    }

    /// A receiver that observes every future republish. Cloning the
    /// watcher's receiver is cheap and each clone sees every update
    /// independently.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<EngineConfig> {
        self.rx.clone()
    }

    /// Runs until the file watch channel closes (the underlying `notify`
    /// watcher is dropped), re-reading and republishing `path` on every
    /// modify event. Parse or validation failures are logged and leave the
    /// previously published config in place, matching the teacher's
    /// `ConfigWatcher::watch`.
    pub async fn watch(self) -> Result<()> {
        use notify::{RecursiveMode, Watcher};
        use std::sync::mpsc::channel;

        let (events_tx, events_rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            if let Ok(event) = res {
                let _ = events_tx.send(event);
            }
        })
        .map_err(|e| HealthError::config(format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|e| HealthError::config(format!("failed to watch config file: {e}")))?;

        tracing::info!(path = %self.path.display(), "watching engine configuration file");

        while let Ok(event) = events_rx.recv() {
            if !matches!(event.kind, notify::EventKind::Modify(_)) {
                continue;
            }
            self.reload().await;
        }
        Ok(())
    }

    async fn reload(&self) {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(error = %e, "failed to read engine configuration file");
                return;
            }
        };
        let config: EngineConfig = match serde_yaml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "failed to parse engine configuration file");
                return;
            }
        };
        if let Err(e) = config.validate() {
            tracing::error!(error = %e, "invalid engine configuration, keeping previous");
            return;
        }
        if self.tx.send(config).is_err() {
            tracing::error!("engine configuration channel closed, no subscribers left");
        } else {
            tracing::info!("engine configuration reloaded");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The conventional location for an engine configuration file when none is
/// explicitly supplied: `$XDG_CONFIG_HOME/healthguard/config.yaml`, falling
/// back to a literal `~/.config` path on platforms without a resolvable
/// config directory. Mirrors the teacher's CLI default-config-path lookup.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("healthguard").join("config.yaml"))
        .unwrap_or_else(|| PathBuf::from("~/.config/healthguard/config.yaml"))
}
