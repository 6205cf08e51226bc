//! healthguard - a threshold-debounced health monitoring engine.
//!
//! Periodically runs user-supplied liveness checks against components
//! (databases, services, endpoints), debounces results with hysteresis
//! thresholds, classifies each component into one of three health states
//! (`KO`, `Warn`, `OK`), tracks timing metrics (latency, uptime, downtime,
//! rise/fall time), and aggregates many such checks into a pool that
//! exposes metrics and operational commands.
//!
//! # Architecture
//!
//! - [`status`]: the three-state health classification.
//! - [`config`]: per-monitor configuration, normalized at construction.
//! - [`context`]: bounded execution contexts (deadline + cancellation).
//! - [`last_run`]: the hysteresis state machine and its atomic counters.
//! - [`middleware`]: the ordered wrapper chain executed around a check.
//! - [`monitor`]: a single named check, its runner, and its lifecycle.
//! - [`metrics`]: metric name registration and sample collection.
//! - [`diagnostics`]: a bounded recent-error ring buffer.
//! - [`encoding`]: text/JSON encodings of a monitor's current status.
//! - [`engine_config`]: pool-wide defaults and hot-reload.
//! - [`pool`]: the keyed monitor registry and its command surface.
//!
//! # Example
//!
//! ```no_run
//! use healthguard::context::BoundedContext;
//! use healthguard::engine_config::EngineConfig;
//! use healthguard::pool::{new_monitor, Pool};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> healthguard::error::Result<()> {
//!     let pool = Pool::new(EngineConfig::default());
//!     let ctx = BoundedContext::with_timeout(Duration::from_secs(5));
//!
//!     let monitor = new_monitor("db", Arc::new(|_ctx| Box::pin(async { Ok(()) })));
//!     pool.add(&ctx, "db", monitor).await?;
//!     pool.start(&ctx, &[]).await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod encoding;
pub mod engine_config;
pub mod error;
pub mod last_run;
pub mod metrics;
pub mod middleware;
pub mod monitor;
pub mod pool;
pub mod status;

pub use config::RunConfig;
pub use context::BoundedContext;
pub use engine_config::EngineConfig;
pub use error::{HealthError, Result};
pub use monitor::Monitor;
pub use pool::Pool;
pub use status::Status;
