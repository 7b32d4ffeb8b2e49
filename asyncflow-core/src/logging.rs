//! Structured logging setup for simulation runs.
//!
//! Built on `tracing` with an environment-driven filter. The default level
//! keeps runs quiet; set `RUST_LOG=asyncflow_core::scheduler=trace` (or
//! similar) to watch individual events being scheduled and dispatched.

use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with the default `info` level.
pub fn init_simulation_logging() {
    init_simulation_logging_with_level("info");
}

/// Initialize logging at a specific level: "trace", "debug", "info",
/// "warn" or "error". `RUST_LOG` takes precedence when set.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_simulation_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("asyncflow_core={level},asyncflow_components={level},asyncflow_metrics={level}").into());

    let initialized = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .try_init()
        .is_ok();

    if initialized {
        info!(level, "simulation logging initialized");
    }
}
