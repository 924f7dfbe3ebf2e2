//! Common logger configuration for the daylight gateway.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    filter::Targets,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

/// Initialize the global `tracing` logger.
///
/// + Prints enabled `tracing` events and spans to stdout.
/// + Default log level includes INFO, WARN, and ERROR events.
/// + Override the log level or module filtering with `RUST_LOG`.
///
/// Panics if a logger is already initialized.
pub fn init() {
    try_init().expect("Failed to setup logger");
}

/// Use this to initialize the global logger in tests. Does nothing if
/// `RUST_LOG` isn't set, and doesn't panic if a logger is already set (since
/// multiple test threads may race to set the global logger).
pub fn init_for_testing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = try_init();
}

/// Try to initialize the global logger. Returns `Err` if one is already set.
pub fn try_init() -> Result<(), TryInitError> {
    let rust_log_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|rust_log| Targets::from_str(&rust_log).ok())
        .unwrap_or_else(|| Targets::new().with_default(Level::INFO));

    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_level(true)
        .with_target(true)
        .with_ansi(true)
        .with_filter(rust_log_filter);

    tracing_subscriber::registry().with(stdout_log).try_init()
}
