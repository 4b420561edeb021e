//! Logging initialization.
//!
//! Logs go to stderr in compact form; stdout carries only presence reports.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter. `RUST_LOG` is used when it
/// is unset.
pub const LOG_ENV: &str = "BLE_TRACKER_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

/// Filter from `BLE_TRACKER_LOG`, then `RUST_LOG`, then the verbosity flag.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber. Call once, before the first log event.
pub fn init(verbose: bool) {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stderr_layer)
        .init();
}
