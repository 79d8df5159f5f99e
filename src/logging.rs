//! Process-wide `tracing` subscriber setup for the `qa` binary.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the fmt subscriber. `RUST_LOG` wins over `[logging].level`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
