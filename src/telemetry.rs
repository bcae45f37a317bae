//! Logging setup for the `ctree` binary.
//!
//! Events go to stderr so stdout stays clean for command output. The filter
//! comes from `RUST_LOG` when set, else from `logging.level` in the config.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` first, then the configured level.
pub fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

/// Installs the global fmt subscriber. A second call is a no-op.
pub fn init(logging: &LoggingConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(logging))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
