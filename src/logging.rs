//! Logging setup for the `labdaq` binary.
//!
//! Library code logs through the `log` facade. The binary installs a
//! `tracing-subscriber` fmt subscriber, which also receives `log` records.
//! `RUST_LOG` wins over the configured level.

use tracing_subscriber::EnvFilter;

use crate::error::{AppResult, DaqError};

/// Install the global subscriber with `level` as fallback filter.
pub fn init(level: &str) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| DaqError::Configuration(format!("failed to install logger: {e}")))
}
