//! Structured logging setup.
//!
//! `RUST_LOG` wins over the configured level when it is set.

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber described by `config`.
///
/// Returns `Ok(false)` when a subscriber was already installed, so calling this from
/// several tests or entry points is harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_level.as_str())
            .map_err(|e| ProtocolError::ConfigError(format!("invalid log filter: {e}")))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        info!(app = %config.app_name, level = %config.log_level, json = config.json_format, "Logging initialized");
    }
    Ok(installed)
}
