//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Installs the global subscriber.
///
/// `RUST_LOG` directives win over the configured level. `LOG_FORMAT=json`
/// switches to one JSON object per line.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the level
/// cannot be parsed.
pub fn init(config: &Config) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("Invalid log level '{}'", config.log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    installed.context("Failed to install tracing subscriber")
}
