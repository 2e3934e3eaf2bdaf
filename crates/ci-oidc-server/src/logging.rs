//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise the `--log-level` value is used as the
//! filter directive. Logs go to stderr, as text or JSON lines.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::{ServerError, ServerResult};

/// Install the global subscriber
///
/// # Errors
///
/// Returns [`ServerError::Logging`] if `default_level` is not a valid filter
/// directive or a global subscriber is already installed.
pub fn init_tracing(default_level: &str, json: bool) -> ServerResult<()> {
    let filter = build_filter(default_level)?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| ServerError::Logging(e.to_string()))
}

fn build_filter(default_level: &str) -> ServerResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| ServerError::Logging(format!("invalid log filter {default_level:?}: {e}")))
}
