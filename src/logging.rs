// src/logging.rs

//! Logging setup for `regen` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. the `REGEN_LOG` environment variable (e.g. "info", "regen=debug")
//! 2. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for generator output.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging() -> Result<()> {
    let filter =
        EnvFilter::try_from_env("REGEN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
