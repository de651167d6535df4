//! Tracing subscriber setup
//!
//! Logs go to stderr so stdout carries only command output.

use std::io;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogFormat;

/// Install the global subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init(verbose: bool, format: LogFormat) -> io::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string())),
        LogFormat::Text => subscriber
            .with(fmt::layer().with_target(false).with_writer(io::stderr))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string())),
    }
}
