//! Tracing subscriber setup
//!
//! This module provides shared tracing configuration used by the CLI and
//! its tests.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Logs go to `log_file_path` when given, otherwise to stderr. `RUST_LOG`
/// overrides `default_level`.
pub fn init_global(default_level: &str, log_file_path: Option<&Path>) -> anyhow::Result<()> {
    let log_file = log_file_path.map(File::create).transpose()?;

    let subscriber = build_subscriber(default_level, log_file);
    subscriber.try_init()?;

    Ok(())
}

/// Build a subscriber writing to a file, or to stderr without one.
pub fn build_subscriber(
    default_level: &str,
    log_file: Option<File>,
) -> impl tracing::Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, stderr_layer) = match log_file {
        Some(file) => (
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file))),
            None,
        ),
        None => (None, Some(fmt::layer().with_writer(std::io::stderr))),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(env_filter)
}
