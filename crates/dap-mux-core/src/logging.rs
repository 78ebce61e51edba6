//! Tracing bootstrap.
//!
//! A debug adapter talking DAP over stdio must never write logs to stdout, so
//! output goes to stderr or to a file.

use crate::config::LogConfig;
use crate::error::{MuxError, Result};
use std::sync::Arc;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this twice returns
/// a [`MuxError::Config`] instead of panicking.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let writer = Arc::new(file);

            if config.json {
                registry.with(fmt::layer().json().with_writer(writer)).try_init()
            } else {
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(writer))
                    .try_init()
            }
        }
        None if config.json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        None => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| MuxError::config(format!("Failed to initialize logging: {}", e)))
}
