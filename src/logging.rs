use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{ImportError, Result};

const DEFAULT_DIRECTIVE: &str = "school_import=info";

/// Initializes console logging, plus JSON file logging when enabled.
///
/// `RUST_LOG` overrides the default `school_import=info` filter. Keep the returned guard
/// alive for the life of the process so buffered file logs are flushed on exit.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    // Console output goes to stderr; stdout carries command output.
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.json_file {
        fs::create_dir_all(&config.dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.dir, "school_import.log");
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer().json().with_writer(non_blocking_writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| ImportError::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(guard)
}
