//! Tracing setup for Ripple
//!
//! Provides dual output: console logs at a caller-chosen level and full trace
//! logs to disk, so a peer exchange can be replayed after the fact without
//! making the console noisy.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::RippleError;

/// File name of the per-run trace log.
pub const LOG_FILE_NAME: &str = "ripple-last-run.log";

/// Initialize tracing with dual output: console (user level) + file (full trace)
///
/// `RUST_LOG` overrides `console_level` for the console layer. The file layer
/// always records everything and overwrites the previous run. Returns the path
/// of the log file.
///
/// # Errors
///
/// - `RippleError::Io` - If the logs directory or log file cannot be created
/// - `RippleError::Logging` - If a global subscriber is already installed
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> crate::Result<PathBuf> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));

    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| RippleError::Logging {
            reason: e.to_string(),
        })?;

    tracing::info!(
        "Tracing initialized: console={}, trace_file={}",
        console_level,
        log_file_path.display()
    );

    Ok(log_file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only test in this binary that installs the global subscriber
    #[test]
    fn test_init_tracing_writes_log_file_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let logs_dir = temp_dir.path().join("logs");

        let log_path = init_tracing(Level::WARN, Some(&logs_dir)).unwrap();
        assert_eq!(log_path, logs_dir.join(LOG_FILE_NAME));
        assert!(log_path.exists());

        let second = init_tracing(Level::INFO, Some(&logs_dir));
        assert!(matches!(second, Err(RippleError::Logging { .. })));
    }
}
