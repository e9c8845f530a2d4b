//! Logging configuration for qbridge.
//!
//! Logs go to stderr for the CLI, keeping stdout free for JSON results, or to
//! a file when qbridge is embedded in a host process that owns the terminal.
//! Both initializers leave an already-installed subscriber in place.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Initializes logging to the default log file. See [`get_log_path`].
pub fn init_file_logging() {
    init_file_logging_at(&get_log_path());
}

/// Initializes logging, appending to the file at `log_path`.
pub fn init_file_logging_at(log_path: &Path) {
    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            return;
        }
    }

    // several processes may share the log, so never truncate
    let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .try_init();
}

/// Returns the path for the log file.
///
/// Uses XDG state directory on Linux (`~/.local/state/qbridge/qbridge.log`),
/// or falls back to config directory on other platforms.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("qbridge").join("qbridge.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("qbridge").join("qbridge.log");
    }

    std::env::temp_dir().join("qbridge.log")
}
