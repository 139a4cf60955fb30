//! Tracing subscriber setup.
//!
//! Logs go to a daily-rolled file in the log directory, and optionally to
//! stderr. `RUST_LOG` takes precedence over the configured level.

use std::io;
use std::path::PathBuf;

use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigFile;
use crate::platform::APP_DIR_NAME;

/// Base name of the log files.
pub const LOG_FILE_PREFIX: &str = "pdfcompressor.log";

/// Logging setup.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `pdfcompressor=debug`.
    pub level: String,
    pub directory: PathBuf,
    /// Also log to stderr.
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: default_log_dir(),
            stderr: false,
        }
    }
}

impl LoggingConfig {
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            level: config.logging.level.clone(),
            directory: config
                .logging
                .directory
                .clone()
                .unwrap_or_else(default_log_dir),
            stderr: false,
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }
}

/// `~/.local/share/pdfcompressor/logs` and platform equivalents.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join("logs")
}

/// Keeps the background log writer alive. Drop it at process exit to flush.
#[must_use = "logs stop being written when the guard is dropped"]
pub struct LoggingGuard {
    _file: WorkerGuard,
}

/// Install the global subscriber.
///
/// Fails if the log directory cannot be created or a subscriber is already
/// installed.
pub fn init_logging(config: &LoggingConfig) -> io::Result<LoggingGuard> {
    std::fs::create_dir_all(&config.directory)?;

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(LocalTime::new(Rfc3339));

    let stderr_layer = config.stderr.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LoggingGuard { _file: guard })
}
