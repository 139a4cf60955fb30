//! Shared command setup: configuration, logging, runtime and Ctrl+C.

use std::future::Future;

use pdfcompressor::config::{config_file_path, ConfigFile};
use pdfcompressor::logging::{init_logging, LoggingConfig, LoggingGuard};
use pdfcompressor::{AppConfig, CompressorApp};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::CliError;

/// Owns everything a command needs to talk to the library.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _logging: Option<LoggingGuard>,
}

impl CliRunner {
    /// Load configuration and start logging.
    ///
    /// A broken log directory is reported but does not stop the command.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let mut logging = LoggingConfig::from_config_file(&config).with_stderr(verbose);
        if verbose {
            logging = logging.with_level("debug");
        }
        let guard = match init_logging(&logging) {
            Ok(guard) => Some(guard),
            Err(e) => {
                eprintln!(
                    "Warning: logging disabled ({}): {}",
                    logging.directory.display(),
                    e
                );
                None
            }
        };

        let runtime = Runtime::new().map_err(|e| CliError::Setup(e.to_string()))?;

        Ok(Self {
            config,
            runtime,
            _logging: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = pdfcompressor::VERSION,
            command,
            config = %config_file_path().display(),
            "pdfcompressor starting"
        );
    }

    /// Build the application from the loaded configuration.
    pub fn app(&self) -> CompressorApp {
        CompressorApp::new(AppConfig::from_config_file(&self.config))
    }

    /// Run a future on the command runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Token cancelled when the user presses Ctrl+C.
    ///
    /// Call at most once per process.
    pub fn interrupt_token(&self) -> Result<CancellationToken, CliError> {
        let token = CancellationToken::new();
        let handler_token = token.clone();
        ctrlc::set_handler(move || {
            if handler_token.is_cancelled() {
                warn!("Second interrupt, exiting immediately");
                std::process::exit(130);
            }
            eprintln!();
            eprintln!("Cancelling...");
            handler_token.cancel();
        })
        .map_err(|e| CliError::Setup(format!("Failed to set signal handler: {}", e)))?;
        Ok(token)
    }
}
