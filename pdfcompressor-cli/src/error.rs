//! CLI error type and process exit codes.

use std::fmt;

use pdfcompressor::compress::CompressionError;
use pdfcompressor::config::ConfigError;
use pdfcompressor::engine::EngineError;
use pdfcompressor::AppError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded, parsed or saved.
    Config(String),

    /// Engine download, install or uninstall failed.
    Engine(EngineError),

    /// Compression failed or was rejected.
    Compression(CompressionError),

    /// Logging or runtime could not be set up.
    Setup(String),

    /// The user did not provide a required selection.
    NothingSelected(&'static str),

    /// Interrupted with Ctrl+C.
    Interrupted,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Setup(_) => 78,
            CliError::NothingSelected(_) => 64,
            CliError::Engine(EngineError::Unsupported { .. }) => 69,
            CliError::Compression(CompressionError::EngineUnavailable) => 69,
            CliError::Compression(CompressionError::Validation(_)) => 65,
            CliError::Engine(EngineError::Cancelled)
            | CliError::Compression(CompressionError::Cancelled)
            | CliError::Interrupted => 130,
            CliError::Engine(_) | CliError::Compression(_) => 1,
        }
    }

    /// Extra guidance printed below the error message.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Engine(EngineError::Unsupported { .. })
            | CliError::Compression(CompressionError::EngineUnavailable) => {
                Some("Run 'pdfcompressor instructions' for manual install steps.")
            }
            CliError::Engine(EngineError::AlreadyInstalled { .. }) => {
                Some("Run 'pdfcompressor uninstall' first to reinstall the managed engine.")
            }
            CliError::Compression(CompressionError::Busy) => {
                Some("Wait for the running job to finish, then try again.")
            }
            _ => None,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Engine(e) => write!(f, "Engine error: {}", e),
            CliError::Compression(e) => write!(f, "Compression failed: {}", e),
            CliError::Setup(msg) => write!(f, "Startup failed: {}", msg),
            CliError::NothingSelected(what) => write!(f, "No {} selected", what),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Engine(e) => Some(e),
            CliError::Compression(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<CompressionError> for CliError {
    fn from(e: CompressionError) -> Self {
        CliError::Compression(e)
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Engine(e) => CliError::Engine(e),
            AppError::Compression(e) => CliError::Compression(e),
            AppError::Config(e) => e.into(),
        }
    }
}
