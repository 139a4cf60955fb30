//! Application error types.

use std::fmt;

use crate::compress::{CompressionError, ValidationError};
use crate::config::ConfigError;
use crate::engine::{EngineError, InstallError};

/// Errors surfaced by [`CompressorApp`](super::CompressorApp) commands.
#[derive(Debug)]
pub enum AppError {
    /// Engine download, install or uninstall failed.
    Engine(EngineError),

    /// A compression job failed or was rejected.
    Compression(CompressionError),

    /// Configuration error.
    Config(ConfigError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Engine(e) => write!(f, "Engine error: {}", e),
            AppError::Compression(e) => write!(f, "Compression failed: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Engine(e) => Some(e),
            AppError::Compression(e) => Some(e),
            AppError::Config(e) => Some(e),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<InstallError> for AppError {
    fn from(e: InstallError) -> Self {
        AppError::Engine(e.into())
    }
}

impl From<CompressionError> for AppError {
    fn from(e: CompressionError) -> Self {
        AppError::Compression(e)
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Compression(e.into())
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}
