//! Error types for the engine lifecycle.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::platform::{Arch, Os};

/// Result type for engine lifecycle operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by download, install and uninstall.
///
/// Variants are structured so callers branch on them directly; in particular
/// [`EngineError::Unsupported`] means "point the user at manual install".
#[derive(Debug, Error)]
pub enum EngineError {
    /// No download is registered for this platform.
    #[error("no engine download is available for {os}-{arch}; install it manually")]
    Unsupported { os: Os, arch: Arch },

    /// A download is already running.
    #[error("an engine download is already in progress")]
    AlreadyInProgress,

    /// The engine is already installed.
    #[error("the engine is already installed at {}", .path.display())]
    AlreadyInstalled { path: PathBuf },

    /// Transfer failed after exhausting retries.
    #[error("failed to download {url} after {attempts} attempt(s): {reason}")]
    Network {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Staging or installing the artifact failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// The download was cancelled.
    #[error("download cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network { .. } | EngineError::Cancelled)
    }
}

/// Installation failures. Never retried automatically.
#[derive(Debug, Error)]
pub enum InstallError {
    /// Filesystem failure such as a full disk.
    #[error("disk error at {}: {source}", .path.display())]
    Disk { path: PathBuf, source: io::Error },

    /// The process may not write to the install location.
    #[error("permission denied at {}: {source}", .path.display())]
    Permission { path: PathBuf, source: io::Error },

    /// The artifact is unusable: bad checksum, unknown format, missing or
    /// empty executable.
    #[error("corrupt engine artifact: {reason}")]
    Corrupt { reason: String },
}

impl InstallError {
    /// Classify an io error for a path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => InstallError::Permission { path, source },
            _ => InstallError::Disk { path, source },
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        InstallError::Corrupt {
            reason: reason.into(),
        }
    }

    /// Checksum mismatch, reported as corruption.
    pub fn checksum_mismatch(filename: &str, expected: &str, actual: &str) -> Self {
        InstallError::corrupt(format!(
            "checksum mismatch for {}: expected {}, got {}",
            filename, expected, actual
        ))
    }
}
