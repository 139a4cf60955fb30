//! Error types for compression jobs.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for compression operations.
pub type CompressionResult<T> = Result<T, CompressionError>;

/// Rejected job input. Raised before any subprocess is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("source file does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("source is not a regular file: {}", .0.display())]
    SourceNotFile(PathBuf),

    #[error("source is not a PDF document: {}", .0.display())]
    NotPdf(PathBuf),

    #[error("no destination path given")]
    EmptyDestination,

    #[error("destination is a directory: {}", .0.display())]
    DestinationIsDirectory(PathBuf),

    #[error("destination would overwrite the source: {}", .0.display())]
    SameFile(PathBuf),

    #[error("destination {} is not writable: {reason}", .path.display())]
    DestinationNotWritable { path: PathBuf, reason: String },

    #[error("unknown compression preset '{0}' (expected screen, ebook, printer or prepress)")]
    UnknownPreset(String),
}

/// Compression failures.
///
/// Engine failures carry the engine's diagnostic output so callers can show
/// why a job failed.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No engine installed and no fallback allowed.
    #[error("the compression engine is not installed")]
    EngineUnavailable,

    /// Another compression job is running.
    #[error("a compression job is already running")]
    Busy,

    #[error("failed to start engine {}: {source}", .path.display())]
    Spawn { path: PathBuf, source: io::Error },

    #[error("engine failed ({}): {}", exit_label(.code), .stderr.trim())]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("engine timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// The engine exited cleanly but produced nothing usable.
    #[error("engine reported success but produced no output at {}", .path.display())]
    ToolReportedSuccessButNoOutput { path: PathBuf },

    #[error("compression cancelled")]
    Cancelled,

    #[error("I/O error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    /// The built-in compressor could not process the document.
    #[error("built-in compression failed: {reason}")]
    Builtin { reason: String },
}

impl CompressionError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CompressionError::Io {
            path: path.into(),
            source,
        }
    }

    /// Engine diagnostic output, when the failure has any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            CompressionError::NonZeroExit { stderr, .. } => {
                Some(stderr.trim()).filter(|s| !s.is_empty())
            }
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
