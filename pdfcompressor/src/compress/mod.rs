//! PDF compression jobs.
//!
//! A [`CompressionJob`] is validated up front, then handed to the
//! [`JobRunner`], which uses the installed engine when there is one and the
//! built-in compressor otherwise (unless that fallback is disabled).

mod builtin;
mod error;
mod ghostscript;
mod job;
mod preset;
mod runner;

pub use builtin::compress_builtin;
pub use error::{CompressionError, CompressionResult, ValidationError};
pub use ghostscript::{ghostscript_args, numeric_arg};
pub use job::{normalize_destination, CompressionJob, PDF_EXTENSION};
pub use preset::{CompressionPreset, PresetParams};
pub use runner::{
    CompressedResult, CompressionMethod, JobRunner, RunnerSettings, DEFAULT_COMPRESSION_TIMEOUT,
};
