//! PDF Compressor - managed Ghostscript engine and PDF compression jobs
//!
//! This library locates, downloads and installs the Ghostscript engine for the
//! current platform and runs compression jobs through it, falling back to a
//! structural lopdf pass when no engine is available.
//!
//! Front ends drive everything through [`app::CompressorApp`] and observe
//! download progress as [`engine::EngineEvent`]s.

pub mod app;
pub mod compress;
pub mod config;
pub mod engine;
pub mod logging;
pub mod platform;

pub use app::{AppConfig, AppError, CompressorApp};
pub use compress::{CompressedResult, CompressionError, CompressionPreset};
pub use engine::{EngineError, EngineEvent, EngineStatus};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
