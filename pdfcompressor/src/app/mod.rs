//! Application facade.
//!
//! This module provides `CompressorApp`, which wires the platform resolver,
//! probe, download manager, installer, job runner and event bus together and
//! exposes one method per front-end command:
//!
//! | Command | Method |
//! |---|---|
//! | check_status | [`CompressorApp::check_status`] |
//! | download_engine | [`CompressorApp::download_engine`] |
//! | uninstall_engine | [`CompressorApp::uninstall_engine`] |
//! | manual_install_instructions | [`CompressorApp::manual_install_instructions`] |
//! | select_input_file | [`CompressorApp::select_input_file`] |
//! | select_output_path | [`CompressorApp::select_output_path`] |
//! | compress | [`CompressorApp::compress`] |
//!
//! # Example
//!
//! ```ignore
//! use pdfcompressor::app::{AppConfig, CompressorApp};
//!
//! let app = CompressorApp::new(AppConfig::default());
//! let mut events = app.subscribe();
//! let status = app.check_status();
//! if !status.installed {
//!     app.download_engine()?;
//! }
//! ```

mod bootstrap;
mod config;
mod dialog;
mod error;

pub use bootstrap::CompressorApp;
pub use config::AppConfig;
pub use dialog::{suggested_output_path, FileDialog, NoDialog};
pub use error::AppError;
