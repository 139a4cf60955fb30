//! Compression engine lifecycle.
//!
//! Detects the engine, downloads and installs it, removes it again, and
//! broadcasts lifecycle events to observers.
//!
//! # Components
//!
//! - [`EngineProbe`] - side-effect free presence and version check
//! - [`DownloadManager`] - single-flight download with progress and cancellation
//! - [`Installer`] - atomic install, idempotent uninstall
//! - [`EventBus`] - ordered lifecycle events without replay
//! - [`StatusCell`] - shared [`EngineStatus`], written only by the download path

pub mod download;
mod error;
mod events;
mod installer;
mod probe;
mod status;

pub use download::{DownloadHandle, DownloadManager, DownloadSettings, HttpFetcher};
pub use error::{EngineError, EngineResult, InstallError};
pub use events::{EngineEvent, EventBus, Subscription};
pub use installer::{
    manual_install_instructions, InstallOutcome, InstallReceipt, Installer, RECEIPT_FILE,
};
pub use probe::{
    is_executable, parse_version, EngineProbe, InstalledEngine, ProbeSettings,
    DEFAULT_VERSION_TIMEOUT,
};
pub use status::{EngineLocation, EngineStatus, StatusCell};
