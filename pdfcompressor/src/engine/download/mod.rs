//! Engine download management.
//!
//! This module fetches the engine artifact for the resolved platform and hands
//! it to the installer:
//! - Streaming transfer with retry and cancellation (`http`)
//! - SHA-256 checksum verification (`checksum`)
//! - Coalesced, monotonic progress (`progress`)
//! - Single-flight orchestration, status updates and events (`manager`)
//!
//! # Architecture
//!
//! ```text
//! DownloadManager (single download in flight)
//!         │
//!         ├── HttpFetcher (retrying streamed GET into a staging file)
//!         │       └── ProgressTracker (bytes → 0-100)
//!         │
//!         ├── Installer (atomic promotion of the staged artifact)
//!         │
//!         ├── StatusCell (shared status, single writer)
//!         │
//!         └── EventBus (download-progress / engine-installed / engine-install-failed)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let handle = manager.start_download()?;
//! // ... observe events via the bus, or:
//! handle.wait().await?;
//! ```

pub mod checksum;
pub mod http;
mod manager;
pub mod progress;

pub use http::{DownloadSettings, HttpFetcher};
pub use manager::{DownloadHandle, DownloadManager};
pub use progress::ProgressTracker;
