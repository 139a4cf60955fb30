//! Shared engine status record.
//!
//! `StatusCell` is written only by the download/install path and read by any
//! number of observers. Mutators are crate-private so the single-writer rule
//! holds by construction.

use std::path::PathBuf;

use parking_lot::RwLock;
use serde::Serialize;

/// Snapshot of the engine's installation and download state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// An executable engine answered a version check.
    pub installed: bool,
    /// A download is in flight. Always false when `installed` is true.
    pub downloading: bool,
    /// Download progress, 0-100. Meaningful only while `downloading`.
    pub progress: u8,
    /// Where the engine was found, if installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<EngineLocation>,
    /// Version the engine reported, if installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl EngineStatus {
    /// Status for a fresh install.
    pub fn installed(location: EngineLocation, version: Option<String>) -> Self {
        Self {
            installed: true,
            downloading: false,
            progress: 100,
            location: Some(location),
            version,
        }
    }

    pub fn not_installed() -> Self {
        Self::default()
    }
}

/// Where an installed engine lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum EngineLocation {
    /// Installed by this application into its install directory.
    Managed(PathBuf),
    /// Found on the system `PATH`.
    System(PathBuf),
}

impl EngineLocation {
    pub fn path(&self) -> &PathBuf {
        match self {
            EngineLocation::Managed(p) | EngineLocation::System(p) => p,
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, EngineLocation::Managed(_))
    }
}

/// Download-side state tracked between probes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Transfer {
    downloading: bool,
    progress: u8,
}

/// Process-wide status cell with single-writer discipline.
#[derive(Debug, Default)]
pub struct StatusCell {
    inner: RwLock<Transfer>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a download is currently marked in flight.
    pub fn is_downloading(&self) -> bool {
        self.inner.read().downloading
    }

    /// Current download progress.
    pub fn progress(&self) -> u8 {
        self.inner.read().progress
    }

    /// Merge a probe result with the tracked transfer state.
    ///
    /// An installed engine always reports `downloading = false`.
    pub fn merge(&self, probed: EngineStatus) -> EngineStatus {
        if probed.installed {
            return EngineStatus {
                downloading: false,
                progress: 100,
                ..probed
            };
        }
        let transfer = *self.inner.read();
        EngineStatus {
            downloading: transfer.downloading,
            progress: if transfer.downloading {
                transfer.progress
            } else {
                0
            },
            ..probed
        }
    }

    /// Mark a download as started. Progress resets to 0.
    pub(crate) fn begin_download(&self) {
        *self.inner.write() = Transfer {
            downloading: true,
            progress: 0,
        };
    }

    /// Raise progress. Values are clamped to 100 and never decrease.
    pub(crate) fn set_progress(&self, progress: u8) {
        let mut transfer = self.inner.write();
        if transfer.downloading {
            transfer.progress = transfer.progress.max(progress.min(100));
        }
    }

    /// Download and install finished successfully.
    pub(crate) fn finish_install(&self) {
        *self.inner.write() = Transfer {
            downloading: false,
            progress: 100,
        };
    }

    /// Download or install failed or was cancelled.
    pub(crate) fn reset(&self) {
        *self.inner.write() = Transfer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let cell = StatusCell::new();
        cell.begin_download();
        cell.set_progress(40);
        cell.set_progress(20);
        assert_eq!(cell.progress(), 40);
        cell.set_progress(250);
        assert_eq!(cell.progress(), 100);
    }

    #[test]
    fn test_progress_ignored_when_not_downloading() {
        let cell = StatusCell::new();
        cell.set_progress(50);
        assert_eq!(cell.progress(), 0);
    }

    #[test]
    fn test_begin_download_resets_progress() {
        let cell = StatusCell::new();
        cell.begin_download();
        cell.set_progress(70);
        cell.reset();
        cell.begin_download();
        assert_eq!(cell.progress(), 0);
        assert!(cell.is_downloading());
    }

    #[test]
    fn test_merge_installed_never_downloading() {
        let cell = StatusCell::new();
        cell.begin_download();
        cell.set_progress(30);

        let merged = cell.merge(EngineStatus::installed(
            EngineLocation::Managed(PathBuf::from("/opt/gs")),
            Some("10.3.1".into()),
        ));
        assert!(merged.installed);
        assert!(!merged.downloading);
    }

    #[test]
    fn test_merge_not_installed_reports_transfer() {
        let cell = StatusCell::new();
        cell.begin_download();
        cell.set_progress(30);

        let merged = cell.merge(EngineStatus::not_installed());
        assert!(!merged.installed);
        assert!(merged.downloading);
        assert_eq!(merged.progress, 30);

        cell.reset();
        let merged = cell.merge(EngineStatus::not_installed());
        assert_eq!(merged, EngineStatus::not_installed());
    }

    #[test]
    fn test_status_serializes_for_ui() {
        let status = EngineStatus::installed(
            EngineLocation::System(PathBuf::from("/usr/bin/gs")),
            Some("10.2.1".into()),
        );
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["installed"], true);
        assert_eq!(json["location"]["kind"], "system");
        assert_eq!(json["location"]["path"], "/usr/bin/gs");
    }
}
