//! `CompressorApp` - the command surface front ends talk to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::config::AppConfig;
use super::dialog::{suggested_output_path, FileDialog, NoDialog};
use super::error::AppError;
use crate::compress::{
    normalize_destination, CompressedResult, CompressionJob, CompressionPreset, CompressionResult,
    JobRunner, ValidationError, PDF_EXTENSION,
};
use crate::engine::{
    manual_install_instructions, DownloadHandle, DownloadManager, EngineError, EngineProbe,
    EngineResult, EngineStatus, EventBus, HttpFetcher, Installer, StatusCell, Subscription,
};
use crate::platform::Resolution;

/// Owns every lifecycle component and exposes one method per front-end
/// command.
///
/// Observers should [`subscribe`](Self::subscribe) first and then call
/// [`check_status`](Self::check_status) once: events are not replayed.
pub struct CompressorApp {
    resolution: Resolution,
    probe: EngineProbe,
    installer: Installer,
    status: Arc<StatusCell>,
    events: EventBus,
    downloads: DownloadManager,
    runner: JobRunner,
    dialog: Box<dyn FileDialog>,
}

impl CompressorApp {
    /// Wire all components. Performs no I/O.
    pub fn new(config: AppConfig) -> Self {
        let resolution = config.resolver.resolve();
        let target = resolution.target().clone();
        info!(
            os = %target.os,
            arch = %target.arch,
            install_dir = %target.install_dir.display(),
            downloadable = resolution.is_downloadable(),
            "Resolved platform"
        );

        let probe = EngineProbe::new(target.clone(), config.probe);
        let installer = Installer::new(target);
        let status = Arc::new(StatusCell::new());
        let events = EventBus::new();
        let downloads = DownloadManager::new(
            resolution.clone(),
            probe.clone(),
            installer.clone(),
            HttpFetcher::new(config.download),
            Arc::clone(&status),
            events.clone(),
        );
        let runner = JobRunner::new(probe.clone(), config.runner);

        Self {
            resolution,
            probe,
            installer,
            status,
            events,
            downloads,
            runner,
            dialog: Box::new(NoDialog),
        }
    }

    /// Use a front-end file dialog.
    pub fn with_dialog(mut self, dialog: impl FileDialog + 'static) -> Self {
        self.dialog = Box::new(dialog);
        self
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Current engine status, including any download in flight.
    pub fn check_status(&self) -> EngineStatus {
        self.status.merge(self.probe.probe())
    }

    /// Start downloading the engine. Progress arrives as events.
    pub fn download_engine(&self) -> EngineResult<DownloadHandle> {
        self.downloads.start_download()
    }

    /// Cancel the running download. Returns `false` when none was running.
    pub fn cancel_download(&self) -> bool {
        self.downloads.cancel()
    }

    /// Remove the managed engine. Returns whether anything was removed.
    ///
    /// Refused while a download is running.
    pub fn uninstall_engine(&self) -> EngineResult<bool> {
        if self.downloads.is_active() {
            return Err(EngineError::AlreadyInProgress);
        }
        Ok(self.installer.uninstall()?)
    }

    /// Platform-specific manual install guidance.
    pub fn manual_install_instructions(&self) -> String {
        manual_install_instructions(self.resolution.target())
    }

    /// Ask the user for a document. Non-PDF selections are rejected.
    pub fn select_input_file(&self) -> Result<Option<PathBuf>, AppError> {
        let Some(path) = self.dialog.pick_input_file() else {
            return Ok(None);
        };
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(PDF_EXTENSION));
        if !is_pdf {
            warn!(path = %path.display(), "Rejected non-PDF selection");
            return Err(ValidationError::NotPdf(path).into());
        }
        Ok(Some(path))
    }

    /// Ask the user where to save. The answer gets a `.pdf` extension.
    pub fn select_output_path(&self, input: Option<&Path>) -> Result<Option<PathBuf>, AppError> {
        let suggested = input.map(suggested_output_path);
        match self.dialog.pick_output_path(suggested.as_deref()) {
            Some(path) => Ok(Some(normalize_destination(&path)?)),
            None => Ok(None),
        }
    }

    /// Compress `source` into `destination` with the named preset.
    pub async fn compress(
        &self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        preset_id: &str,
    ) -> CompressionResult<CompressedResult> {
        let preset: CompressionPreset = preset_id.parse()?;
        let job = CompressionJob::new(source, destination, preset)?;
        self.runner.compress(job).await
    }

    /// Cancel the running compression. Returns `false` when none was running.
    pub fn cancel_compression(&self) -> bool {
        self.runner.cancel()
    }

    /// Receive lifecycle events emitted from now on.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Available presets, least to most quality.
    pub fn presets(&self) -> &'static [CompressionPreset] {
        &CompressionPreset::ALL
    }
}
