//! Single-flight engine download and install.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::http::HttpFetcher;
use super::progress::ProgressTracker;
use crate::engine::error::{EngineError, EngineResult, InstallError};
use crate::engine::events::{EngineEvent, EventBus};
use crate::engine::installer::Installer;
use crate::engine::probe::EngineProbe;
use crate::engine::status::StatusCell;
use crate::platform::{DownloadSource, Resolution};

/// Staged artifacts share the installer's staging prefix so an interrupted
/// download is cleaned up by the next uninstall.
const STAGING_FILE_PREFIX: &str = ".install-";

struct Shared {
    resolution: Resolution,
    probe: EngineProbe,
    installer: Installer,
    fetcher: HttpFetcher,
    status: Arc<StatusCell>,
    events: EventBus,
    in_flight: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Runs at most one engine download at a time.
///
/// The manager is the only writer of the shared [`StatusCell`]: it marks the
/// transfer as started, raises progress, and settles the status when the
/// download ends. Every download ends with exactly one terminal event,
/// [`EngineEvent::Installed`] or [`EngineEvent::InstallFailed`].
#[derive(Clone)]
pub struct DownloadManager {
    shared: Arc<Shared>,
}

impl DownloadManager {
    pub fn new(
        resolution: Resolution,
        probe: EngineProbe,
        installer: Installer,
        fetcher: HttpFetcher,
        status: Arc<StatusCell>,
        events: EventBus,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                resolution,
                probe,
                installer,
                fetcher,
                status,
                events,
                in_flight: AtomicBool::new(false),
                cancel: Mutex::new(None),
            }),
        }
    }

    /// Begin downloading and installing the engine in the background.
    ///
    /// Returns immediately without touching the engine binary. Must be called
    /// from within a Tokio runtime. The background task first checks for a
    /// working engine and ends with [`EngineError::AlreadyInstalled`] when one
    /// answers.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Unsupported`] when no artifact exists for the platform
    /// - [`EngineError::AlreadyInProgress`] when a download is running
    pub fn start_download(&self) -> EngineResult<DownloadHandle> {
        let shared = &self.shared;
        let Some(source) = shared.resolution.source().cloned() else {
            let target = shared.resolution.target();
            return Err(EngineError::Unsupported {
                os: target.os,
                arch: target.arch,
            });
        };

        if shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::AlreadyInProgress);
        }
        let active = ActiveDownload {
            shared: Arc::clone(shared),
        };

        let token = CancellationToken::new();
        *shared.cancel.lock() = Some(token.clone());
        shared.status.begin_download();
        info!(url = %source.url, "Starting engine download");

        let join = tokio::spawn(run(active, source, token.clone()));
        Ok(DownloadHandle {
            join,
            cancel: token,
        })
    }

    /// Request cancellation of the running download.
    ///
    /// Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        match self.shared.cancel.lock().as_ref() {
            Some(token) => {
                info!("Cancelling engine download");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a download is in flight.
    pub fn is_active(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }
}

/// Holds the single-flight slot; releasing happens on drop.
struct ActiveDownload {
    shared: Arc<Shared>,
}

impl Drop for ActiveDownload {
    fn drop(&mut self) {
        *self.shared.cancel.lock() = None;
        self.shared.in_flight.store(false, Ordering::Release);
    }
}

async fn run(
    active: ActiveDownload,
    source: DownloadSource,
    cancel: CancellationToken,
) -> EngineResult<()> {
    let shared = Arc::clone(&active.shared);
    let staging = shared.staging_path(&source);

    let result = match shared.installed_engine().await {
        Ok(Some(path)) => Err(EngineError::AlreadyInstalled { path }),
        Ok(None) => shared.fetch_and_install(&source, &staging, &cancel).await,
        Err(e) => Err(e),
    };

    if let Err(e) = tokio::fs::remove_file(&staging).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %staging.display(), error = %e, "Failed to remove staged artifact");
        }
    }

    match &result {
        Ok(()) => shared.status.finish_install(),
        Err(_) => shared.status.reset(),
    }
    // Free the slot before announcing the outcome so observers may retry
    // straight from the event.
    drop(active);

    match &result {
        Ok(()) => {
            shared.events.emit(EngineEvent::DownloadProgress(100));
            shared.events.emit(EngineEvent::Installed);
        }
        Err(EngineError::Cancelled) => {
            info!("Engine download cancelled");
            shared.events.emit(EngineEvent::InstallFailed(EngineError::Cancelled.to_string()));
        }
        Err(e @ EngineError::AlreadyInstalled { .. }) => {
            info!(error = %e, "Engine download skipped");
            shared.events.emit(EngineEvent::InstallFailed(e.to_string()));
        }
        Err(e) => {
            error!(error = %e, "Engine download failed");
            shared.events.emit(EngineEvent::InstallFailed(e.to_string()));
        }
    }
    result
}

impl Shared {
    fn staging_path(&self, source: &DownloadSource) -> PathBuf {
        self.installer.target().install_dir.join(format!(
            "{}{}.part",
            STAGING_FILE_PREFIX,
            source.file_name()
        ))
    }

    /// Path of an engine that already answers its version check.
    ///
    /// The check spawns the engine, so it runs on the blocking pool.
    async fn installed_engine(&self) -> EngineResult<Option<PathBuf>> {
        let probe = self.probe.clone();
        let binary = probe.target().binary_path();
        let located = tokio::task::spawn_blocking(move || probe.locate())
            .await
            .map_err(|e| InstallError::io(binary, io::Error::other(e)))?;
        Ok(located.map(|engine| engine.path().to_path_buf()))
    }

    async fn fetch_and_install(
        &self,
        source: &DownloadSource,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> EngineResult<()> {
        let install_dir = &self.installer.target().install_dir;
        tokio::fs::create_dir_all(install_dir)
            .await
            .map_err(|e| InstallError::io(install_dir, e))?;

        let mut tracker = ProgressTracker::new(self.fetcher.settings().progress_interval);
        let mut on_progress = |pct: u8| {
            self.status.set_progress(pct);
            self.events.emit(EngineEvent::DownloadProgress(pct));
        };
        let bytes = self
            .fetcher
            .fetch_to_file(&source.url, staging, &mut tracker, cancel, &mut on_progress)
            .await?;
        info!(bytes, "Engine artifact downloaded");

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let installer = self.installer.clone();
        let artifact = staging.to_path_buf();
        let artifact_source = source.clone();
        let outcome = tokio::task::spawn_blocking(move || installer.install(&artifact, &artifact_source))
            .await
            .map_err(|e| InstallError::io(staging, io::Error::other(e)))??;

        let probe = self.probe.clone();
        let runs = tokio::task::spawn_blocking(move || probe.managed_installed())
            .await
            .unwrap_or(false);
        if !runs {
            warn!(binary = %outcome.binary_path.display(), "Installed engine did not answer its version check");
            let installer = self.installer.clone();
            if let Ok(Err(e)) = tokio::task::spawn_blocking(move || installer.uninstall()).await {
                debug!(error = %e, "Rollback of unusable engine failed");
            }
            return Err(InstallError::corrupt("installed engine failed its version check").into());
        }

        info!(binary = %outcome.binary_path.display(), "Engine ready");
        Ok(())
    }
}

/// Handle to a running download.
#[derive(Debug)]
pub struct DownloadHandle {
    join: JoinHandle<EngineResult<()>>,
    cancel: CancellationToken,
}

impl DownloadHandle {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this download, for wiring into signal handlers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the download and install to finish.
    pub async fn wait(self) -> EngineResult<()> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(EngineError::Cancelled),
        }
    }
}
