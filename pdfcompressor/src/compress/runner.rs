//! Compression job execution.
//!
//! One job runs at a time; a second request while one is running fails fast
//! with [`CompressionError::Busy`]. Output is written to a temporary file next
//! to the destination and moved into place only once it is confirmed
//! non-empty, so a failed job never touches an existing destination.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::process::Command;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::builtin::compress_builtin;
use super::error::{CompressionError, CompressionResult};
use super::ghostscript::ghostscript_args;
use super::job::CompressionJob;
use super::preset::CompressionPreset;
use crate::engine::EngineProbe;

/// Default bound on one engine invocation.
pub const DEFAULT_COMPRESSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Prefix of in-progress output files.
const TEMP_PREFIX: &str = ".pdfcompressor-";

/// Engine diagnostics kept in errors.
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Upper bound for one engine invocation.
    pub timeout: Duration,
    /// Use the built-in compressor when no engine is installed.
    pub builtin_fallback: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMPRESSION_TIMEOUT,
            builtin_fallback: true,
        }
    }
}

impl RunnerSettings {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_builtin_fallback(mut self, enabled: bool) -> Self {
        self.builtin_fallback = enabled;
        self
    }
}

/// How a document was compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMethod {
    /// The external engine.
    Engine,
    /// The built-in structural compressor.
    Builtin,
}

/// A finished compression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedResult {
    pub destination: PathBuf,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub method: CompressionMethod,
    pub preset: CompressionPreset,
}

impl CompressedResult {
    /// Fraction of the input saved. Negative when the output grew.
    pub fn reduction(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        1.0 - self.output_bytes as f64 / self.input_bytes as f64
    }

    /// One-line description for display.
    pub fn summary(&self) -> String {
        let pct = self.reduction() * 100.0;
        if pct >= 0.0 {
            format!(
                "compressed by {:.1}% ({} -> {} bytes)",
                pct, self.input_bytes, self.output_bytes
            )
        } else {
            format!(
                "output grew by {:.1}% ({} -> {} bytes)",
                -pct, self.input_bytes, self.output_bytes
            )
        }
    }
}

enum Method {
    Engine(PathBuf),
    Builtin,
}

/// Executes compression jobs against the installed engine.
#[derive(Debug)]
pub struct JobRunner {
    probe: EngineProbe,
    settings: RunnerSettings,
    busy: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

impl JobRunner {
    pub fn new(probe: EngineProbe, settings: RunnerSettings) -> Self {
        Self {
            probe,
            settings,
            busy: AtomicBool::new(false),
            cancel: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Whether a job is running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Cancel the running job. Returns `false` when none was running.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock().as_ref() {
            Some(token) => {
                info!("Cancelling compression");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run a job to completion.
    pub async fn compress(&self, job: CompressionJob) -> CompressionResult<CompressedResult> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CompressionError::Busy);
        }
        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());
        let _slot = BusySlot { runner: self };

        let probe = self.probe.clone();
        let binary = probe.target().binary_path();
        let engine = tokio::task::spawn_blocking(move || probe.locate())
            .await
            .map_err(|e| engine_lookup_failed(binary, e))?;
        let method = match engine {
            Some(engine) => Method::Engine(engine.path().to_path_buf()),
            None if self.settings.builtin_fallback => Method::Builtin,
            None => return Err(CompressionError::EngineUnavailable),
        };

        self.run(&job, method, &token).await
    }

    async fn run(
        &self,
        job: &CompressionJob,
        method: Method,
        cancel: &CancellationToken,
    ) -> CompressionResult<CompressedResult> {
        let source = job.source();
        let destination = job.destination();
        let input_bytes = tokio::fs::metadata(source)
            .await
            .map_err(|e| CompressionError::io(source, e))?
            .len();

        let parent = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CompressionError::io(parent, e))?;
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| CompressionError::io(parent, e))?;
        let temp_path = temp.path().to_path_buf();

        info!(
            source = %source.display(),
            destination = %destination.display(),
            preset = %job.preset(),
            "Compressing document"
        );

        let method = match method {
            Method::Engine(engine) => {
                self.run_engine(&engine, job, &temp_path, cancel).await?;
                CompressionMethod::Engine
            }
            Method::Builtin => {
                let (input, output, preset) = (source.to_path_buf(), temp_path.clone(), job.preset());
                tokio::task::spawn_blocking(move || compress_builtin(&input, &output, preset))
                    .await
                    .map_err(|e| CompressionError::Builtin {
                        reason: e.to_string(),
                    })??;
                CompressionMethod::Builtin
            }
        };

        if cancel.is_cancelled() {
            return Err(CompressionError::Cancelled);
        }

        let output_bytes = match tokio::fs::metadata(&temp_path).await {
            Ok(m) if m.len() > 0 => m.len(),
            _ => {
                return Err(CompressionError::ToolReportedSuccessButNoOutput {
                    path: destination.to_path_buf(),
                })
            }
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o644);
            tokio::fs::set_permissions(&temp_path, perms)
                .await
                .map_err(|e| CompressionError::io(&temp_path, e))?;
        }

        temp.persist(destination)
            .map_err(|e| CompressionError::io(destination, e.error))?;

        let result = CompressedResult {
            destination: destination.to_path_buf(),
            input_bytes,
            output_bytes,
            method,
            preset: job.preset(),
        };
        if output_bytes > input_bytes {
            warn!(
                input_bytes,
                output_bytes,
                "Compressed output is larger than the source"
            );
        }
        info!(destination = %destination.display(), "{}", result.summary());
        Ok(result)
    }

    async fn run_engine(
        &self,
        engine: &Path,
        job: &CompressionJob,
        output: &Path,
        cancel: &CancellationToken,
    ) -> CompressionResult<()> {
        let args = ghostscript_args(job.preset(), job.source(), output);
        debug!(engine = %engine.display(), ?args, "Spawning engine");

        let child = Command::new(engine)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CompressionError::Spawn {
                path: engine.to_path_buf(),
                source,
            })?;

        // Dropping the wait future kills the child.
        let timeout = self.settings.timeout;
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CompressionError::Cancelled),
            waited = tokio::time::timeout(timeout, child.wait_with_output()) => match waited {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(CompressionError::io(engine, e)),
                Err(_) => {
                    warn!(?timeout, "Engine timed out, killing it");
                    return Err(CompressionError::Timeout { after: timeout });
                }
            },
        };

        if !output.status.success() {
            let stderr = diagnostics(&output.stderr, &output.stdout);
            warn!(code = ?output.status.code(), stderr = %stderr, "Engine failed");
            return Err(CompressionError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }
        Ok(())
    }
}

/// Releases the single-job slot.
struct BusySlot<'a> {
    runner: &'a JobRunner,
}

impl Drop for BusySlot<'_> {
    fn drop(&mut self) {
        *self.runner.cancel.lock() = None;
        self.runner.busy.store(false, Ordering::Release);
    }
}

/// Engine output worth showing: stderr, else stdout, tail-truncated.
fn diagnostics(stderr: &[u8], stdout: &[u8]) -> String {
    let raw = if stderr.iter().any(|b| !b.is_ascii_whitespace()) {
        stderr
    } else {
        stdout
    };
    let start = raw.len().saturating_sub(MAX_DIAGNOSTIC_BYTES);
    String::from_utf8_lossy(&raw[start..]).trim().to_string()
}

/// A crashed engine lookup is a failure, not an absent engine.
fn engine_lookup_failed(binary: PathBuf, err: JoinError) -> CompressionError {
    warn!(binary = %binary.display(), error = %err, "Engine lookup did not complete");
    CompressionError::Spawn {
        path: binary,
        source: io::Error::other(err.to_string()),
    }
}
