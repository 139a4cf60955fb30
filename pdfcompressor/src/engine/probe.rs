//! Engine presence detection.
//!
//! A probe is side-effect free: it looks for an executable at the managed
//! location (and optionally on `PATH`) and asks it for its version with a
//! short timeout. Anything short of a clean version answer counts as "not
//! installed".

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use super::status::{EngineLocation, EngineStatus};
use crate::platform::{Os, PlatformTarget};

/// Default bound on the `--version` invocation.
pub const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a running version check is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Upper bound for the version check.
    pub version_timeout: Duration,
    /// Also accept an engine found on `PATH`.
    pub search_system_path: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            version_timeout: DEFAULT_VERSION_TIMEOUT,
            search_system_path: true,
        }
    }
}

impl ProbeSettings {
    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    pub fn with_search_system_path(mut self, enabled: bool) -> Self {
        self.search_system_path = enabled;
        self
    }
}

/// An engine that answered the version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledEngine {
    pub location: EngineLocation,
    /// First line of the engine's version output.
    pub version_text: String,
    /// Parsed version, when the output contains one.
    pub version: Option<semver::Version>,
}

impl InstalledEngine {
    pub fn path(&self) -> &Path {
        self.location.path()
    }

    fn status(&self) -> EngineStatus {
        let version = self
            .version
            .as_ref()
            .map(|v| v.to_string())
            .or_else(|| Some(self.version_text.clone()));
        EngineStatus::installed(self.location.clone(), version)
    }
}

/// Checks whether the engine is installed and runnable.
#[derive(Debug, Clone)]
pub struct EngineProbe {
    target: PlatformTarget,
    settings: ProbeSettings,
}

impl EngineProbe {
    pub fn new(target: PlatformTarget, settings: ProbeSettings) -> Self {
        Self { target, settings }
    }

    pub fn target(&self) -> &PlatformTarget {
        &self.target
    }

    /// Current installation status. Download fields are always clear; they
    /// are tracked separately by the download manager.
    pub fn probe(&self) -> EngineStatus {
        match self.locate() {
            Some(engine) => engine.status(),
            None => EngineStatus::not_installed(),
        }
    }

    /// Whether the managed installation answers.
    pub fn managed_installed(&self) -> bool {
        self.check(&self.target.binary_path()).is_some()
    }

    /// Find a working engine, managed installation first.
    pub fn locate(&self) -> Option<InstalledEngine> {
        let managed = self.target.binary_path();
        if let Some((version_text, version)) = self.check(&managed) {
            return Some(InstalledEngine {
                location: EngineLocation::Managed(managed),
                version_text,
                version,
            });
        }

        if !self.settings.search_system_path {
            return None;
        }

        system_candidates(self.target.os)
            .into_iter()
            .find_map(|path| {
                self.check(&path).map(|(version_text, version)| InstalledEngine {
                    location: EngineLocation::System(path),
                    version_text,
                    version,
                })
            })
    }

    fn check(&self, path: &Path) -> Option<(String, Option<semver::Version>)> {
        if !is_executable(path) {
            return None;
        }
        match run_version_check(path, self.settings.version_timeout) {
            Ok(text) => {
                let version = parse_version(&text);
                Some((text, version))
            }
            Err(reason) => {
                debug!(path = %path.display(), reason = %reason, "Engine version check failed");
                None
            }
        }
    }
}

/// Whether `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Run `<path> --version`, bounded by `timeout`.
fn run_version_check(path: &Path, timeout: Duration) -> Result<String, String> {
    let mut child = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| format!("failed to spawn: {}", e))?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("timed out after {:?}", timeout));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(format!("failed to wait: {}", e)),
        }
    };

    if !status.success() {
        return Err(format!("exited with {}", status));
    }

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)
            .map_err(|e| format!("failed to read output: {}", e))?;
    }

    let first_line = stdout.lines().next().unwrap_or("").trim().to_string();
    if first_line.is_empty() {
        return Err("empty version output".to_string());
    }
    Ok(first_line)
}

/// Extract `major.minor[.patch]` from version output such as `10.03.1`.
pub fn parse_version(text: &str) -> Option<semver::Version> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| {
        Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is valid")
    });

    let caps = re.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some(semver::Version::new(major, minor, patch))
}

/// Engine executables to look for on `PATH`.
fn system_candidates(os: Os) -> Vec<PathBuf> {
    let names: &[&str] = match os {
        Os::Windows => &["gswin64c.exe", "gswin32c.exe"],
        _ => &["gs"],
    };
    let Some(path_var) = std::env::var_os("PATH") else {
        return Vec::new();
    };
    std::env::split_paths(&path_var)
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .collect()
}
