//! Engine installation and removal.
//!
//! Installation stages everything in a temporary directory inside the install
//! directory, so the final moves are same-filesystem renames:
//!
//! 1. Verify the artifact checksum (when known)
//! 2. Unpack the artifact into the staging directory
//! 3. Locate and validate the executable (present, non-empty, executable)
//! 4. Move auxiliary files (docs, install receipt) into place
//! 5. Rename the executable into its final path
//!
//! The executable is moved last. A probe therefore either sees no binary or a
//! complete installation, never a half-written one.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tar::Archive;
use tracing::{debug, info, warn};

use super::download::checksum::{calculate_file_checksum, verify_checksum};
use super::error::InstallError;
use crate::platform::{ArtifactFormat, DownloadSource, Os, PlatformTarget};

/// Receipt describing a managed installation.
pub const RECEIPT_FILE: &str = "engine.json";

/// Directory for licence and readme files shipped with the engine.
const DOC_DIR: &str = "doc";

/// Prefix of per-install staging directories.
const STAGING_PREFIX: &str = ".install-";

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Archive files worth keeping next to the engine.
const DOC_PREFIXES: &[&str] = &["LICENSE", "COPYING", "README", "NEWS"];

/// Record of what an installation put on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    /// Artifact URL the engine came from.
    pub source_url: String,
    /// SHA-256 of the artifact.
    pub sha256: String,
    /// Engine version, when the source declared one.
    pub version: Option<String>,
    /// Seconds since the Unix epoch.
    pub installed_at: u64,
    /// Executable file name.
    pub binary: String,
    /// Auxiliary files, relative to the install directory.
    pub files: Vec<PathBuf>,
}

/// Result of a successful installation.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub binary_path: PathBuf,
    pub receipt: InstallReceipt,
}

/// Installs and removes the managed engine.
#[derive(Debug, Clone)]
pub struct Installer {
    target: PlatformTarget,
}

impl Installer {
    pub fn new(target: PlatformTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &PlatformTarget {
        &self.target
    }

    fn receipt_path(&self) -> PathBuf {
        self.target.install_dir.join(RECEIPT_FILE)
    }

    /// Read the install receipt, if a readable one exists.
    pub fn read_receipt(&self) -> Option<InstallReceipt> {
        let data = fs::read(self.receipt_path()).ok()?;
        match serde_json::from_slice(&data) {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable install receipt");
                None
            }
        }
    }

    /// Install a downloaded artifact.
    ///
    /// On failure nothing new remains in the install directory.
    pub fn install(
        &self,
        staged_artifact: &Path,
        source: &DownloadSource,
    ) -> Result<InstallOutcome, InstallError> {
        let install_dir = &self.target.install_dir;
        info!(
            artifact = %staged_artifact.display(),
            install_dir = %install_dir.display(),
            "Installing engine"
        );

        let sha256 = match &source.sha256 {
            Some(expected) => {
                verify_checksum(staged_artifact, expected)?;
                expected.clone()
            }
            None => calculate_file_checksum(staged_artifact)?,
        };

        fs::create_dir_all(install_dir).map_err(|e| InstallError::io(install_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(install_dir)
            .map_err(|e| InstallError::io(install_dir, e))?;

        let mut moved = Vec::new();
        let result = self.install_staged(staged_artifact, source, sha256, staging.path(), &mut moved);

        if result.is_err() {
            for path in moved.iter().rev() {
                if let Err(e) = fs::remove_file(path) {
                    debug!(path = %path.display(), error = %e, "Rollback removal failed");
                }
            }
            remove_dir_if_empty(&install_dir.join(DOC_DIR));
        }
        // `staging` drops here, removing the extraction leftovers.
        result
    }

    fn install_staged(
        &self,
        artifact: &Path,
        source: &DownloadSource,
        sha256: String,
        staging: &Path,
        moved: &mut Vec<PathBuf>,
    ) -> Result<InstallOutcome, InstallError> {
        let install_dir = &self.target.install_dir;

        let unpacked = match &source.format {
            ArtifactFormat::TarGz => {
                let extract_dir = staging.join("extracted");
                extract_tar_gz(artifact, &extract_dir)?;
                let wanted = source
                    .archive_binary
                    .as_deref()
                    .unwrap_or(&self.target.binary_name);
                let binary = find_file(&extract_dir, wanted)?.ok_or_else(|| {
                    InstallError::corrupt(format!("archive does not contain '{}'", wanted))
                })?;
                let docs = collect_docs(binary.parent().unwrap_or(extract_dir.as_path()))?;
                Unpacked { binary, docs }
            }
            ArtifactFormat::Executable => {
                let binary = staging.join("engine");
                fs::copy(artifact, &binary).map_err(|e| InstallError::io(&binary, e))?;
                Unpacked {
                    binary,
                    docs: Vec::new(),
                }
            }
            ArtifactFormat::Unknown(ext) => {
                return Err(InstallError::corrupt(format!(
                    "unsupported artifact format '.{}'",
                    ext
                )));
            }
        };

        let prepared = staging.join(format!("{}.new", self.target.binary_name));
        fs::rename(&unpacked.binary, &prepared).map_err(|e| InstallError::io(&prepared, e))?;
        validate_executable(&prepared)?;

        let mut files = Vec::new();
        if !unpacked.docs.is_empty() {
            let doc_dir = install_dir.join(DOC_DIR);
            fs::create_dir_all(&doc_dir).map_err(|e| InstallError::io(&doc_dir, e))?;
            for doc in &unpacked.docs {
                let Some(name) = doc.file_name() else { continue };
                let dest = doc_dir.join(name);
                fs::rename(doc, &dest).map_err(|e| InstallError::io(&dest, e))?;
                moved.push(dest);
                files.push(Path::new(DOC_DIR).join(name));
            }
        }

        let receipt = InstallReceipt {
            source_url: source.url.clone(),
            sha256,
            version: source.version.clone(),
            installed_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            binary: self.target.binary_name.clone(),
            files,
        };
        let receipt_tmp = staging.join(format!("{}.new", RECEIPT_FILE));
        let json = serde_json::to_vec_pretty(&receipt)
            .map_err(|e| InstallError::io(&receipt_tmp, io::Error::other(e)))?;
        fs::write(&receipt_tmp, json).map_err(|e| InstallError::io(&receipt_tmp, e))?;
        let receipt_path = self.receipt_path();
        fs::rename(&receipt_tmp, &receipt_path).map_err(|e| InstallError::io(&receipt_path, e))?;
        moved.push(receipt_path);

        let binary_path = self.target.binary_path();
        fs::rename(&prepared, &binary_path).map_err(|e| InstallError::io(&binary_path, e))?;

        info!(binary = %binary_path.display(), "Engine installed");
        Ok(InstallOutcome {
            binary_path,
            receipt,
        })
    }

    /// Remove the managed installation.
    ///
    /// Returns `true` if anything was removed. Files already gone are not an
    /// error, so repeated calls are safe.
    pub fn uninstall(&self) -> Result<bool, InstallError> {
        let install_dir = &self.target.install_dir;
        let mut removed = false;

        if let Some(receipt) = self.read_receipt() {
            for file in receipt.files.iter().filter(|f| is_contained(f)) {
                removed |= remove_file_if_exists(&install_dir.join(file))?;
            }
        }
        removed |= remove_file_if_exists(&self.target.binary_path())?;
        removed |= remove_file_if_exists(&self.receipt_path())?;

        remove_stale_staging(install_dir);
        remove_dir_if_empty(&install_dir.join(DOC_DIR));
        remove_dir_if_empty(install_dir);

        if removed {
            info!(install_dir = %install_dir.display(), "Engine uninstalled");
        } else {
            debug!(install_dir = %install_dir.display(), "No managed engine to uninstall");
        }
        Ok(removed)
    }
}

struct Unpacked {
    binary: PathBuf,
    docs: Vec<PathBuf>,
}

/// Extract a tar.gz archive into `dest_dir`.
fn extract_tar_gz(archive: &Path, dest_dir: &Path) -> Result<(), InstallError> {
    let mut file = File::open(archive).map_err(|e| InstallError::io(archive, e))?;
    let mut magic = [0u8; 2];
    if io::Read::read_exact(&mut file, &mut magic).is_err() || magic != GZIP_MAGIC {
        return Err(InstallError::corrupt("artifact is not a gzip archive"));
    }
    drop(file);

    fs::create_dir_all(dest_dir).map_err(|e| InstallError::io(dest_dir, e))?;
    let file = File::open(archive).map_err(|e| InstallError::io(archive, e))?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    tarball.set_preserve_permissions(true);
    tarball.unpack(dest_dir).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => InstallError::io(dest_dir, e),
        _ if is_disk_full(&e) => InstallError::io(dest_dir, e),
        _ => InstallError::corrupt(format!("failed to unpack archive: {}", e)),
    })
}

fn is_disk_full(err: &io::Error) -> bool {
    // ENOSPC on Unix, ERROR_DISK_FULL / ERROR_HANDLE_DISK_FULL on Windows.
    #[cfg(unix)]
    let codes: &[i32] = &[28];
    #[cfg(windows)]
    let codes: &[i32] = &[39, 112];
    #[cfg(not(any(unix, windows)))]
    let codes: &[i32] = &[];
    err.raw_os_error().is_some_and(|c| codes.contains(&c))
}

/// Depth-first search for a regular file named `name`.
fn find_file(dir: &Path, name: &str) -> Result<Option<PathBuf>, InstallError> {
    let entries = fs::read_dir(dir).map_err(|e| InstallError::io(dir, e))?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };
        if file_type.is_file() && entry.file_name() == name {
            return Ok(Some(path));
        }
        if file_type.is_dir() {
            subdirs.push(path);
        }
    }
    for sub in subdirs {
        if let Some(found) = find_file(&sub, name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Licence/readme files directly inside `dir`.
fn collect_docs(dir: &Path) -> Result<Vec<PathBuf>, InstallError> {
    let entries = fs::read_dir(dir).map_err(|e| InstallError::io(dir, e))?;
    let mut docs: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_ascii_uppercase();
            DOC_PREFIXES.iter().any(|p| name.starts_with(p))
        })
        .map(|e| e.path())
        .collect();
    docs.sort();
    Ok(docs)
}

/// Confirm the prepared executable is present, non-empty and executable.
fn validate_executable(path: &Path) -> Result<(), InstallError> {
    let metadata = fs::metadata(path).map_err(|e| InstallError::io(path, e))?;
    if !metadata.is_file() {
        return Err(InstallError::corrupt("engine executable is not a regular file"));
    }
    if metadata.len() == 0 {
        return Err(InstallError::corrupt("engine executable is empty"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = metadata.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms).map_err(|e| InstallError::io(path, e))?;
        let mode = fs::metadata(path)
            .map_err(|e| InstallError::io(path, e))?
            .permissions()
            .mode();
        if mode & 0o111 == 0 {
            return Err(InstallError::corrupt("engine executable bit could not be set"));
        }
    }
    Ok(())
}

/// Receipt paths must stay inside the install directory.
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn remove_file_if_exists(path: &Path) -> Result<bool, InstallError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(InstallError::io(path, e)),
    }
}

fn remove_dir_if_empty(dir: &Path) {
    // Fails harmlessly when the directory is missing or still has content.
    let _ = fs::remove_dir(dir);
}

/// Remove staging leftovers of an interrupted download or install.
fn remove_stale_staging(install_dir: &Path) {
    let Ok(entries) = fs::read_dir(install_dir) else {
        return;
    };
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        let path = entry.path();
        let _ = match entry.file_type() {
            Ok(t) if t.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
    }
}

/// Platform-specific guidance for installing the engine by hand.
pub fn manual_install_instructions(target: &PlatformTarget) -> String {
    let steps = match target.os {
        Os::MacOs => "Install Ghostscript with a package manager:\n\
                      \n  Homebrew:  brew install ghostscript\
                      \n  MacPorts:  sudo port install ghostscript"
            .to_string(),
        Os::Windows => "Install Ghostscript for Windows:\n\
                        \n  winget:      winget install --id ArtifexSoftware.GhostScript\
                        \n  Chocolatey:  choco install ghostscript\
                        \n  Installer:   https://ghostscript.com/releases/gsdnld.html\
                        \n\nMake sure gswin64c.exe is on your PATH afterwards."
            .to_string(),
        Os::Linux => "Install Ghostscript from your distribution:\n\
                      \n  Debian/Ubuntu:  sudo apt install ghostscript\
                      \n  Fedora:         sudo dnf install ghostscript\
                      \n  Arch:           sudo pacman -S ghostscript"
            .to_string(),
        Os::Other => "Install Ghostscript from https://ghostscript.com/releases/ \
                      or your system's package manager and make sure the `gs` \
                      command is on your PATH."
            .to_string(),
    };

    format!(
        "{}\n\nAlternatively, place the engine executable at:\n  {}",
        steps,
        target.binary_path().display()
    )
}
