//! Host platform detection and engine download resolution.
//!
//! The resolver maps the host OS/architecture onto everything the rest of the
//! engine lifecycle needs to know: the executable name to look for, where a
//! managed installation lives, and (when one exists) the artifact to download.
//!
//! Platforms without a registered artifact are a normal outcome, not an
//! error. Callers branch on [`Resolution::Unsupported`] and surface manual
//! install guidance instead.

use std::fmt;
use std::path::{Path, PathBuf};

/// Application directory name used under the platform data directory.
pub const APP_DIR_NAME: &str = "pdfcompressor";

/// Ghostscript release published for download.
const GHOSTSCRIPT_RELEASE: &str = "10.03.1";

/// Registered downloads, keyed by (os, arch).
///
/// Ghostscript only publishes a standalone binary for Linux x86_64. Windows
/// ships an interactive installer and macOS relies on package managers, so
/// both resolve to [`Resolution::Unsupported`].
const REGISTERED_DOWNLOADS: &[(Os, Arch, &str, &str)] = &[(
    Os::Linux,
    Arch::X86_64,
    "https://github.com/ArtifexSoftware/ghostpdl-downloads/releases/download/gs10031/ghostscript-10.03.1-linux-x86_64.tgz",
    "gs-10031-linux-x86_64",
)];

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Os {
    /// Detect the operating system this binary was built for.
    pub fn current() -> Self {
        Self::from_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            _ => Os::Other,
        }
    }

    /// Engine executable name on this OS.
    pub fn engine_binary_name(&self) -> &'static str {
        match self {
            Os::Windows => "gswin64c.exe",
            _ => "gs",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
            Os::Other => "unknown-os",
        };
        f.write_str(name)
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
    Other,
}

impl Arch {
    /// Detect the architecture this binary was built for.
    pub fn current() -> Self {
        Self::from_name(std::env::consts::ARCH)
    }

    /// Map a `std::env::consts::ARCH` style name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            _ => Arch::Other,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Other => "unknown-arch",
        };
        f.write_str(name)
    }
}

/// Layout of a downloaded engine artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Gzip-compressed tarball containing the executable.
    TarGz,
    /// The executable itself.
    Executable,
    /// Anything else (zip, installers, disk images). Rejected at install time.
    Unknown(String),
}

impl ArtifactFormat {
    /// Infer the format from the last path segment of a URL.
    pub fn detect(url: &str) -> Self {
        let file_name = artifact_file_name(url).to_ascii_lowercase();
        if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
            return ArtifactFormat::TarGz;
        }
        match Path::new(&file_name).extension().and_then(|e| e.to_str()) {
            None | Some("bin") => ArtifactFormat::Executable,
            Some(ext) => ArtifactFormat::Unknown(ext.to_string()),
        }
    }
}

/// Where and how to fetch the engine for a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSource {
    /// Artifact URL. Never empty.
    pub url: String,
    /// Artifact layout.
    pub format: ArtifactFormat,
    /// File name of the executable inside an archive, if it differs from the
    /// installed binary name.
    pub archive_binary: Option<String>,
    /// Expected SHA-256 of the artifact (lowercase hex).
    pub sha256: Option<String>,
    /// Engine version the artifact carries, when known.
    pub version: Option<String>,
}

impl DownloadSource {
    /// Create a source for a URL, inferring the artifact format.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let format = ArtifactFormat::detect(&url);
        Self {
            url,
            format,
            archive_binary: None,
            sha256: None,
            version: None,
        }
    }

    /// Set the executable name looked up inside the archive.
    pub fn with_archive_binary(mut self, name: impl Into<String>) -> Self {
        self.archive_binary = Some(name.into());
        self
    }

    /// Set the expected checksum.
    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into().to_ascii_lowercase());
        self
    }

    /// File name used for the staged artifact.
    pub fn file_name(&self) -> &str {
        artifact_file_name(&self.url)
    }
}

/// Everything the lifecycle components need to know about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTarget {
    pub os: Os,
    pub arch: Arch,
    /// Executable name expected in the install directory.
    pub binary_name: String,
    /// Directory holding the managed installation.
    pub install_dir: PathBuf,
}

impl PlatformTarget {
    /// Full path of the managed engine executable.
    pub fn binary_path(&self) -> PathBuf {
        self.install_dir.join(&self.binary_name)
    }
}

/// Outcome of platform resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An artifact is registered for this platform.
    Downloadable {
        target: PlatformTarget,
        source: DownloadSource,
    },
    /// No artifact; the engine must be installed manually.
    Unsupported { target: PlatformTarget },
}

impl Resolution {
    /// The platform target, regardless of downloadability.
    pub fn target(&self) -> &PlatformTarget {
        match self {
            Resolution::Downloadable { target, .. } | Resolution::Unsupported { target } => target,
        }
    }

    /// The download source, if the platform has one.
    pub fn source(&self) -> Option<&DownloadSource> {
        match self {
            Resolution::Downloadable { source, .. } => Some(source),
            Resolution::Unsupported { .. } => None,
        }
    }

    pub fn is_downloadable(&self) -> bool {
        matches!(self, Resolution::Downloadable { .. })
    }
}

/// Resolves the host platform against the registered download table.
///
/// Overrides from configuration take precedence over detection so the rest of
/// the crate never reads host state directly.
#[derive(Debug, Clone, Default)]
pub struct PlatformResolver {
    os: Option<Os>,
    arch: Option<Arch>,
    install_dir: Option<PathBuf>,
    download_url: Option<String>,
    download_sha256: Option<String>,
}

impl PlatformResolver {
    /// Resolver for the current host with default locations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend to run on a specific platform.
    pub fn with_platform(mut self, os: Os, arch: Arch) -> Self {
        self.os = Some(os);
        self.arch = Some(arch);
        self
    }

    /// Use a custom managed install directory.
    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    /// Download the engine from a custom URL on any platform.
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.download_url = if url.trim().is_empty() { None } else { Some(url) };
        self
    }

    /// Expected SHA-256 of the artifact at the custom URL.
    pub fn with_download_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.download_sha256 = Some(sha256.into());
        self
    }

    /// Resolve the platform. Pure: reads no filesystem state.
    pub fn resolve(&self) -> Resolution {
        let os = self.os.unwrap_or_else(Os::current);
        let arch = self.arch.unwrap_or_else(Arch::current);

        let target = PlatformTarget {
            os,
            arch,
            binary_name: os.engine_binary_name().to_string(),
            install_dir: self
                .install_dir
                .clone()
                .unwrap_or_else(default_install_dir),
        };

        let source = match &self.download_url {
            Some(url) => Some(DownloadSource::new(url.clone())),
            None => registered_source(os, arch),
        };

        match source {
            Some(mut source) => {
                if let Some(sha) = &self.download_sha256 {
                    source = source.with_sha256(sha.clone());
                }
                Resolution::Downloadable { target, source }
            }
            None => Resolution::Unsupported { target },
        }
    }
}

/// Look up the built-in download table.
fn registered_source(os: Os, arch: Arch) -> Option<DownloadSource> {
    REGISTERED_DOWNLOADS
        .iter()
        .find(|(o, a, _, _)| *o == os && *a == arch)
        .map(|(_, _, url, inner)| {
            let mut source = DownloadSource::new(*url).with_archive_binary(*inner);
            source.version = Some(GHOSTSCRIPT_RELEASE.to_string());
            source
        })
}

/// Platform-convention install directory for the managed engine.
///
/// Linux: `~/.local/share/pdfcompressor/engine`, macOS:
/// `~/Library/Application Support/pdfcompressor/engine`, Windows:
/// `%LOCALAPPDATA%\pdfcompressor\engine`.
pub fn default_install_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join("engine")
}

fn artifact_file_name(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("engine-artifact")
}
