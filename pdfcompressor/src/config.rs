//! `config.ini` handling.
//!
//! The configuration file lives at `<config dir>/pdfcompressor/config.ini`.
//! Every key is optional; a missing file yields defaults. Each key is
//! described by a [`ConfigKey`], which is also the single place values are
//! validated, both when loading the file and when setting a key from the CLI.
//!
//! ```ini
//! [engine]
//! install_dir = /opt/pdfcompressor/engine
//! download_url =
//! download_sha256 =
//! search_system_path = true
//! version_timeout_secs = 5
//!
//! [download]
//! retries = 3
//! retry_backoff_ms = 500
//! connect_timeout_secs = 15
//! timeout_secs = 300
//! progress_interval_ms = 100
//!
//! [compression]
//! timeout_secs = 300
//! builtin_fallback = true
//!
//! [logging]
//! level = info
//! directory =
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use crate::platform::APP_DIR_NAME;

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Accepted `[logging] level` values.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Errors loading, saving or editing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: ini::Error },

    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid value '{value}' for [{section}] {key}: {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// Path of the user's configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

/// `[engine]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSection {
    /// Managed install directory. Platform default when unset.
    pub install_dir: Option<PathBuf>,
    /// Artifact URL overriding the built-in platform table.
    pub download_url: Option<String>,
    /// Expected SHA-256 of the artifact.
    pub download_sha256: Option<String>,
    /// Accept an engine found on `PATH`.
    pub search_system_path: bool,
    pub version_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            install_dir: None,
            download_url: None,
            download_sha256: None,
            search_system_path: true,
            version_timeout_secs: 5,
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSection {
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub progress_interval_ms: u64,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_backoff_ms: 500,
            connect_timeout_secs: 15,
            timeout_secs: 300,
            progress_interval_ms: 100,
        }
    }
}

/// `[compression]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionSection {
    pub timeout_secs: u64,
    /// Use the built-in compressor when no engine is installed.
    pub builtin_fallback: bool,
}

impl Default for CompressionSection {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            builtin_fallback: true,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSection {
    pub level: String,
    /// Log file directory. Platform default when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub engine: EngineSection,
    pub download: DownloadSection,
    pub compression: CompressionSection,
    pub logging: LoggingSection,
}

impl ConfigFile {
    /// Load the user's configuration file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load a configuration file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<string>"),
            source: ini::Error::Parse(e),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the user's configuration file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories. Unset keys are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path).map_err(write_err)
    }
}

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    EngineInstallDir,
    EngineDownloadUrl,
    EngineDownloadSha256,
    EngineSearchSystemPath,
    EngineVersionTimeoutSecs,
    DownloadRetries,
    DownloadRetryBackoffMs,
    DownloadConnectTimeoutSecs,
    DownloadTimeoutSecs,
    DownloadProgressIntervalMs,
    CompressionTimeoutSecs,
    CompressionBuiltinFallback,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::EngineInstallDir,
            ConfigKey::EngineDownloadUrl,
            ConfigKey::EngineDownloadSha256,
            ConfigKey::EngineSearchSystemPath,
            ConfigKey::EngineVersionTimeoutSecs,
            ConfigKey::DownloadRetries,
            ConfigKey::DownloadRetryBackoffMs,
            ConfigKey::DownloadConnectTimeoutSecs,
            ConfigKey::DownloadTimeoutSecs,
            ConfigKey::DownloadProgressIntervalMs,
            ConfigKey::CompressionTimeoutSecs,
            ConfigKey::CompressionBuiltinFallback,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::EngineInstallDir
            | ConfigKey::EngineDownloadUrl
            | ConfigKey::EngineDownloadSha256
            | ConfigKey::EngineSearchSystemPath
            | ConfigKey::EngineVersionTimeoutSecs => "engine",
            ConfigKey::DownloadRetries
            | ConfigKey::DownloadRetryBackoffMs
            | ConfigKey::DownloadConnectTimeoutSecs
            | ConfigKey::DownloadTimeoutSecs
            | ConfigKey::DownloadProgressIntervalMs => "download",
            ConfigKey::CompressionTimeoutSecs | ConfigKey::CompressionBuiltinFallback => {
                "compression"
            }
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::EngineInstallDir => "install_dir",
            ConfigKey::EngineDownloadUrl => "download_url",
            ConfigKey::EngineDownloadSha256 => "download_sha256",
            ConfigKey::EngineSearchSystemPath => "search_system_path",
            ConfigKey::EngineVersionTimeoutSecs => "version_timeout_secs",
            ConfigKey::DownloadRetries => "retries",
            ConfigKey::DownloadRetryBackoffMs => "retry_backoff_ms",
            ConfigKey::DownloadConnectTimeoutSecs => "connect_timeout_secs",
            ConfigKey::DownloadTimeoutSecs | ConfigKey::CompressionTimeoutSecs => "timeout_secs",
            ConfigKey::DownloadProgressIntervalMs => "progress_interval_ms",
            ConfigKey::CompressionBuiltinFallback => "builtin_fallback",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
        }
    }

    /// Dotted name, e.g. `engine.download_url`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text. Empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        match self {
            ConfigKey::EngineInstallDir => path(&config.engine.install_dir),
            ConfigKey::EngineDownloadUrl => config.engine.download_url.clone().unwrap_or_default(),
            ConfigKey::EngineDownloadSha256 => {
                config.engine.download_sha256.clone().unwrap_or_default()
            }
            ConfigKey::EngineSearchSystemPath => config.engine.search_system_path.to_string(),
            ConfigKey::EngineVersionTimeoutSecs => config.engine.version_timeout_secs.to_string(),
            ConfigKey::DownloadRetries => config.download.retries.to_string(),
            ConfigKey::DownloadRetryBackoffMs => config.download.retry_backoff_ms.to_string(),
            ConfigKey::DownloadConnectTimeoutSecs => {
                config.download.connect_timeout_secs.to_string()
            }
            ConfigKey::DownloadTimeoutSecs => config.download.timeout_secs.to_string(),
            ConfigKey::DownloadProgressIntervalMs => {
                config.download.progress_interval_ms.to_string()
            }
            ConfigKey::CompressionTimeoutSecs => config.compression.timeout_secs.to_string(),
            ConfigKey::CompressionBuiltinFallback => {
                config.compression.builtin_fallback.to_string()
            }
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => path(&config.logging.directory),
        }
    }

    /// Validate and store a value. Empty text clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::EngineInstallDir => config.engine.install_dir = optional(value).map(PathBuf::from),
            ConfigKey::EngineDownloadUrl => {
                if let Some(url) = optional(value) {
                    if !(url.starts_with("http://") || url.starts_with("https://")) {
                        return Err(self.invalid(value, "expected an http(s) URL"));
                    }
                }
                config.engine.download_url = optional(value).map(str::to_string);
            }
            ConfigKey::EngineDownloadSha256 => {
                if let Some(sha) = optional(value) {
                    if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(self.invalid(value, "expected 64 hex characters"));
                    }
                }
                config.engine.download_sha256 = optional(value).map(str::to_ascii_lowercase);
            }
            ConfigKey::EngineSearchSystemPath => {
                config.engine.search_system_path = self.parse_bool(value)?
            }
            ConfigKey::EngineVersionTimeoutSecs => {
                config.engine.version_timeout_secs = self.parse_positive(value)?
            }
            ConfigKey::DownloadRetries => config.download.retries = self.parse_number(value)?,
            ConfigKey::DownloadRetryBackoffMs => {
                config.download.retry_backoff_ms = self.parse_number(value)?
            }
            ConfigKey::DownloadConnectTimeoutSecs => {
                config.download.connect_timeout_secs = self.parse_positive(value)?
            }
            ConfigKey::DownloadTimeoutSecs => {
                config.download.timeout_secs = self.parse_positive(value)?
            }
            ConfigKey::DownloadProgressIntervalMs => {
                config.download.progress_interval_ms = self.parse_number(value)?
            }
            ConfigKey::CompressionTimeoutSecs => {
                config.compression.timeout_secs = self.parse_positive(value)?
            }
            ConfigKey::CompressionBuiltinFallback => {
                config.compression.builtin_fallback = self.parse_bool(value)?
            }
            ConfigKey::LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(value, "expected trace, debug, info, warn or error"));
                }
                config.logging.level = level;
            }
            ConfigKey::LoggingDirectory => {
                config.logging.directory = optional(value).map(PathBuf::from)
            }
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            section: self.section(),
            key: self.key_name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn parse_number<T: FromStr>(&self, value: &str) -> Result<T, ConfigError> {
        value
            .parse()
            .map_err(|_| self.invalid(value, "expected a non-negative integer"))
    }

    fn parse_positive(&self, value: &str) -> Result<u64, ConfigError> {
        match self.parse_number::<u64>(value)? {
            0 => Err(self.invalid(value, "must be greater than zero")),
            n => Ok(n),
        }
    }

    fn parse_bool(&self, value: &str) -> Result<bool, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid(value, "expected true or false")),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    /// Parse a dotted `section.key` name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn optional(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}
