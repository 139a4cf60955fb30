//! Application configuration for `CompressorApp`.
//!
//! `AppConfig` gathers the settings of every component so the application is
//! wired from one place, either programmatically or from a [`ConfigFile`].

use std::time::Duration;

use crate::compress::RunnerSettings;
use crate::config::ConfigFile;
use crate::engine::{DownloadSettings, ProbeSettings};
use crate::platform::PlatformResolver;

/// Settings for all lifecycle components.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Platform detection and download source.
    pub resolver: PlatformResolver,

    /// Engine presence check.
    pub probe: ProbeSettings,

    /// Artifact transfer.
    pub download: DownloadSettings,

    /// Compression jobs.
    pub runner: RunnerSettings,
}

impl AppConfig {
    /// Create application config from the configuration file.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        let mut resolver = PlatformResolver::new();
        if let Some(dir) = &config.engine.install_dir {
            resolver = resolver.with_install_dir(dir.clone());
        }
        if let Some(url) = &config.engine.download_url {
            resolver = resolver.with_download_url(url.clone());
        }
        if let Some(sha) = &config.engine.download_sha256 {
            resolver = resolver.with_download_sha256(sha.clone());
        }

        let download = &config.download;
        Self {
            resolver,
            probe: ProbeSettings::default()
                .with_search_system_path(config.engine.search_system_path)
                .with_version_timeout(Duration::from_secs(config.engine.version_timeout_secs)),
            download: DownloadSettings::default()
                .with_retries(download.retries)
                .with_retry_backoff(Duration::from_millis(download.retry_backoff_ms))
                .with_connect_timeout(Duration::from_secs(download.connect_timeout_secs))
                .with_timeout(Duration::from_secs(download.timeout_secs))
                .with_progress_interval(Duration::from_millis(download.progress_interval_ms)),
            runner: RunnerSettings::default()
                .with_timeout(Duration::from_secs(config.compression.timeout_secs))
                .with_builtin_fallback(config.compression.builtin_fallback),
        }
    }

    pub fn with_resolver(mut self, resolver: PlatformResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_probe_settings(mut self, probe: ProbeSettings) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_download_settings(mut self, download: DownloadSettings) -> Self {
        self.download = download;
        self
    }

    pub fn with_runner_settings(mut self, runner: RunnerSettings) -> Self {
        self.runner = runner;
        self
    }
}
