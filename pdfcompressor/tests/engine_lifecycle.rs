//! End-to-end engine lifecycle against a local HTTP server.
//!
//! The served artifact is a tarball holding a shell script that answers
//! `--version`, so these tests only run on Unix.

#![cfg(unix)]

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use pdfcompressor::engine::{
    DownloadSettings, EngineError, EngineEvent, EngineLocation, ProbeSettings, Subscription,
    RECEIPT_FILE,
};
use pdfcompressor::platform::{Arch, Os, PlatformResolver};
use pdfcompressor::{AppConfig, CompressorApp};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAKE_ENGINE: &str = "#!/bin/sh\necho 10.03.1\n";

fn engine_tarball() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, body, mode) in [
        ("ghostscript-10.03.1/gs", FAKE_ENGINE.as_bytes(), 0o755),
        ("ghostscript-10.03.1/LICENSE", b"AGPL".as_slice(), 0o644),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        builder.append_data(&mut header, name, body).unwrap();
    }
    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}

fn app_for(server: &MockServer, install_dir: &Path) -> CompressorApp {
    app_for_url(format!("{}/gs.tgz", server.uri()), install_dir)
}

fn app_for_url(url: String, install_dir: &Path) -> CompressorApp {
    CompressorApp::new(
        AppConfig::default()
            .with_resolver(
                PlatformResolver::new()
                    .with_platform(Os::Linux, Arch::X86_64)
                    .with_install_dir(install_dir)
                    .with_download_url(url),
            )
            .with_probe_settings(ProbeSettings::default().with_search_system_path(false))
            .with_download_settings(
                DownloadSettings::default()
                    .with_retries(2)
                    .with_retry_backoff(Duration::from_millis(10))
                    .with_progress_interval(Duration::ZERO),
            ),
    )
}

/// Serve every connection the same raw HTTP response, for framings the mock
/// server cannot produce. Returns the artifact URL and a connection counter.
async fn serve_raw(head: &'static str, body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{}/gs.tgz", addr), connections)
}

fn staging_files(install_dir: &Path) -> Vec<String> {
    std::fs::read_dir(install_dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(".install-"))
                .collect()
        })
        .unwrap_or_default()
}

async fn serve_engine(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/gs.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(engine_tarball()))
        .mount(server)
        .await;
}

async fn events_until_terminal(events: &mut Subscription) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(30), events.recv())
            .await
            .expect("timed out waiting for engine events")
            .expect("event bus closed");
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            return seen;
        }
    }
}

fn assert_progress_non_decreasing(events: &[EngineEvent]) {
    let mut last = 0;
    for event in events {
        if let EngineEvent::DownloadProgress(pct) = event {
            assert!(*pct >= last, "progress went from {} to {}", last, pct);
            assert!(*pct <= 100);
            last = *pct;
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_install_probe_uninstall() {
    let server = MockServer::start().await;
    serve_engine(&server).await;
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("engine");
    let app = app_for(&server, &install_dir);

    assert!(!app.check_status().installed);

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    let seen = events_until_terminal(&mut events).await;
    handle.wait().await.unwrap();

    assert_progress_non_decreasing(&seen);
    assert_eq!(
        &seen[seen.len() - 2..],
        &[EngineEvent::DownloadProgress(100), EngineEvent::Installed]
    );

    let status = app.check_status();
    assert!(status.installed);
    assert!(!status.downloading);
    assert_eq!(status.progress, 100);
    assert_eq!(
        status.location,
        Some(EngineLocation::Managed(install_dir.join("gs")))
    );
    assert_eq!(status.version.as_deref(), Some("10.3.1"));
    assert!(install_dir.join(RECEIPT_FILE).is_file());
    assert!(install_dir.join("doc").join("LICENSE").is_file());

    let mut events = app.subscribe();
    let again = app.download_engine().unwrap().wait().await.unwrap_err();
    assert!(matches!(again, EngineError::AlreadyInstalled { .. }));
    assert!(matches!(events.recv().await, Some(EngineEvent::InstallFailed(_))));
    assert!(app.check_status().installed);

    assert!(app.uninstall_engine().unwrap());
    assert!(!app.check_status().installed);
    assert!(!install_dir.join("gs").exists());
    assert!(!app.uninstall_engine().unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_transient_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gs.tgz"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    serve_engine(&server).await;
    let temp = TempDir::new().unwrap();
    let app = app_for(&server, temp.path());

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    let seen = events_until_terminal(&mut events).await;
    handle.wait().await.unwrap();

    assert_eq!(seen.last(), Some(&EngineEvent::Installed));
    assert!(app.check_status().installed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_retries_exhausted_on_persistent_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gs.tgz"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("engine");
    let app = app_for(&server, &install_dir);

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    let seen = events_until_terminal(&mut events).await;

    assert_eq!(seen.len(), 1, "{:?}", seen);
    match &seen[0] {
        EngineEvent::InstallFailed(reason) => assert!(reason.contains("503"), "{}", reason),
        other => panic!("expected a failure event, got {:?}", other),
    }
    assert!(matches!(
        handle.wait().await.unwrap_err(),
        EngineError::Network { attempts: 3, .. }
    ));
    assert_eq!(events.try_recv(), None);

    let status = app.check_status();
    assert!(!status.installed);
    assert!(!status.downloading);
    assert!(staging_files(&install_dir).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_truncated_transfer_removes_staging_file() {
    let (url, connections) = serve_raw(
        "HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nConnection: close\r\n\r\n",
        vec![0x1f; 1000],
    )
    .await;
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("engine");
    let app = app_for_url(url, &install_dir);

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    let seen = events_until_terminal(&mut events).await;

    assert!(matches!(seen.last(), Some(EngineEvent::InstallFailed(_))));
    assert_progress_non_decreasing(&seen);
    assert!(matches!(
        handle.wait().await.unwrap_err(),
        EngineError::Network { attempts: 3, .. }
    ));
    assert_eq!(connections.load(Ordering::SeqCst), 3);
    assert!(
        staging_files(&install_dir).is_empty(),
        "left behind {:?}",
        staging_files(&install_dir)
    );
    assert!(!install_dir.join("gs").exists());
    assert!(!app.check_status().downloading);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_length_download_completes_at_100() {
    let (url, _) = serve_raw(
        "HTTP/1.1 200 OK\r\nContent-Type: application/gzip\r\nConnection: close\r\n\r\n",
        engine_tarball(),
    )
    .await;
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("engine");
    let app = app_for_url(url, &install_dir);

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    let seen = events_until_terminal(&mut events).await;
    handle.wait().await.unwrap();

    assert_progress_non_decreasing(&seen);
    assert_eq!(
        &seen[seen.len() - 2..],
        &[EngineEvent::DownloadProgress(100), EngineEvent::Installed]
    );
    let status = app.check_status();
    assert!(status.installed);
    assert_eq!(status.progress, 100);
    assert!(staging_files(&install_dir).is_empty());
}

#[tokio::test]
async fn test_start_download_does_not_wait_on_engine_check() {
    use std::os::unix::fs::PermissionsExt;

    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("engine");
    std::fs::create_dir_all(&install_dir).unwrap();
    let hung = install_dir.join("gs");
    std::fs::write(&hung, "#!/bin/sh\nexec sleep 10\n").unwrap();
    std::fs::set_permissions(&hung, std::fs::Permissions::from_mode(0o755)).unwrap();

    let app = CompressorApp::new(
        AppConfig::default()
            .with_resolver(
                PlatformResolver::new()
                    .with_platform(Os::Linux, Arch::X86_64)
                    .with_install_dir(&install_dir)
                    .with_download_url(format!("{}/gs.tgz", server.uri())),
            )
            .with_probe_settings(
                ProbeSettings::default()
                    .with_search_system_path(false)
                    .with_version_timeout(Duration::from_secs(2)),
            ),
    );

    let started = Instant::now();
    let handle = app.download_engine().unwrap();
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "start_download took {:?}",
        started.elapsed()
    );

    // The current-thread runtime stays free while the version check runs.
    let timer = Instant::now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(timer.elapsed() < Duration::from_millis(1000));

    handle.cancel();
    assert!(matches!(
        handle.wait().await.unwrap_err(),
        EngineError::Cancelled
    ));
    assert!(!app.check_status().downloading);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_artifact_fails_and_resets_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gs.tgz"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let temp = TempDir::new().unwrap();
    let app = app_for(&server, temp.path());

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    let seen = events_until_terminal(&mut events).await;

    match seen.last() {
        Some(EngineEvent::InstallFailed(reason)) => assert!(reason.contains("404"), "{}", reason),
        other => panic!("expected a failure event, got {:?}", other),
    }
    assert!(matches!(
        handle.wait().await.unwrap_err(),
        EngineError::Network { attempts: 1, .. }
    ));

    let status = app.check_status();
    assert!(!status.installed);
    assert!(!status.downloading);
    assert_eq!(status.progress, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_corrupt_artifact_installs_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gs.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html>not an archive</html>".to_vec()))
        .mount(&server)
        .await;
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("engine");
    let app = app_for(&server, &install_dir);

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    let seen = events_until_terminal(&mut events).await;

    assert!(matches!(seen.last(), Some(EngineEvent::InstallFailed(_))));
    assert!(handle.wait().await.is_err());
    assert!(!install_dir.join("gs").exists());
    assert!(!install_dir.join(RECEIPT_FILE).exists());
    let leftovers: Vec<_> = std::fs::read_dir(&install_dir)
        .map(|entries| entries.flatten().map(|e| e.file_name()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "left behind {:?}", leftovers);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_checksum_mismatch_is_rejected() {
    let server = MockServer::start().await;
    serve_engine(&server).await;
    let temp = TempDir::new().unwrap();
    let app = CompressorApp::new(
        AppConfig::default()
            .with_resolver(
                PlatformResolver::new()
                    .with_platform(Os::Linux, Arch::X86_64)
                    .with_install_dir(temp.path())
                    .with_download_url(format!("{}/gs.tgz", server.uri()))
                    .with_download_sha256("0".repeat(64)),
            )
            .with_probe_settings(ProbeSettings::default().with_search_system_path(false)),
    );

    let handle = app.download_engine().unwrap();
    let err = handle.wait().await.unwrap_err();
    assert!(err.to_string().contains("checksum"), "{}", err);
    assert!(!app.check_status().installed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_download_is_refused_while_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gs.tgz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(engine_tarball())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    let temp = TempDir::new().unwrap();
    let app = app_for(&server, temp.path());

    let handle = app.download_engine().unwrap();
    assert!(matches!(
        app.download_engine().unwrap_err(),
        EngineError::AlreadyInProgress
    ));
    assert!(app.check_status().downloading);
    assert!(matches!(
        app.uninstall_engine().unwrap_err(),
        EngineError::AlreadyInProgress
    ));

    handle.wait().await.unwrap();
    assert!(app.check_status().installed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_stops_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gs.tgz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(engine_tarball())
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    let temp = TempDir::new().unwrap();
    let install_dir = temp.path().join("engine");
    let app = app_for(&server, &install_dir);

    let mut events = app.subscribe();
    let handle = app.download_engine().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(app.cancel_download());

    let seen = events_until_terminal(&mut events).await;
    assert_eq!(
        seen.last(),
        Some(&EngineEvent::InstallFailed("download cancelled".to_string()))
    );
    assert!(matches!(
        handle.wait().await.unwrap_err(),
        EngineError::Cancelled
    ));

    let status = app.check_status();
    assert!(!status.installed);
    assert!(!status.downloading);
    assert!(!app.cancel_download());
    assert!(!install_dir.join("gs").exists());
}

#[tokio::test]
async fn test_unsupported_platform_offers_instructions() {
    let temp = TempDir::new().unwrap();
    let app = CompressorApp::new(
        AppConfig::default()
            .with_resolver(
                PlatformResolver::new()
                    .with_platform(Os::Windows, Arch::X86_64)
                    .with_install_dir(temp.path()),
            )
            .with_probe_settings(ProbeSettings::default().with_search_system_path(false)),
    );

    assert!(!app.resolution().is_downloadable());
    assert!(matches!(
        app.download_engine().unwrap_err(),
        EngineError::Unsupported {
            os: Os::Windows,
            arch: Arch::X86_64
        }
    ));
    assert!(app.manual_install_instructions().contains("gswin64c.exe"));
    assert!(!app.check_status().downloading);
}
