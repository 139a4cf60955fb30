//! Compression jobs through the application facade.
//!
//! Engine behaviour is simulated with shell scripts placed where the managed
//! engine would be installed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lopdf::{dictionary, Document, Object, Stream};
use pdfcompressor::compress::{CompressionMethod, RunnerSettings, ValidationError};
use pdfcompressor::engine::ProbeSettings;
use pdfcompressor::platform::{Arch, Os, PlatformResolver};
use pdfcompressor::{AppConfig, CompressionError, CompressionPreset, CompressorApp};
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn engine_dir(&self) -> PathBuf {
        self.path().join("engine")
    }

    fn app(&self, runner: RunnerSettings) -> CompressorApp {
        CompressorApp::new(
            AppConfig::default()
                .with_resolver(
                    PlatformResolver::new()
                        .with_platform(Os::Linux, Arch::X86_64)
                        .with_install_dir(self.engine_dir()),
                )
                .with_probe_settings(ProbeSettings::default().with_search_system_path(false))
                .with_runner_settings(runner),
        )
    }

    /// Install a fake engine whose compression step runs `body`.
    ///
    /// `$out` holds the output path and `$src` the input path.
    #[cfg(unix)]
    fn install_engine(&self, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let dir = self.engine_dir();
        fs::create_dir_all(&dir).unwrap();
        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"--version\" ]; then echo 10.03.1; exit 0; fi\n\
             echo \"$@\" > \"$(dirname \"$0\")/args.txt\"\n\
             for arg in \"$@\"; do\n\
               case \"$arg\" in -sOutputFile=*) out=\"${{arg#-sOutputFile=}}\";; esac\n\
               src=\"$arg\"\n\
             done\n\
             {}\n",
            body
        );
        let path = dir.join("gs");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    fn engine_args(&self) -> String {
        fs::read_to_string(self.engine_dir().join("args.txt")).unwrap()
    }

    fn write_pdf(&self, name: &str) -> PathBuf {
        let path = self.path().join(name);
        write_sample_pdf(&path);
        path
    }

    fn leftover_temp_files(&self) -> Vec<String> {
        fs::read_dir(self.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".pdfcompressor-"))
            .collect()
    }
}

/// Small one-page document with an uncompressed content stream.
fn write_sample_pdf(path: &Path) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = "BT /F1 12 Tf 72 712 Td (Invoice) Tj ET\n".repeat(500);
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[tokio::test]
async fn test_builtin_fallback_without_engine() {
    let ws = Workspace::new();
    let source = ws.write_pdf("invoice.pdf");
    let app = ws.app(RunnerSettings::default());

    let result = app
        .compress(&source, ws.path().join("out/invoice-small"), "screen")
        .await
        .unwrap();

    let expected = ws.path().join("out").join("invoice-small.pdf");
    assert_eq!(result.destination, expected);
    assert_eq!(result.method, CompressionMethod::Builtin);
    assert_eq!(result.preset, CompressionPreset::Screen);
    assert!(result.output_bytes < result.input_bytes);
    assert_eq!(fs::metadata(&expected).unwrap().len(), result.output_bytes);
    assert_eq!(Document::load(&expected).unwrap().get_pages().len(), 1);
}

#[tokio::test]
async fn test_no_engine_and_no_fallback_is_unavailable() {
    let ws = Workspace::new();
    let source = ws.write_pdf("invoice.pdf");
    let app = ws.app(RunnerSettings::default().with_builtin_fallback(false));

    let err = app
        .compress(&source, ws.path().join("out.pdf"), "ebook")
        .await
        .unwrap_err();
    assert!(matches!(err, CompressionError::EngineUnavailable));
    assert!(!ws.path().join("out.pdf").exists());
    assert!(!app.cancel_compression());
}

#[tokio::test]
async fn test_missing_source_is_rejected() {
    let ws = Workspace::new();
    let app = ws.app(RunnerSettings::default());

    let err = app
        .compress(ws.path().join("nope.pdf"), ws.path().join("out.pdf"), "ebook")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompressionError::Validation(ValidationError::SourceNotFound(_))
    ));
}

#[tokio::test]
async fn test_overwriting_the_source_is_rejected() {
    let ws = Workspace::new();
    let source = ws.write_pdf("invoice.pdf");
    let app = ws.app(RunnerSettings::default());

    let err = app
        .compress(&source, ws.path().join("./invoice"), "ebook")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompressionError::Validation(ValidationError::SameFile(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_engine_output_replaces_destination() {
    let ws = Workspace::new();
    ws.install_engine("head -c 64 \"$src\" > \"$out\"");
    let source = ws.write_pdf("invoice.pdf");
    let stale = ws.path().join("out.pdf");
    fs::write(&stale, b"stale").unwrap();
    let app = ws.app(RunnerSettings::default());

    let result = app.compress(&source, &stale, "/Screen").await.unwrap();

    assert_eq!(result.method, CompressionMethod::Engine);
    assert_eq!(result.destination, stale);
    assert_eq!(result.output_bytes, 64);
    assert_eq!(
        fs::read(&stale).unwrap().as_slice(),
        &fs::read(&source).unwrap()[..64]
    );

    let args = ws.engine_args();
    assert!(args.contains("-dPDFSETTINGS=/screen"), "{}", args);
    assert!(args.contains("-dColorImageResolution=72"), "{}", args);
    assert!(args.contains("-dJPEGQ=30"), "{}", args);
    assert!(args.trim_end().ends_with(&*source.to_string_lossy()));
    assert!(ws.leftover_temp_files().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_engine_failure_carries_diagnostics() {
    let ws = Workspace::new();
    ws.install_engine("echo 'Error: /undefined in --file--' >&2\nexit 1");
    let source = ws.write_pdf("invoice.pdf");
    let app = ws.app(RunnerSettings::default());

    let err = app
        .compress(&source, ws.path().join("out.pdf"), "ebook")
        .await
        .unwrap_err();
    match &err {
        CompressionError::NonZeroExit { code, stderr } => {
            assert_eq!(*code, Some(1));
            assert!(stderr.contains("/undefined"));
        }
        other => panic!("expected a non-zero exit, got {:?}", other),
    }
    assert!(err.diagnostics().is_some());
    assert!(!ws.path().join("out.pdf").exists());
    assert!(ws.leftover_temp_files().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_engine_without_output_is_an_error() {
    let ws = Workspace::new();
    ws.install_engine("exit 0");
    let source = ws.write_pdf("invoice.pdf");
    let app = ws.app(RunnerSettings::default());

    let err = app
        .compress(&source, ws.path().join("out.pdf"), "printer")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompressionError::ToolReportedSuccessButNoOutput { .. }
    ));
    assert!(!ws.path().join("out.pdf").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_hung_engine_times_out() {
    let ws = Workspace::new();
    ws.install_engine("exec sleep 30");
    let source = ws.write_pdf("invoice.pdf");
    let app = ws.app(RunnerSettings::default().with_timeout(Duration::from_millis(500)));

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        app.compress(&source, ws.path().join("out.pdf"), "ebook"),
    )
    .await
    .expect("runner ignored its timeout")
    .unwrap_err();
    assert!(matches!(err, CompressionError::Timeout { after } if after == Duration::from_millis(500)));
    assert!(ws.leftover_temp_files().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_second_job_is_busy_and_first_can_be_cancelled() {
    let ws = Workspace::new();
    ws.install_engine("exec sleep 30");
    let source = ws.write_pdf("invoice.pdf");
    let app = ws.app(RunnerSettings::default());

    let (first, second) = tokio::join!(
        app.compress(&source, ws.path().join("a.pdf"), "ebook"),
        async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let busy = app.compress(&source, ws.path().join("b.pdf"), "ebook").await;
            assert!(app.cancel_compression());
            busy
        }
    );

    assert!(matches!(second.unwrap_err(), CompressionError::Busy));
    assert!(matches!(first.unwrap_err(), CompressionError::Cancelled));
    assert!(!ws.path().join("a.pdf").exists());
    assert!(!ws.path().join("b.pdf").exists());
    assert!(ws.leftover_temp_files().is_empty());

    // The slot is free again.
    ws.install_engine("cat \"$src\" > \"$out\"");
    let result = app.compress(&source, ws.path().join("c.pdf"), "ebook").await;
    assert_eq!(result.unwrap().method, CompressionMethod::Engine);
}
