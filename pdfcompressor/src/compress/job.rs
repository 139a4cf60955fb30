//! Validated compression job input.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::ValidationError;
use super::preset::CompressionPreset;

/// Document extension for sources and destinations.
pub const PDF_EXTENSION: &str = "pdf";

/// A single compression request.
///
/// Construction validates the input; a job that exists is runnable as far as
/// its paths are concerned. Jobs are consumed by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionJob {
    source: PathBuf,
    destination: PathBuf,
    preset: CompressionPreset,
}

impl CompressionJob {
    /// Validate and normalize a request.
    ///
    /// The destination gets a `.pdf` extension when it lacks one. Its parent
    /// directory may be missing; it is created when the job runs.
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        preset: CompressionPreset,
    ) -> Result<Self, ValidationError> {
        let source = source.into();
        let destination = destination.into();

        validate_source(&source)?;
        let destination = normalize_destination(&destination)?;

        if destination.is_dir() {
            return Err(ValidationError::DestinationIsDirectory(destination));
        }
        if same_file(&source, &destination) {
            return Err(ValidationError::SameFile(destination));
        }
        check_writable(&destination)?;

        Ok(Self {
            source,
            destination,
            preset,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn preset(&self) -> CompressionPreset {
        self.preset
    }
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PDF_EXTENSION))
}

fn validate_source(source: &Path) -> Result<(), ValidationError> {
    let metadata = fs::metadata(source)
        .map_err(|_| ValidationError::SourceNotFound(source.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ValidationError::SourceNotFile(source.to_path_buf()));
    }
    if !has_pdf_extension(source) {
        return Err(ValidationError::NotPdf(source.to_path_buf()));
    }
    Ok(())
}

/// Append `.pdf` to a destination that lacks it.
///
/// `out` becomes `out.pdf`, `out.` becomes `out.pdf`, `out.v2` becomes
/// `out.v2.pdf`. Existing `.pdf`/`.PDF` extensions are kept as given.
pub fn normalize_destination(destination: &Path) -> Result<PathBuf, ValidationError> {
    let Some(name) = destination.file_name() else {
        return Err(ValidationError::EmptyDestination);
    };
    let name = name.to_string_lossy();
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyDestination);
    }
    if has_pdf_extension(destination) {
        return Ok(destination.to_path_buf());
    }

    let stem = name.trim_end_matches('.');
    if stem.is_empty() {
        return Err(ValidationError::EmptyDestination);
    }
    Ok(destination.with_file_name(format!("{}.{}", stem, PDF_EXTENSION)))
}

/// Whether two paths name the same file, resolving symlinks and `..`.
fn same_file(source: &Path, destination: &Path) -> bool {
    let Ok(source) = fs::canonicalize(source) else {
        return false;
    };
    if let Ok(dest) = fs::canonicalize(destination) {
        return dest == source;
    }
    match (parent_dir(destination).canonicalize(), destination.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name) == source,
        _ => false,
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Check the nearest existing ancestor of the destination accepts new files.
fn check_writable(destination: &Path) -> Result<(), ValidationError> {
    let not_writable = |reason: &str| ValidationError::DestinationNotWritable {
        path: destination.to_path_buf(),
        reason: reason.to_string(),
    };

    if let Ok(metadata) = fs::metadata(destination) {
        if metadata.permissions().readonly() {
            return Err(not_writable("file is read-only"));
        }
    }

    let mut dir = parent_dir(destination);
    loop {
        match fs::metadata(dir) {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(not_writable(&format!("{} is not a directory", dir.display())));
            }
            // Mode bits miss ownership and ACLs, so ask the filesystem.
            Ok(_) => {
                return tempfile::Builder::new()
                    .prefix(".pdfcompressor-check-")
                    .tempfile_in(dir)
                    .map(drop)
                    .map_err(|e| not_writable(&format!("cannot create files in {}: {}", dir.display(), e)));
            }
            Err(_) => match dir.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => dir = parent,
                _ => return Ok(()),
            },
        }
    }
}
