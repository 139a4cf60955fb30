//! File selection seam.
//!
//! Native pickers belong to the front end; the application only asks for a
//! path through this trait.

use std::path::{Path, PathBuf};

/// Lets the user pick files.
pub trait FileDialog: Send + Sync {
    /// Ask for a document to compress. `None` when the user cancelled.
    fn pick_input_file(&self) -> Option<PathBuf>;

    /// Ask where to save the result, starting from `suggested`.
    fn pick_output_path(&self, suggested: Option<&Path>) -> Option<PathBuf>;
}

/// Dialog for headless use; never selects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDialog;

impl FileDialog for NoDialog {
    fn pick_input_file(&self) -> Option<PathBuf> {
        None
    }

    fn pick_output_path(&self, _suggested: Option<&Path>) -> Option<PathBuf> {
        None
    }
}

/// Default save location for a compressed copy of `input`:
/// `report.pdf` → `report-compressed.pdf` in the same directory.
pub fn suggested_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}-compressed.pdf", stem))
}
