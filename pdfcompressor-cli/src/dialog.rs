//! Terminal prompts standing in for native file pickers.

use std::path::{Path, PathBuf};

use console::Term;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use pdfcompressor::app::FileDialog;

/// Asks for paths on the terminal. Selects nothing when stdin is not a TTY.
#[derive(Debug, Default)]
pub struct TerminalDialog;

impl TerminalDialog {
    fn prompt(&self, prompt: &str, initial: Option<&Path>) -> Option<PathBuf> {
        if !Term::stderr().is_term() {
            return None;
        }
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty(true);
        if let Some(initial) = initial {
            input = input.with_initial_text(initial.display().to_string());
        }
        input.interact_text().ok().and_then(|text| to_path(&text))
    }
}

impl FileDialog for TerminalDialog {
    fn pick_input_file(&self) -> Option<PathBuf> {
        self.prompt("PDF to compress", None)
    }

    fn pick_output_path(&self, suggested: Option<&Path>) -> Option<PathBuf> {
        self.prompt("Save compressed PDF as", suggested)
    }
}

/// Ask a yes/no question. Non-interactive sessions get `default`.
pub fn confirm(prompt: &str, default: bool) -> bool {
    if !Term::stderr().is_term() {
        return default;
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()
        .unwrap_or(default)
}

/// Turn typed text into a path. Blank means cancelled; quotes from
/// drag-and-drop are stripped.
fn to_path(text: &str) -> Option<PathBuf> {
    let trimmed = text.trim().trim_matches(|c| c == '"' || c == '\'');
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}
