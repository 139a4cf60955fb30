//! Compression commands.

use std::path::PathBuf;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pdfcompressor::compress::{CompressedResult, CompressionMethod, CompressionPreset};
use pdfcompressor::{CompressionError, CompressorApp};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::dialog::TerminalDialog;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the compress command.
pub struct CompressArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub preset: String,
}

/// Run the compress command.
pub fn run(runner: &CliRunner, args: CompressArgs) -> Result<(), CliError> {
    let app = runner.app().with_dialog(TerminalDialog);

    let input = match args.input {
        Some(path) => path,
        None => app
            .select_input_file()?
            .ok_or(CliError::NothingSelected("input file"))?,
    };
    let output = match args.output {
        Some(path) => path,
        None => app
            .select_output_path(Some(&input))?
            .ok_or(CliError::NothingSelected("output path"))?,
    };

    let status = app.check_status();
    if !status.installed && runner.config().compression.builtin_fallback {
        println!(
            "{} Ghostscript not found, using built-in compression (lower savings).",
            style("!").yellow()
        );
    }

    let interrupt = runner.interrupt_token()?;
    let result = runner.block_on(run_job(&app, interrupt, input, output, &args.preset))?;
    print!("{}", render_result(&result));
    Ok(())
}

async fn run_job(
    app: &CompressorApp,
    interrupt: CancellationToken,
    input: PathBuf,
    output: PathBuf,
    preset: &str,
) -> Result<CompressedResult, CliError> {
    let spinner = spinner(&format!("Compressing {}", input.display()));

    let job = app.compress(input, output, preset);
    tokio::pin!(job);
    let result = tokio::select! {
        result = &mut job => result,
        _ = interrupt.cancelled() => {
            app.cancel_compression();
            job.await
        }
    };

    match result {
        Ok(result) => {
            spinner.finish_and_clear();
            Ok(result)
        }
        Err(e) => {
            spinner.abandon_with_message("failed");
            if let Some(diagnostics) = e.diagnostics() {
                eprintln!("{}", style(diagnostics).dim());
            }
            if matches!(e, CompressionError::Busy) {
                warn!("Compression refused: another job is running");
            }
            Err(e.into())
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {wide_msg} {elapsed}") {
        spinner.set_style(style.tick_chars("|/-\\ "));
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn render_result(result: &CompressedResult) -> String {
    let method = match result.method {
        CompressionMethod::Engine => "Ghostscript",
        CompressionMethod::Builtin => "built-in",
    };
    let mut out = format!(
        "{} Saved {}\n  Preset: {}\n  Method: {}\n  Result: {}\n",
        style("✓").green(),
        result.destination.display(),
        result.preset.label(),
        method,
        result.summary()
    );
    if result.output_bytes > result.input_bytes {
        out.push_str(&format!(
            "{} The output is larger than the input; the document may already be optimized.\n",
            style("!").yellow()
        ));
    }
    out
}

/// List the available presets.
pub fn presets() -> Result<(), CliError> {
    print!("{}", render_presets());
    Ok(())
}

fn render_presets() -> String {
    let mut out = format!("{:<10} {:>5} {:>8}  {}\n", "PRESET", "DPI", "QUALITY", "USE");
    for preset in CompressionPreset::ALL {
        let default = if preset == CompressionPreset::default() {
            " (default)"
        } else {
            ""
        };
        out.push_str(&format!(
            "{:<10} {:>5} {:>8}  {}{}\n",
            preset.id(),
            preset.dpi(),
            preset.quality(),
            preset.label(),
            default
        ));
    }
    out
}
