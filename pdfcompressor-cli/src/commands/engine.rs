//! Engine lifecycle commands: status, download, uninstall, instructions.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pdfcompressor::engine::{EngineError, EngineEvent, EngineLocation, EngineStatus};
use pdfcompressor::CompressorApp;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::dialog;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Show whether the engine is installed.
pub fn status(runner: &CliRunner, json: bool) -> Result<(), CliError> {
    let app = runner.app();
    let status = app.check_status();

    if json {
        let text = serde_json::to_string_pretty(&status)
            .map_err(|e| CliError::Setup(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    print!("{}", render_status(&status));
    if !status.installed {
        if app.resolution().is_downloadable() {
            println!();
            println!("Run 'pdfcompressor download' to install it.");
        } else {
            println!();
            println!("No download is available for this platform.");
            println!("Run 'pdfcompressor instructions' for manual install steps.");
        }
    }
    Ok(())
}

fn render_status(status: &EngineStatus) -> String {
    let mut out = String::new();
    let state = if status.installed {
        style("installed").green().bold()
    } else if status.downloading {
        style("downloading").yellow().bold()
    } else {
        style("not installed").red().bold()
    };
    out.push_str(&format!("Engine:   {}\n", state));

    if let Some(location) = &status.location {
        let origin = match location {
            EngineLocation::Managed(_) => "managed",
            EngineLocation::System(_) => "system",
        };
        out.push_str(&format!(
            "Path:     {} ({})\n",
            location.path().display(),
            origin
        ));
    }
    if let Some(version) = &status.version {
        out.push_str(&format!("Version:  {}\n", version));
    }
    if status.downloading {
        out.push_str(&format!("Progress: {}%\n", status.progress));
    }
    out
}

/// Download and install the engine, showing progress.
pub fn download(runner: &CliRunner) -> Result<(), CliError> {
    let app = runner.app();
    let interrupt = runner.interrupt_token()?;

    runner.block_on(run_download(&app, interrupt))
}

async fn run_download(app: &CompressorApp, interrupt: CancellationToken) -> Result<(), CliError> {
    let mut events = app.subscribe();
    let handle = app.download_engine()?;

    let cancel = handle.cancel_token();
    let watcher = tokio::spawn(async move {
        interrupt.cancelled().await;
        cancel.cancel();
    });

    let bar = progress_bar();
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::DownloadProgress(percent) => bar.set_position(u64::from(percent)),
            EngineEvent::Installed => {
                bar.finish_with_message("installed");
                break;
            }
            EngineEvent::InstallFailed(reason) => {
                bar.abandon_with_message(reason);
                break;
            }
        }
    }
    watcher.abort();

    match handle.wait().await {
        Ok(()) => {}
        Err(EngineError::AlreadyInstalled { path }) => {
            println!("Engine already installed at {}", path.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    let status = app.check_status();
    if let Some(location) = &status.location {
        info!(path = %location.path().display(), "Engine installed from CLI");
        println!(
            "{} Engine ready at {}",
            style("✓").green(),
            location.path().display()
        );
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    if let Ok(style) =
        ProgressStyle::with_template("Downloading engine {bar:40.cyan/blue} {pos:>3}% {wide_msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

/// Remove the managed engine.
pub fn uninstall(runner: &CliRunner, yes: bool) -> Result<(), CliError> {
    let app = runner.app();
    let target = app.resolution().target();

    if !yes
        && !dialog::confirm(
            &format!("Remove the managed engine from {}?", target.install_dir.display()),
            false,
        )
    {
        println!("Nothing removed.");
        return Ok(());
    }

    if app.uninstall_engine()? {
        println!("Removed managed engine from {}", target.install_dir.display());
    } else {
        println!("No managed engine installed.");
    }

    let status = app.check_status();
    if let Some(EngineLocation::System(path)) = &status.location {
        println!("A system engine remains available at {}", path.display());
    }
    Ok(())
}

/// Print manual install guidance for this platform.
pub fn instructions(runner: &CliRunner) -> Result<(), CliError> {
    println!("{}", runner.app().manual_install_instructions());
    Ok(())
}
