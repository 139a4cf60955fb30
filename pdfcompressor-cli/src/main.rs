//! PDF Compressor CLI - Command-line interface
//!
//! This binary provides a command-line interface to the pdfcompressor library:
//! engine status, download and removal, and PDF compression.

mod commands;
mod dialog;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::compress::CompressArgs;
use commands::config::ConfigCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "pdfcompressor", version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show whether the compression engine is installed
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download and install the compression engine
    Download,

    /// Remove the managed compression engine
    Uninstall {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Show manual install steps for this platform
    Instructions,

    /// List compression presets
    Presets,

    /// Compress a PDF document
    Compress {
        /// Document to compress (prompted for when omitted)
        input: Option<PathBuf>,

        /// Where to save the result (prompted for when omitted)
        output: Option<PathBuf>,

        /// Compression preset: screen, ebook, printer or prepress
        #[arg(short, long, default_value = "ebook")]
        preset: String,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{}", hint);
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Presets => commands::compress::presets(),
        command => {
            let runner = CliRunner::new(cli.verbose)?;
            runner.log_startup(command_name(&command));
            match command {
                Commands::Status { json } => commands::engine::status(&runner, json),
                Commands::Download => commands::engine::download(&runner),
                Commands::Uninstall { yes } => commands::engine::uninstall(&runner, yes),
                Commands::Instructions => commands::engine::instructions(&runner),
                Commands::Compress {
                    input,
                    output,
                    preset,
                } => commands::compress::run(
                    &runner,
                    CompressArgs {
                        input,
                        output,
                        preset,
                    },
                ),
                Commands::Config { .. } | Commands::Presets => Ok(()),
            }
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Status { .. } => "status",
        Commands::Download => "download",
        Commands::Uninstall { .. } => "uninstall",
        Commands::Instructions => "instructions",
        Commands::Presets => "presets",
        Commands::Compress { .. } => "compress",
        Commands::Config { .. } => "config",
    }
}
