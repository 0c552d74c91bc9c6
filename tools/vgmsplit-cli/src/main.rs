//! vgmsplit CLI: render a chip-music file to one WAV per channel.
//!
//! Usage:
//!   vgmsplit              Print usage
//!   vgmsplit <FILE>       Render FILE's master mix and every channel

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

mod commands;

#[derive(Parser)]
#[command(
    name = "vgmsplit",
    about = "Split chip-music files into per-channel WAV files",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// VGM, VGZ, S98, DRO or GYM file to render
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let log_level = if cli.verbose { "debug" } else { "warn" };
    vgmsplit_common::logging::init_logging(&vgmsplit_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
    });

    let Some(file) = cli.file else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    match commands::render::run(file) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
