//! MagSurvey CLI - Command-line interface
//!
//! Drives the survey engine from the command line: classify readings, check
//! positions and planned areas against restricted zones, replay recorded
//! surveys into GeoJSON, and manage the offline tile cache.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::classify::ClassifyArgs;
use commands::config::ConfigCommands;
use commands::survey::SurveyCommands;
use commands::tiles::TilesCommands;
use commands::zones::ZonesCommands;
use error::CliError;
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "magsurvey", version, about = "Magnetic field survey engine")]
struct Cli {
    /// Path to config.ini (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify a single magnetometer reading
    Classify(ClassifyArgs),

    /// Query restricted-zone layers
    Zones {
        #[command(subcommand)]
        command: ZonesCommands,
    },

    /// Replay and export surveys
    Survey {
        #[command(subcommand)]
        command: SurveyCommands,
    },

    /// Manage the offline map tile cache
    Tiles {
        #[command(subcommand)]
        command: TilesCommands,
    },

    /// View or change configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    let runner = || CliRunner::new(config_path, cli.verbose);

    match cli.command {
        Commands::Classify(args) => {
            let _runner = runner()?;
            commands::classify::run(args)
        }
        Commands::Zones { command } => commands::zones::run(command, &runner()?),
        Commands::Survey { command } => commands::survey::run(command, &runner()?),
        Commands::Tiles { command } => commands::tiles::run(command, &runner()?).await,
        // Edits the file directly and never needs logging
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}
