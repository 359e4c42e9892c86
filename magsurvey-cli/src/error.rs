//! CLI error type.

use std::path::PathBuf;

use thiserror::Error;

use magsurvey::config::ConfigError;
use magsurvey::export::ExportError;
use magsurvey::logging::LoggingError;
use magsurvey::mission::MissionError;
use magsurvey::tiles::FetchError;
use magsurvey::zones::LayerError;

/// Errors surfaced to the user. Each maps to a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("Invalid mission: {0}")]
    Mission(#[from] MissionError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Zone layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("Replay failed at line {line}: {message}")]
    Replay { line: usize, message: String },

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Tile cache error: {0}")]
    Tiles(#[from] FetchError),

    #[error("{missing} tiles were not downloaded; run the command again to resume")]
    IncompleteDownload { missing: u64 },

    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}
