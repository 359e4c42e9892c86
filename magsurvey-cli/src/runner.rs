//! Shared command setup: configuration and logging.

use std::path::{Path, PathBuf};

use magsurvey::config::{config_file_path, ConfigFile};
use magsurvey::logging::{init_logging, LoggingGuard};
use tracing::debug;

use crate::error::CliError;

/// Loaded configuration plus the logging guard for the lifetime of a command.
pub struct CliRunner {
    config: ConfigFile,
    config_path: PathBuf,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Loads the config file (or defaults) and installs logging.
    pub fn new(config_path: Option<&Path>, verbose: bool) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let level = if verbose { "debug" } else { "info" };
        let logging = init_logging(level, config.logging.file.as_deref())?;
        debug!(config = %config_path.display(), "Loaded configuration");

        Ok(Self {
            config,
            config_path,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
