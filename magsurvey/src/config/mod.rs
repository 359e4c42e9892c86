//! INI configuration file.
//!
//! Settings live in `config.ini` under the platform config directory
//! (`~/.config/magsurvey/config.ini` on Linux). Every key is optional; a
//! missing file or key falls back to the documented default.
//!
//! ```ini
//! [fusion]
//! max_accuracy_m = 50
//! max_position_age_ms =
//! smoothing_alpha =
//!
//! [zones]
//! grid_cell_degrees = 0.1
//!
//! [tiles]
//! directory = /home/pilot/.cache/magsurvey/tiles
//! url_template = https://tile.openstreetmap.org/{z}/{x}/{y}.png
//! max_size_mb = 512
//! concurrency = 4
//! timeout_secs = 30
//! user_agent = magsurvey/0.1.0
//!
//! [logging]
//! file =
//! ```

mod keys;

pub use keys::ConfigKey;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::fusion::{FusionConfig, DEFAULT_MAX_ACCURACY_M};
use crate::tiles::{TileCacheConfig, DEFAULT_TILE_URL_TEMPLATE};
use crate::zones::{ZoneIndexConfig, DEFAULT_GRID_CELL_DEGREES};

const CONFIG_DIR_NAME: &str = "magsurvey";
const CONFIG_FILE_NAME: &str = "config.ini";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[fusion]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionSettings {
    pub max_accuracy_m: f64,
    /// Unset means twice the mission interval.
    pub max_position_age_ms: Option<u64>,
    pub smoothing_alpha: Option<f64>,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            max_position_age_ms: None,
            smoothing_alpha: None,
        }
    }
}

/// `[zones]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSettings {
    pub grid_cell_degrees: f64,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            grid_cell_degrees: DEFAULT_GRID_CELL_DEGREES,
        }
    }
}

/// `[tiles]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSettings {
    pub directory: PathBuf,
    pub url_template: String,
    pub max_size_mb: u64,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for TileSettings {
    fn default() -> Self {
        let defaults = TileCacheConfig::default();
        Self {
            directory: default_tile_directory(),
            url_template: DEFAULT_TILE_URL_TEMPLATE.to_string(),
            max_size_mb: defaults.max_size_bytes / (1024 * 1024),
            concurrency: defaults.concurrency,
            timeout_secs: defaults.timeout.as_secs(),
            user_agent: defaults.user_agent,
        }
    }
}

/// `[logging]` settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingSettings {
    /// Optional log file in addition to stderr.
    pub file: Option<PathBuf>,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub fusion: FusionSettings,
    pub zones: ZoneSettings,
    pub tiles: TileSettings,
    pub logging: LoggingSettings,
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

fn default_tile_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join("tiles")
}

impl ConfigFile {
    /// Loads the file at [`config_file_path`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads a file, returning defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Writes the file at [`config_file_path`].
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Writes every key, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |e: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        self.to_ini().write_to_file(path).map_err(io_error)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Fusion bounds for a mission sampling every `interval`.
    pub fn fusion_config(&self, interval: Duration) -> FusionConfig {
        let mut config =
            FusionConfig::for_interval(interval).with_max_accuracy(self.fusion.max_accuracy_m);
        if let Some(ms) = self.fusion.max_position_age_ms {
            config = config.with_max_position_age(Duration::from_millis(ms));
        }
        if let Some(alpha) = self.fusion.smoothing_alpha {
            config = config.with_smoothing(alpha);
        }
        config
    }

    pub fn zone_index_config(&self) -> ZoneIndexConfig {
        ZoneIndexConfig::default().with_grid_cell_degrees(self.zones.grid_cell_degrees)
    }

    pub fn tile_cache_config(&self) -> TileCacheConfig {
        TileCacheConfig::new(self.tiles.directory.clone())
            .with_url_template(self.tiles.url_template.clone())
            .with_max_size_bytes(self.tiles.max_size_mb.saturating_mul(1024 * 1024))
            .with_concurrency(self.tiles.concurrency)
            .with_timeout(Duration::from_secs(self.tiles.timeout_secs))
            .with_user_agent(self.tiles.user_agent.clone())
    }
}

/// Formats a byte count for display, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
