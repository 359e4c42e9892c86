//! Typed access to individual configuration keys.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ConfigFile};

/// A `section.key` configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    FusionMaxAccuracyM,
    FusionMaxPositionAgeMs,
    FusionSmoothingAlpha,
    ZonesGridCellDegrees,
    TilesDirectory,
    TilesUrlTemplate,
    TilesMaxSizeMb,
    TilesConcurrency,
    TilesTimeoutSecs,
    TilesUserAgent,
    LoggingFile,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::FusionMaxAccuracyM,
            ConfigKey::FusionMaxPositionAgeMs,
            ConfigKey::FusionSmoothingAlpha,
            ConfigKey::ZonesGridCellDegrees,
            ConfigKey::TilesDirectory,
            ConfigKey::TilesUrlTemplate,
            ConfigKey::TilesMaxSizeMb,
            ConfigKey::TilesConcurrency,
            ConfigKey::TilesTimeoutSecs,
            ConfigKey::TilesUserAgent,
            ConfigKey::LoggingFile,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::FusionMaxAccuracyM
            | ConfigKey::FusionMaxPositionAgeMs
            | ConfigKey::FusionSmoothingAlpha => "fusion",
            ConfigKey::ZonesGridCellDegrees => "zones",
            ConfigKey::TilesDirectory
            | ConfigKey::TilesUrlTemplate
            | ConfigKey::TilesMaxSizeMb
            | ConfigKey::TilesConcurrency
            | ConfigKey::TilesTimeoutSecs
            | ConfigKey::TilesUserAgent => "tiles",
            ConfigKey::LoggingFile => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::FusionMaxAccuracyM => "max_accuracy_m",
            ConfigKey::FusionMaxPositionAgeMs => "max_position_age_ms",
            ConfigKey::FusionSmoothingAlpha => "smoothing_alpha",
            ConfigKey::ZonesGridCellDegrees => "grid_cell_degrees",
            ConfigKey::TilesDirectory => "directory",
            ConfigKey::TilesUrlTemplate => "url_template",
            ConfigKey::TilesMaxSizeMb => "max_size_mb",
            ConfigKey::TilesConcurrency => "concurrency",
            ConfigKey::TilesTimeoutSecs => "timeout_secs",
            ConfigKey::TilesUserAgent => "user_agent",
            ConfigKey::LoggingFile => "file",
        }
    }

    /// Full name in `section.key` form.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as written to the file; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        fn optional<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(T::to_string).unwrap_or_default()
        }

        match self {
            ConfigKey::FusionMaxAccuracyM => config.fusion.max_accuracy_m.to_string(),
            ConfigKey::FusionMaxPositionAgeMs => optional(&config.fusion.max_position_age_ms),
            ConfigKey::FusionSmoothingAlpha => optional(&config.fusion.smoothing_alpha),
            ConfigKey::ZonesGridCellDegrees => config.zones.grid_cell_degrees.to_string(),
            ConfigKey::TilesDirectory => config.tiles.directory.display().to_string(),
            ConfigKey::TilesUrlTemplate => config.tiles.url_template.clone(),
            ConfigKey::TilesMaxSizeMb => config.tiles.max_size_mb.to_string(),
            ConfigKey::TilesConcurrency => config.tiles.concurrency.to_string(),
            ConfigKey::TilesTimeoutSecs => config.tiles.timeout_secs.to_string(),
            ConfigKey::TilesUserAgent => config.tiles.user_agent.clone(),
            ConfigKey::LoggingFile => config
                .logging
                .file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Validates and stores a value. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self {
            ConfigKey::FusionMaxAccuracyM => {
                config.fusion.max_accuracy_m = parse_positive_f64(value)
                    .ok_or_else(|| invalid("expected a positive number"))?;
            }
            ConfigKey::FusionMaxPositionAgeMs => {
                config.fusion.max_position_age_ms = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|_| invalid("expected milliseconds"))?)
                };
            }
            ConfigKey::FusionSmoothingAlpha => {
                config.fusion.smoothing_alpha = if value.is_empty() {
                    None
                } else {
                    let alpha = parse_positive_f64(value)
                        .filter(|a| *a <= 1.0)
                        .ok_or_else(|| invalid("expected a number in (0, 1]"))?;
                    Some(alpha)
                };
            }
            ConfigKey::ZonesGridCellDegrees => {
                config.zones.grid_cell_degrees = parse_positive_f64(value)
                    .filter(|d| *d <= 90.0)
                    .ok_or_else(|| invalid("expected degrees in (0, 90]"))?;
            }
            ConfigKey::TilesDirectory => {
                if value.is_empty() {
                    return Err(invalid("directory cannot be empty"));
                }
                config.tiles.directory = expand_tilde(value);
            }
            ConfigKey::TilesUrlTemplate => {
                if !["{z}", "{x}", "{y}"].iter().all(|p| value.contains(p)) {
                    return Err(invalid("template needs {z}, {x} and {y}"));
                }
                config.tiles.url_template = value.to_string();
            }
            ConfigKey::TilesMaxSizeMb => {
                config.tiles.max_size_mb = value.parse().map_err(|_| invalid("expected megabytes"))?;
            }
            ConfigKey::TilesConcurrency => {
                config.tiles.concurrency = value
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("expected a positive integer"))?;
            }
            ConfigKey::TilesTimeoutSecs => {
                config.tiles.timeout_secs = value
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("expected a positive number of seconds"))?;
            }
            ConfigKey::TilesUserAgent => {
                if value.is_empty() {
                    return Err(invalid("user agent cannot be empty"));
                }
                config.tiles.user_agent = value.to_string();
            }
            ConfigKey::LoggingFile => {
                config.logging.file = (!value.is_empty()).then(|| expand_tilde(value));
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

fn parse_positive_f64(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn expand_tilde(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    }
}
