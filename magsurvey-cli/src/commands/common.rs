//! Common argument types and helpers shared across CLI commands.

use std::path::PathBuf;

use clap::Args;
use magsurvey::config::ConfigFile;
use magsurvey::coord::BoundingBox;
use magsurvey::zones::{RestrictedZoneIndex, ZoneCategory, ZoneLayer};
use tracing::warn;

use crate::error::CliError;

/// A rectangular area given as four coordinates.
#[derive(Debug, Clone, Args)]
pub struct BoundsArgs {
    /// Southern latitude (degrees)
    #[arg(long, allow_hyphen_values = true)]
    pub south: f64,
    /// Western longitude (degrees)
    #[arg(long, allow_hyphen_values = true)]
    pub west: f64,
    /// Northern latitude (degrees)
    #[arg(long, allow_hyphen_values = true)]
    pub north: f64,
    /// Eastern longitude (degrees)
    #[arg(long, allow_hyphen_values = true)]
    pub east: f64,
}

impl BoundsArgs {
    pub fn to_bbox(&self) -> Result<BoundingBox, CliError> {
        BoundingBox::new(self.south, self.west, self.north, self.east)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))
    }
}

/// Zone layer files to load.
#[derive(Debug, Clone, Args)]
pub struct LayerArgs {
    /// GeoJSON zone layer (repeatable)
    #[arg(long = "layer", value_name = "FILE", required = true)]
    pub layers: Vec<PathBuf>,

    /// Category for features without a `category` property
    /// (population_density, airport, no_fly)
    #[arg(long, default_value = "no_fly")]
    pub category: ZoneCategory,
}

impl LayerArgs {
    /// Loads every layer. A missing file is an error; layers with bad
    /// contents are reported and skipped.
    pub fn load(&self, config: &ConfigFile) -> Result<RestrictedZoneIndex, CliError> {
        let layers = self
            .layers
            .iter()
            .map(|path| ZoneLayer::from_path(path, self.category))
            .collect::<Result<Vec<_>, _>>()?;

        let (index, report) = RestrictedZoneIndex::load(&config.zone_index_config(), layers);
        for (name, error) in &report.skipped {
            eprintln!("  skipped layer {}: {}", name, error);
        }
        if report.skipped_features() > 0 {
            warn!(features = report.skipped_features(), "Skipped malformed zone features");
        }
        if index.is_empty() && !report.skipped.is_empty() {
            return Err(CliError::InvalidArgument(
                "no zone layer could be loaded".to_string(),
            ));
        }
        Ok(index)
    }
}
