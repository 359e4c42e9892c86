//! Restricted flight zones.
//!
//! Zone layers are GeoJSON FeatureCollections (population-density districts,
//! airport surroundings, no-fly facilities). They are parsed once into a
//! [`RestrictedZoneIndex`] that answers point and rectangle queries.

mod grid;
mod index;
mod parser;
mod types;

pub use index::{
    LayerSummary, LoadReport, RestrictedZoneIndex, ZoneIndexConfig, DEFAULT_GRID_CELL_DEGREES,
};
pub use types::{RestrictedZone, ZoneCategory, ZoneGeometry};

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that cause a zone layer to be skipped.
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("invalid GeoJSON: {0}")]
    Parse(String),

    #[error("failed to read layer {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One GeoJSON layer awaiting load.
#[derive(Debug, Clone)]
pub struct ZoneLayer {
    pub name: String,
    /// Category for features without a `category` property.
    pub default_category: ZoneCategory,
    pub source: String,
}

impl ZoneLayer {
    pub fn new(
        name: impl Into<String>,
        default_category: ZoneCategory,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            default_category,
            source: source.into(),
        }
    }

    /// Reads a layer from disk, naming it after the file stem.
    pub fn from_path(path: &Path, default_category: ZoneCategory) -> Result<Self, LayerError> {
        let source = std::fs::read_to_string(path).map_err(|source| LayerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, default_category, source))
    }
}
