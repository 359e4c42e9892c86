//! Restricted zone index.

use std::collections::HashSet;

use tracing::{info, warn};

use super::grid::ZoneGrid;
use super::parser::parse_layer;
use super::{LayerError, RestrictedZone, ZoneLayer};
use crate::coord::BoundingBox;

/// Default grid cell size in degrees (about 11 km of latitude).
pub const DEFAULT_GRID_CELL_DEGREES: f64 = 0.1;

/// Index construction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneIndexConfig {
    pub grid_cell_degrees: f64,
}

impl Default for ZoneIndexConfig {
    fn default() -> Self {
        Self {
            grid_cell_degrees: DEFAULT_GRID_CELL_DEGREES,
        }
    }
}

impl ZoneIndexConfig {
    /// Sets the grid cell size. Non-positive values keep the default.
    pub fn with_grid_cell_degrees(mut self, degrees: f64) -> Self {
        if degrees.is_finite() && degrees > 0.0 {
            self.grid_cell_degrees = degrees;
        }
        self
    }
}

/// Per-layer result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSummary {
    pub name: String,
    pub zones: usize,
    pub skipped_features: usize,
}

/// Outcome of [`RestrictedZoneIndex::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LayerSummary>,
    pub skipped: Vec<(String, LayerError)>,
}

impl LoadReport {
    pub fn zone_count(&self) -> usize {
        self.loaded.iter().map(|layer| layer.zones).sum()
    }

    pub fn skipped_features(&self) -> usize {
        self.loaded.iter().map(|layer| layer.skipped_features).sum()
    }
}

/// Immutable spatial index over restricted zones.
///
/// Built once by [`RestrictedZoneIndex::load`]; queries take `&self` and need
/// no locking, so the index can be shared across tasks behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RestrictedZoneIndex {
    zones: Vec<RestrictedZone>,
    grid: ZoneGrid,
}

impl Default for RestrictedZoneIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl RestrictedZoneIndex {
    /// An index with no zones; every query comes back empty.
    pub fn empty() -> Self {
        Self {
            zones: Vec::new(),
            grid: ZoneGrid::new(DEFAULT_GRID_CELL_DEGREES),
        }
    }

    /// Loads every layer, skipping the ones that fail.
    ///
    /// A failed layer is logged and listed in the report; it never prevents
    /// the remaining layers from loading.
    pub fn load<I>(config: &ZoneIndexConfig, layers: I) -> (Self, LoadReport)
    where
        I: IntoIterator<Item = ZoneLayer>,
    {
        let mut zones = Vec::new();
        let mut report = LoadReport::default();

        for layer in layers {
            match parse_layer(&layer) {
                Ok(parsed) => {
                    if parsed.skipped_features > 0 {
                        warn!(
                            layer = %layer.name,
                            skipped = parsed.skipped_features,
                            "Skipped malformed zone features"
                        );
                    }
                    info!(layer = %layer.name, zones = parsed.zones.len(), "Loaded zone layer");
                    report.loaded.push(LayerSummary {
                        name: layer.name.clone(),
                        zones: parsed.zones.len(),
                        skipped_features: parsed.skipped_features,
                    });
                    zones.extend(parsed.zones);
                }
                Err(e) => {
                    warn!(layer = %layer.name, error = %e, "Skipping zone layer");
                    report.skipped.push((layer.name, e));
                }
            }
        }

        let mut grid = ZoneGrid::new(config.grid_cell_degrees);
        for (entry, zone) in zones.iter().enumerate() {
            grid.insert(entry, &zone.bbox);
        }

        (Self { zones, grid }, report)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zones(&self) -> &[RestrictedZone] {
        &self.zones
    }

    /// Zones containing `(lat, lon)`, in load order.
    pub fn query(&self, lat: f64, lon: f64) -> Vec<&RestrictedZone> {
        let mut seen = HashSet::new();
        let mut hits: Vec<usize> = self
            .grid
            .candidates_at(lat, lon)
            .filter(|entry| seen.insert(*entry))
            .filter(|entry| self.zones[*entry].contains(lat, lon))
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|entry| &self.zones[entry]).collect()
    }

    /// Whether any zone contains `(lat, lon)`.
    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        self.grid
            .candidates_at(lat, lon)
            .any(|entry| self.zones[entry].contains(lat, lon))
    }

    /// Zones overlapping `bbox`, in load order.
    pub fn intersects(&self, bbox: &BoundingBox) -> Vec<&RestrictedZone> {
        match self.grid.candidates_in(bbox) {
            Some(candidates) => candidates
                .into_iter()
                .map(|entry| &self.zones[entry])
                .filter(|zone| zone.intersects(bbox))
                .collect(),
            None => self.zones.iter().filter(|zone| zone.intersects(bbox)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::ZoneCategory;

    const SQUARE: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","id":"square","properties":{"name":"Square"},
         "geometry":{"type":"Polygon","coordinates":[[[139.0,35.0],[139.1,35.0],[139.1,35.1],[139.0,35.1],[139.0,35.0]]]}}
    ]}"#;

    const HELIPORT: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","id":"heli","properties":{"name":"Heliport","radius_meters":500,"category":"airport"},
         "geometry":{"type":"Point","coordinates":[139.5,35.5]}}
    ]}"#;

    fn index() -> RestrictedZoneIndex {
        let (index, report) = RestrictedZoneIndex::load(
            &ZoneIndexConfig::default(),
            vec![
                ZoneLayer::new("did", ZoneCategory::PopulationDensity, SQUARE),
                ZoneLayer::new("airports", ZoneCategory::Airport, HELIPORT),
            ],
        );
        assert_eq!(report.zone_count(), 2);
        index
    }

    #[test]
    fn test_square_inside_and_outside() {
        let index = index();
        for _ in 0..3 {
            let inside = index.query(35.05, 139.05);
            assert_eq!(inside.len(), 1);
            assert_eq!(inside[0].id, "square");
            assert!(index.query(35.2, 139.05).is_empty());
            assert!(index.query(35.05, 138.95).is_empty());
        }
    }

    #[test]
    fn test_circle_zone() {
        let index = index();
        // ~333 m north of the centre
        assert!(index.contains_point(35.503, 139.5));
        // ~1.1 km north
        assert!(!index.contains_point(35.51, 139.5));
    }

    #[test]
    fn test_intersects_bbox() {
        let index = index();
        let overlapping = BoundingBox::new(35.09, 139.09, 35.2, 139.2).unwrap();
        let hits = index.intersects(&overlapping);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "square");

        let near_heliport = BoundingBox::new(35.502, 139.49, 35.51, 139.51).unwrap();
        assert_eq!(index.intersects(&near_heliport)[0].id, "heli");

        let empty = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(index.intersects(&empty).is_empty());
    }

    #[test]
    fn test_whole_world_bbox_scans_all() {
        let index = index();
        let world = BoundingBox::new(-90.0, -180.0, 90.0, 180.0).unwrap();
        assert_eq!(index.intersects(&world).len(), 2);
    }

    #[test]
    fn test_failed_layer_is_skipped() {
        let (index, report) = RestrictedZoneIndex::load(
            &ZoneIndexConfig::default(),
            vec![
                ZoneLayer::new("broken", ZoneCategory::NoFlyFacility, "{"),
                ZoneLayer::new("did", ZoneCategory::PopulationDensity, SQUARE),
            ],
        );

        assert_eq!(index.len(), 1);
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "broken");
        assert!(matches!(report.skipped[0].1, LayerError::Parse(_)));
    }

    #[test]
    fn test_empty_index() {
        let index = RestrictedZoneIndex::empty();
        assert!(index.query(35.0, 139.0).is_empty());
        assert!(!index.contains_point(35.0, 139.0));
    }

    #[test]
    fn test_index_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RestrictedZoneIndex>();
    }
}
