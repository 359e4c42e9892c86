//! Restricted zone model.

use std::fmt;
use std::str::FromStr;

use geo::{Contains, Intersects, MultiPolygon, Point};
use serde::{Deserialize, Serialize};

use crate::coord::BoundingBox;
use crate::geodesy::{self, LatLon};

/// Legal category of a restricted zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneCategory {
    /// Densely inhabited district (DID).
    PopulationDensity,
    /// Airport surroundings.
    Airport,
    /// Key facilities where flight is prohibited.
    NoFlyFacility,
}

impl ZoneCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneCategory::PopulationDensity => "population_density",
            ZoneCategory::Airport => "airport",
            ZoneCategory::NoFlyFacility => "no_fly_facility",
        }
    }
}

impl fmt::Display for ZoneCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ZoneCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "population_density" | "did" => Ok(ZoneCategory::PopulationDensity),
            "airport" => Ok(ZoneCategory::Airport),
            "no_fly" | "no_fly_facility" => Ok(ZoneCategory::NoFlyFacility),
            other => Err(format!("unknown zone category: {other}")),
        }
    }
}

/// Zone outline.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneGeometry {
    /// One or more polygons in `(lon, lat)` order.
    Polygon(MultiPolygon<f64>),
    /// Everything within `radius_m` of `center`.
    Circle { center: LatLon, radius_m: f64 },
}

/// A no-fly area loaded from a zone layer. Read-only after load.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictedZone {
    pub id: String,
    pub name: String,
    pub category: ZoneCategory,
    pub geometry: ZoneGeometry,
    /// Layer the zone was loaded from.
    pub layer: String,
    pub(crate) bbox: BoundingBox,
}

impl RestrictedZone {
    /// Bounding box of the geometry, clamped to valid coordinates.
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Whether `(lat, lon)` lies inside the zone.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if !self.bbox.contains(lat, lon) {
            return false;
        }
        match &self.geometry {
            ZoneGeometry::Polygon(polygons) => polygons.contains(&Point::new(lon, lat)),
            ZoneGeometry::Circle { center, radius_m } => {
                geodesy::haversine_distance(*center, LatLon::new(lat, lon)) <= *radius_m
            }
        }
    }

    /// Whether the zone overlaps `bbox`.
    pub fn intersects(&self, bbox: &BoundingBox) -> bool {
        if !self.bbox.intersects(bbox) {
            return false;
        }
        match &self.geometry {
            ZoneGeometry::Polygon(polygons) => {
                let rect: geo::Rect<f64> = (*bbox).into();
                polygons.intersects(&rect.to_polygon())
            }
            ZoneGeometry::Circle { center, radius_m } => {
                let nearest = LatLon::new(
                    center.lat.clamp(bbox.south, bbox.north),
                    center.lon.clamp(bbox.west, bbox.east),
                );
                geodesy::haversine_distance(*center, nearest) <= *radius_m
            }
        }
    }

    /// Approximate area in square metres.
    pub fn area_m2(&self) -> f64 {
        match &self.geometry {
            ZoneGeometry::Polygon(polygons) => polygons
                .iter()
                .map(|polygon| {
                    let ring = |line: &geo::LineString<f64>| -> Vec<LatLon> {
                        line.coords().map(|c| LatLon::new(c.y, c.x)).collect()
                    };
                    let holes: f64 = polygon
                        .interiors()
                        .iter()
                        .map(|hole| geodesy::polygon_area(&ring(hole)))
                        .sum();
                    geodesy::polygon_area(&ring(polygon.exterior())) - holes
                })
                .sum(),
            ZoneGeometry::Circle { radius_m, .. } => std::f64::consts::PI * radius_m * radius_m,
        }
    }
}
