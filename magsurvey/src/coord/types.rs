//! Coordinate types for tiles and survey regions.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Northern limit of the Web Mercator projection.
pub const MAX_LAT: f64 = 85.05112878;

/// Southern limit of the Web Mercator projection.
pub const MIN_LAT: f64 = -85.05112878;

/// Western longitude limit.
pub const MIN_LON: f64 = -180.0;

/// Eastern longitude limit.
pub const MAX_LON: f64 = 180.0;

/// Lowest supported zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Highest supported zoom level (OSM raster tiles stop at 19).
pub const MAX_ZOOM: u8 = 19;

/// Errors from coordinate validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("latitude {0} is outside the Web Mercator range")]
    InvalidLatitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),

    #[error("zoom level {0} is outside [{MIN_ZOOM}, {MAX_ZOOM}]")]
    InvalidZoom(u8),

    #[error("zoom range {min}..={max} is empty")]
    EmptyZoomRange { min: u8, max: u8 },

    #[error("bounding box is inverted: south {south} > north {north} or west {west} > east {east}")]
    InvertedBounds {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },
}

/// One map tile addressed by `(zoom, x, y)`.
///
/// `x` grows eastward and `y` grows southward, as in the slippy-map scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this zoom level.
    pub fn tiles_per_axis(zoom: u8) -> u32 {
        1u32 << zoom
    }

    /// Geographic bounds covered by this tile.
    pub fn bounds(&self) -> BoundingBox {
        let (north, west) = super::tile_to_lat_lon(self);
        let (south, east) = super::tile_to_lat_lon(&TileKey::new(self.zoom, self.x + 1, self.y + 1));
        BoundingBox {
            south,
            west,
            north,
            east,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// A WGS84 rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Creates a validated bounding box.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self, CoordError> {
        for lat in [south, north] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(CoordError::InvalidLatitude(lat));
            }
        }
        for lon in [west, east] {
            if !(MIN_LON..=MAX_LON).contains(&lon) {
                return Err(CoordError::InvalidLongitude(lon));
            }
        }
        if south > north || west > east {
            return Err(CoordError::InvertedBounds {
                south,
                west,
                north,
                east,
            });
        }
        Ok(Self {
            south,
            west,
            north,
            east,
        })
    }

    /// Whether the point lies inside or on the edge of the box.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }

    /// Whether the two boxes share any area or edge.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.south <= other.north
            && other.south <= self.north
            && self.west <= other.east
            && other.west <= self.east
    }

    /// Whether the two boxes share a region of non-zero area. Boxes that only
    /// touch along an edge or at a corner do not overlap.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.south < other.north
            && other.south < self.north
            && self.west < other.east
            && other.west < self.east
    }

    /// Clamps latitudes into the Web Mercator range used for tiling.
    pub(crate) fn clamped_to_mercator(&self) -> BoundingBox {
        BoundingBox {
            south: self.south.clamp(MIN_LAT, MAX_LAT),
            west: self.west,
            north: self.north.clamp(MIN_LAT, MAX_LAT),
            east: self.east,
        }
    }
}

impl From<BoundingBox> for geo::Rect<f64> {
    fn from(bbox: BoundingBox) -> Self {
        geo::Rect::new(
            geo::coord! { x: bbox.west, y: bbox.south },
            geo::coord! { x: bbox.east, y: bbox.north },
        )
    }
}

/// Inclusive zoom range for a download plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Result<Self, CoordError> {
        if max > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(max));
        }
        if min > max {
            return Err(CoordError::EmptyZoomRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn single(zoom: u8) -> Result<Self, CoordError> {
        Self::new(zoom, zoom)
    }

    pub fn levels(&self) -> RangeInclusive<u8> {
        self.min..=self.max
    }
}

/// Lazy iterator over every tile of a region across a zoom range.
///
/// Yields zoom levels in ascending order and tiles in row-major order within
/// each level. Each tile is produced exactly once.
#[derive(Debug, Clone)]
pub struct TilePlan {
    bbox: BoundingBox,
    min_zoom: u8,
    zoom: u8,
    max_zoom: u8,
    x_min: u32,
    x_max: u32,
    y_max: u32,
    next_x: u32,
    next_y: u32,
    done: bool,
}

impl TilePlan {
    pub(crate) fn new(bbox: BoundingBox, zooms: ZoomRange) -> Self {
        let bbox = bbox.clamped_to_mercator();
        let mut plan = Self {
            bbox,
            min_zoom: zooms.min,
            zoom: zooms.min,
            max_zoom: zooms.max,
            x_min: 0,
            x_max: 0,
            y_max: 0,
            next_x: 0,
            next_y: 0,
            done: false,
        };
        plan.enter_zoom(zooms.min);
        plan
    }

    fn enter_zoom(&mut self, zoom: u8) {
        let (x_min, y_min) = super::lat_lon_to_tile_xy(self.bbox.north, self.bbox.west, zoom);
        let (x_max, y_max) = super::lat_lon_to_tile_xy(self.bbox.south, self.bbox.east, zoom);
        self.zoom = zoom;
        self.x_min = x_min;
        self.x_max = x_max;
        self.y_max = y_max;
        self.next_x = x_min;
        self.next_y = y_min;
    }

    /// Total number of tiles the full plan yields, without iterating.
    pub fn tile_count(&self) -> u64 {
        (self.min_zoom..=self.max_zoom)
            .map(|zoom| {
                let (x_min, y_min) = super::lat_lon_to_tile_xy(self.bbox.north, self.bbox.west, zoom);
                let (x_max, y_max) = super::lat_lon_to_tile_xy(self.bbox.south, self.bbox.east, zoom);
                u64::from(x_max - x_min + 1) * u64::from(y_max - y_min + 1)
            })
            .sum()
    }
}

impl Iterator for TilePlan {
    type Item = TileKey;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let key = TileKey::new(self.zoom, self.next_x, self.next_y);

        if self.next_x < self.x_max {
            self.next_x += 1;
        } else if self.next_y < self.y_max {
            self.next_x = self.x_min;
            self.next_y += 1;
        } else if self.zoom < self.max_zoom {
            let next = self.zoom + 1;
            self.enter_zoom(next);
        } else {
            self.done = true;
        }

        Some(key)
    }
}
