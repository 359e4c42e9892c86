//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and Web Mercator slippy-map tiles, plus the region types used to plan
//! offline tile downloads.

mod types;

pub use types::{
    BoundingBox, CoordError, TileKey, TilePlan, ZoomRange, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT,
    MIN_LON, MIN_ZOOM,
};

use std::f64::consts::PI;

/// Converts geographic coordinates to the tile containing them.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 19)
#[inline]
pub fn to_tile_key(lat: f64, lon: f64, zoom: u8) -> Result<TileKey, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let (x, y) = lat_lon_to_tile_xy(lat, lon, zoom);
    Ok(TileKey { zoom, x, y })
}

/// Unchecked projection, clamped so the eastern and southern edges map to
/// the last tile rather than one past it.
#[inline]
pub(crate) fn lat_lon_to_tile_xy(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let n = 2.0_f64.powi(zoom as i32);
    let last = TileKey::tiles_per_axis(zoom) - 1;

    let x = ((lon + 180.0) / 360.0 * n).floor().max(0.0) as u32;

    let lat_rad = lat.clamp(MIN_LAT, MAX_LAT) * PI / 180.0;
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor().max(0.0) as u32;

    (x.min(last), y.min(last))
}

/// Converts a tile back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileKey) -> (f64, f64) {
    let n = 2.0_f64.powi(tile.zoom as i32);

    let lon = tile.x as f64 / n * 360.0 - 180.0;

    let y = tile.y as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}

/// Plans every tile covering `bbox` for each zoom level in `zooms`.
///
/// The returned iterator is lazy and finite.
pub fn plan_tiles(bbox: BoundingBox, zooms: ZoomRange) -> TilePlan {
    TilePlan::new(bbox, zooms)
}
