//! Spherical-earth helpers for survey planning and circle zones.
//!
//! All functions assume WGS84 degrees and a spherical earth of radius
//! [`EARTH_RADIUS_M`]. Accuracy is well within what a walked survey needs.

use std::f64::consts::PI;

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Great-circle distance between two points in metres (haversine formula).
pub fn haversine_distance(a: LatLon, b: LatLon) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `a` to `b` in degrees clockwise from north, in `[0, 360)`.
pub fn initial_bearing(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Area of a ring in square metres. The ring may be open or closed.
///
/// Uses the spherical-excess approximation; rings with fewer than three
/// vertices have zero area.
pub fn polygon_area(ring: &[LatLon]) -> f64 {
    let ring = open_ring(ring);
    if ring.len() < 3 {
        return 0.0;
    }

    let sum: f64 = ring
        .iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(p1, p2)| {
            let d_lon = (p2.lon - p1.lon).to_radians();
            d_lon * (2.0 + p1.lat.to_radians().sin() + p2.lat.to_radians().sin())
        })
        .sum();

    (sum * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs()
}

/// Perimeter of a ring in metres, including the closing edge.
pub fn polygon_perimeter(ring: &[LatLon]) -> f64 {
    let ring = open_ring(ring);
    if ring.len() < 2 {
        return 0.0;
    }

    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(a, b)| haversine_distance(*a, *b))
        .sum()
}

/// Arithmetic mean of the ring's distinct vertices.
pub fn vertex_centroid(ring: &[LatLon]) -> Option<LatLon> {
    let ring = open_ring(ring);
    if ring.is_empty() {
        return None;
    }
    let n = ring.len() as f64;
    let (lat, lon) = ring
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
    Some(LatLon::new(lat / n, lon / n))
}

/// Degrees of latitude spanned by `meters` north-south.
pub fn meters_to_lat_degrees(meters: f64) -> f64 {
    meters / EARTH_RADIUS_M * 180.0 / PI
}

/// Degrees of longitude spanned by `meters` east-west at `lat`.
///
/// Near the poles the span is capped at a full revolution.
pub fn meters_to_lon_degrees(meters: f64, lat: f64) -> f64 {
    let cos_lat = lat.to_radians().cos();
    if cos_lat.abs() < 1e-9 {
        return 360.0;
    }
    (meters_to_lat_degrees(meters) / cos_lat).min(360.0)
}

/// Drops a duplicated closing vertex so edge iteration does not double count.
fn open_ring(ring: &[LatLon]) -> &[LatLon] {
    match ring {
        [first, .., last] if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_tokyo_osaka() {
        let tokyo = LatLon::new(35.6812, 139.7671);
        let osaka = LatLon::new(34.7025, 135.4959);
        let d = haversine_distance(tokyo, osaka);
        // Roughly 403 km great-circle
        assert!((d - 403_000.0).abs() < 5_000.0, "distance was {d}");
    }

    #[test]
    fn test_haversine_zero_distance() {
        let p = LatLon::new(43.0, 141.0);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn test_bearing_due_east_on_equator() {
        let bearing = initial_bearing(LatLon::new(0.0, 0.0), LatLon::new(0.0, 1.0));
        assert!((bearing - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_due_north() {
        let bearing = initial_bearing(LatLon::new(10.0, 20.0), LatLon::new(11.0, 20.0));
        assert!(bearing.abs() < 1e-9);
    }

    #[test]
    fn test_area_of_small_square() {
        // ~111 m x ~111 m square at the equator
        let d = 0.001;
        let ring = [
            LatLon::new(0.0, 0.0),
            LatLon::new(0.0, d),
            LatLon::new(d, d),
            LatLon::new(d, 0.0),
            LatLon::new(0.0, 0.0),
        ];
        let side = haversine_distance(ring[0], ring[1]);
        let area = polygon_area(&ring);
        assert!((area - side * side).abs() / (side * side) < 0.01, "area was {area}");
    }

    #[test]
    fn test_closed_and_open_rings_agree() {
        let open = [
            LatLon::new(35.0, 139.0),
            LatLon::new(35.0, 139.01),
            LatLon::new(35.01, 139.01),
        ];
        let mut closed = open.to_vec();
        closed.push(open[0]);

        assert_eq!(polygon_area(&open), polygon_area(&closed));
        assert_eq!(polygon_perimeter(&open), polygon_perimeter(&closed));
        assert_eq!(vertex_centroid(&open), vertex_centroid(&closed));
    }

    #[test]
    fn test_degenerate_rings() {
        assert_eq!(polygon_area(&[]), 0.0);
        assert_eq!(polygon_perimeter(&[LatLon::new(1.0, 1.0)]), 0.0);
        assert!(vertex_centroid(&[]).is_none());
    }

    #[test]
    fn test_meter_degree_conversion() {
        let lat_deg = meters_to_lat_degrees(111_195.0);
        assert!((lat_deg - 1.0).abs() < 1e-3);

        let lon_deg = meters_to_lon_degrees(111_195.0, 60.0);
        assert!((lon_deg - 2.0).abs() < 1e-2);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_haversine_symmetric(
                lat1 in -89.0..89.0_f64, lon1 in -179.0..179.0_f64,
                lat2 in -89.0..89.0_f64, lon2 in -179.0..179.0_f64
            ) {
                let a = LatLon::new(lat1, lon1);
                let b = LatLon::new(lat2, lon2);
                let ab = haversine_distance(a, b);
                let ba = haversine_distance(b, a);
                prop_assert!((ab - ba).abs() < 1e-6);
                prop_assert!(ab <= PI * EARTH_RADIUS_M + 1.0);
            }
        }
    }
}
