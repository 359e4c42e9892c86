//! GeoJSON zone layer parsing.

use geo::{BoundingRect, LineString, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, JsonObject, Value};
use tracing::debug;

use super::{LayerError, RestrictedZone, ZoneCategory, ZoneGeometry, ZoneLayer};
use crate::coord::BoundingBox;
use crate::geodesy::{self, LatLon};

/// CRS names equivalent to plain WGS84 longitude/latitude.
const WGS84_NAMES: &[&str] = &[
    "urn:ogc:def:crs:OGC:1.3:CRS84",
    "urn:ogc:def:crs:OGC::CRS84",
    "urn:ogc:def:crs:EPSG::4326",
    "EPSG:4326",
    "CRS84",
];

/// Zones parsed from one layer.
pub(crate) struct ParsedLayer {
    pub zones: Vec<RestrictedZone>,
    pub skipped_features: usize,
}

/// Parses a FeatureCollection into zones.
///
/// Malformed features are skipped. A layer that declares a non-WGS84 CRS or
/// contains out-of-range coordinates fails as a whole.
pub(crate) fn parse_layer(layer: &ZoneLayer) -> Result<ParsedLayer, LayerError> {
    let geojson: GeoJson = layer
        .source
        .parse()
        .map_err(|e: geojson::Error| LayerError::Parse(e.to_string()))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        _ => return Err(LayerError::Parse("expected a FeatureCollection".to_string())),
    };

    if let Some(crs) = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
    {
        check_crs(crs)?;
    }

    let total = collection.features.len();
    let mut zones = Vec::with_capacity(total);
    let mut skipped_features = 0;

    for (index, feature) in collection.features.iter().enumerate() {
        match parse_feature(layer, index, feature) {
            Ok(zone) => zones.push(zone),
            Err(LayerError::MalformedGeometry(reason)) => {
                debug!(layer = %layer.name, index, %reason, "skipping malformed feature");
                skipped_features += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if zones.is_empty() && skipped_features > 0 {
        return Err(LayerError::MalformedGeometry(format!(
            "all {total} features are malformed"
        )));
    }

    Ok(ParsedLayer {
        zones,
        skipped_features,
    })
}

fn check_crs(crs: &serde_json::Value) -> Result<(), LayerError> {
    let name = crs
        .get("properties")
        .and_then(|props| props.get("name"))
        .and_then(|name| name.as_str())
        .unwrap_or_default();

    if WGS84_NAMES.iter().any(|known| known.eq_ignore_ascii_case(name)) {
        Ok(())
    } else {
        Err(LayerError::UnsupportedCrs(if name.is_empty() {
            crs.to_string()
        } else {
            name.to_string()
        }))
    }
}

fn parse_feature(
    layer: &ZoneLayer,
    index: usize,
    feature: &Feature,
) -> Result<RestrictedZone, LayerError> {
    let properties = feature.properties.as_ref();
    let name = string_property(properties, "name").unwrap_or_else(|| format!("{} #{index}", layer.name));
    let id = feature_id(feature)
        .or_else(|| string_property(properties, "id"))
        .unwrap_or_else(|| format!("{}:{index}", layer.name));
    let category = string_property(properties, "category")
        .and_then(|raw| raw.parse::<ZoneCategory>().ok())
        .unwrap_or(layer.default_category);
    let radius = properties
        .and_then(|props| props.get("radius_meters"))
        .and_then(|value| value.as_f64());

    let value = feature
        .geometry
        .as_ref()
        .map(|geometry| &geometry.value)
        .ok_or_else(|| LayerError::MalformedGeometry("feature has no geometry".to_string()))?;

    let geometry = match (value, radius) {
        (_, Some(r)) if !(r.is_finite() && r > 0.0) => {
            return Err(LayerError::MalformedGeometry(format!("invalid radius {r}")));
        }
        (Value::Point(position), Some(radius_m)) => {
            let (lon, lat) = position_to_lon_lat(position)?;
            ZoneGeometry::Circle {
                center: LatLon::new(lat, lon),
                radius_m,
            }
        }
        (Value::Polygon(rings), Some(radius_m)) => {
            let polygon = polygon_from_rings(rings)?;
            let ring: Vec<LatLon> = polygon
                .exterior()
                .coords()
                .map(|c| LatLon::new(c.y, c.x))
                .collect();
            let center = geodesy::vertex_centroid(&ring)
                .ok_or_else(|| LayerError::MalformedGeometry("empty ring".to_string()))?;
            ZoneGeometry::Circle { center, radius_m }
        }
        (Value::Polygon(rings), None) => {
            ZoneGeometry::Polygon(MultiPolygon(vec![polygon_from_rings(rings)?]))
        }
        (Value::MultiPolygon(polygons), None) => ZoneGeometry::Polygon(MultiPolygon(
            polygons
                .iter()
                .map(|rings| polygon_from_rings(rings))
                .collect::<Result<_, _>>()?,
        )),
        (Value::Point(_), None) => {
            return Err(LayerError::MalformedGeometry(
                "point zone without radius_meters".to_string(),
            ));
        }
        (other, _) => {
            return Err(LayerError::MalformedGeometry(format!(
                "unsupported geometry type {}",
                geometry_type(other)
            )));
        }
    };

    let bbox = geometry_bbox(&geometry)?;

    Ok(RestrictedZone {
        id,
        name,
        category,
        geometry,
        layer: layer.name.clone(),
        bbox,
    })
}

fn geometry_type(value: &Value) -> &'static str {
    match value {
        Value::Point(_) => "Point",
        Value::MultiPoint(_) => "MultiPoint",
        Value::LineString(_) => "LineString",
        Value::MultiLineString(_) => "MultiLineString",
        Value::Polygon(_) => "Polygon",
        Value::MultiPolygon(_) => "MultiPolygon",
        Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn feature_id(feature: &Feature) -> Option<String> {
    feature.id.as_ref().map(|id| match id {
        geojson::feature::Id::String(s) => s.clone(),
        geojson::feature::Id::Number(n) => n.to_string(),
    })
}

fn string_property(properties: Option<&JsonObject>, key: &str) -> Option<String> {
    properties
        .and_then(|props| props.get(key))
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

/// Validates one `[lon, lat]` position.
///
/// Coordinates outside the WGS84 range mean the layer was written in a
/// projected CRS.
fn position_to_lon_lat(position: &[f64]) -> Result<(f64, f64), LayerError> {
    let (lon, lat) = match position {
        [lon, lat, ..] => (*lon, *lat),
        _ => {
            return Err(LayerError::MalformedGeometry(format!(
                "position needs 2 coordinates, got {}",
                position.len()
            )))
        }
    };
    if !lon.is_finite() || !lat.is_finite() {
        return Err(LayerError::MalformedGeometry("non-finite coordinate".to_string()));
    }
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(LayerError::UnsupportedCrs(format!(
            "coordinate [{lon}, {lat}] is outside WGS84 range"
        )));
    }
    Ok((lon, lat))
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Result<LineString<f64>, LayerError> {
    let coords = positions
        .iter()
        .map(|p| position_to_lon_lat(p))
        .collect::<Result<Vec<_>, _>>()?;

    let closed = coords.first() == coords.last();
    let distinct = if closed { coords.len().saturating_sub(1) } else { coords.len() };
    if distinct < 3 {
        return Err(LayerError::MalformedGeometry(format!(
            "ring has {distinct} distinct vertices, need at least 3"
        )));
    }

    // LineString -> Polygon closes open rings
    Ok(LineString::from(coords))
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, LayerError> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| LayerError::MalformedGeometry("polygon has no rings".to_string()))?;

    Ok(Polygon::new(
        ring_from_positions(exterior)?,
        interiors
            .iter()
            .map(|ring| ring_from_positions(ring))
            .collect::<Result<_, _>>()?,
    ))
}

fn geometry_bbox(geometry: &ZoneGeometry) -> Result<BoundingBox, LayerError> {
    let bbox = match geometry {
        ZoneGeometry::Polygon(polygons) => {
            let rect = polygons
                .bounding_rect()
                .ok_or_else(|| LayerError::MalformedGeometry("empty geometry".to_string()))?;
            BoundingBox::new(rect.min().y, rect.min().x, rect.max().y, rect.max().x)
        }
        ZoneGeometry::Circle { center, radius_m } => {
            let d_lat = geodesy::meters_to_lat_degrees(*radius_m);
            let d_lon = geodesy::meters_to_lon_degrees(*radius_m, center.lat);
            BoundingBox::new(
                (center.lat - d_lat).max(-90.0),
                (center.lon - d_lon).max(-180.0),
                (center.lat + d_lat).min(90.0),
                (center.lon + d_lon).min(180.0),
            )
        }
    };
    bbox.map_err(|e| LayerError::MalformedGeometry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(source: &str) -> ZoneLayer {
        ZoneLayer::new("test", ZoneCategory::NoFlyFacility, source)
    }

    #[test]
    fn test_parse_polygon_feature() {
        let parsed = parse_layer(&layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","id":"z1",
                 "properties":{"name":"Plant","category":"airport"},
                 "geometry":{"type":"Polygon","coordinates":[[[139.0,35.0],[139.1,35.0],[139.1,35.1],[139.0,35.1],[139.0,35.0]]]}}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(parsed.zones.len(), 1);
        let zone = &parsed.zones[0];
        assert_eq!(zone.id, "z1");
        assert_eq!(zone.name, "Plant");
        assert_eq!(zone.category, ZoneCategory::Airport);
        assert!(matches!(zone.geometry, ZoneGeometry::Polygon(_)));
        assert_eq!(zone.bbox().north, 35.1);
    }

    #[test]
    fn test_point_with_radius_is_circle() {
        let parsed = parse_layer(&layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"name":"Heliport","radius_meters":300},
                 "geometry":{"type":"Point","coordinates":[139.5,35.5]}}
            ]}"#,
        ))
        .unwrap();

        let zone = &parsed.zones[0];
        assert_eq!(zone.category, ZoneCategory::NoFlyFacility);
        assert_eq!(zone.id, "test:0");
        match zone.geometry {
            ZoneGeometry::Circle { center, radius_m } => {
                assert_eq!(center, LatLon::new(35.5, 139.5));
                assert_eq!(radius_m, 300.0);
            }
            _ => panic!("expected circle"),
        }
    }

    #[test]
    fn test_polygon_with_radius_buffers_centroid() {
        let parsed = parse_layer(&layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"radius_meters":1000},
                 "geometry":{"type":"Polygon","coordinates":[[[139.0,35.0],[139.2,35.0],[139.2,35.2],[139.0,35.2],[139.0,35.0]]]}}
            ]}"#,
        ))
        .unwrap();

        match parsed.zones[0].geometry {
            ZoneGeometry::Circle { center, .. } => {
                assert!((center.lat - 35.1).abs() < 1e-9);
                assert!((center.lon - 139.1).abs() < 1e-9);
            }
            _ => panic!("expected circle"),
        }
    }

    #[test]
    fn test_malformed_features_are_counted() {
        let parsed = parse_layer(&layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},
                 "geometry":{"type":"Polygon","coordinates":[[[139.0,35.0],[139.1,35.0],[139.0,35.0]]]}},
                {"type":"Feature","properties":{},
                 "geometry":{"type":"Point","coordinates":[139.0,35.0]}},
                {"type":"Feature","properties":{},"geometry":null},
                {"type":"Feature","properties":{"radius_meters":50},
                 "geometry":{"type":"Point","coordinates":[139.0,35.0]}}
            ]}"#,
        ))
        .unwrap();

        assert_eq!(parsed.zones.len(), 1);
        assert_eq!(parsed.skipped_features, 3);
    }

    #[test]
    fn test_all_malformed_fails_layer() {
        let result = parse_layer(&layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},
                 "geometry":{"type":"LineString","coordinates":[[139.0,35.0],[139.1,35.0]]}}
            ]}"#,
        ));
        assert!(matches!(result, Err(LayerError::MalformedGeometry(_))));
    }

    #[test]
    fn test_projected_crs_rejected() {
        let result = parse_layer(&layer(
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::6677"}},
                "features":[]}"#,
        ));
        assert!(matches!(result, Err(LayerError::UnsupportedCrs(_))));
    }

    #[test]
    fn test_crs84_accepted() {
        let result = parse_layer(&layer(
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:OGC:1.3:CRS84"}},
                "features":[]}"#,
        ));
        assert!(result.is_ok());
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let result = parse_layer(&layer(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{},
                 "geometry":{"type":"Polygon","coordinates":[[[-45000.0,120000.0],[-44000.0,120000.0],[-44000.0,121000.0],[-45000.0,120000.0]]]}}
            ]}"#,
        ));
        assert!(matches!(result, Err(LayerError::UnsupportedCrs(_))));
    }

    #[test]
    fn test_not_geojson() {
        assert!(matches!(parse_layer(&layer("not json")), Err(LayerError::Parse(_))));
        assert!(matches!(
            parse_layer(&layer(r#"{"type":"Point","coordinates":[0.0,0.0]}"#)),
            Err(LayerError::Parse(_))
        ));
    }
}
