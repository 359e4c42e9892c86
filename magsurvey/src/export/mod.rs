//! GeoJSON export of survey snapshots.

use std::io::Write;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use thiserror::Error;

use crate::measurement::MeasurementPoint;
use crate::mission::Mission;
use crate::store::SurveySnapshot;

/// Errors from export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("snapshot belongs to mission {snapshot}, not {mission}")]
    MissionMismatch { mission: String, snapshot: String },

    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes a snapshot as a GeoJSON FeatureCollection.
///
/// Each point becomes a `Point` feature. Mission metadata and summary
/// statistics are written as foreign members of the collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonExporter {
    pretty: bool,
}

impl GeoJsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Builds the FeatureCollection without writing it.
    pub fn to_collection(
        &self,
        mission: &Mission,
        snapshot: &SurveySnapshot,
    ) -> Result<FeatureCollection, ExportError> {
        if snapshot.mission_id() != mission.id() {
            return Err(ExportError::MissionMismatch {
                mission: mission.id().to_string(),
                snapshot: snapshot.mission_id().to_string(),
            });
        }

        let features = snapshot.iter().map(point_feature).collect();

        let mut members = JsonObject::new();
        members.insert("mission".to_string(), mission_json(mission));
        members.insert(
            "statistics".to_string(),
            serde_json::to_value(snapshot.statistics())?,
        );

        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(members),
        })
    }

    pub fn export<W: Write>(
        &self,
        mission: &Mission,
        snapshot: &SurveySnapshot,
        mut writer: W,
    ) -> Result<(), ExportError> {
        let collection = self.to_collection(mission, snapshot)?;
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, &collection)?;
        } else {
            serde_json::to_writer(&mut writer, &collection)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn mission_json(mission: &Mission) -> JsonValue {
    serde_json::json!({
        "id": mission.id().to_string(),
        "name": mission.name(),
        "operator": mission.operator(),
        "memo": mission.memo(),
        "reference_ut": mission.reference_ut(),
        "safe_threshold": mission.thresholds().safe(),
        "danger_threshold": mission.thresholds().danger(),
        "created_at": mission.created_at().to_rfc3339(),
    })
}

fn point_feature(point: &MeasurementPoint) -> Feature {
    let sample = &point.sample;

    let mut properties = JsonObject::new();
    properties.insert("magnitude".to_string(), sample.magnitude.into());
    properties.insert("noise".to_string(), point.noise.into());
    properties.insert("severity".to_string(), point.severity.to_string().into());
    properties.insert("accuracy_m".to_string(), sample.accuracy_m.into());
    properties.insert("mode".to_string(), sample.mode.to_string().into());
    properties.insert("timestamp".to_string(), sample.timestamp.to_rfc3339().into());
    properties.insert("in_restricted_zone".to_string(), point.in_restricted_zone.into());
    properties.insert("x".to_string(), sample.field.x.into());
    properties.insert("y".to_string(), sample.field.y.into());
    properties.insert("z".to_string(), sample.field.z.into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![
            sample.longitude,
            sample.latitude,
        ]))),
        id: Some(geojson::feature::Id::String(point.id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}
