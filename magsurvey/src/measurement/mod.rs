//! Measurement data model shared by fusion, classification and storage.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mission::MissionId;

/// One raw magnetometer reading in μT.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawField {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl RawField {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Total field strength (Euclidean norm).
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// GNSS fix quality, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixQuality {
    NoFix,
    Fix2d,
    Fix3d,
    Dgps,
    RtkFloat,
    RtkFixed,
}

impl FixQuality {
    /// Whether the receiver reports a usable position at all.
    pub fn is_valid(&self) -> bool {
        !matches!(self, FixQuality::NoFix)
    }

    pub fn is_rtk(&self) -> bool {
        matches!(self, FixQuality::RtkFloat | FixQuality::RtkFixed)
    }
}

/// A position report from the internal receiver or an external RTK unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in metres (1σ radius).
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
    pub quality: FixQuality,
}

impl PositionFix {
    /// A 3D fix, the quality reported by platform location services.
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            timestamp,
            quality: FixQuality::Fix3d,
        }
    }

    pub fn with_quality(mut self, quality: FixQuality) -> Self {
        self.quality = quality;
        self
    }
}

/// How a sample was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    Automatic,
    Manual,
}

impl fmt::Display for SampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleMode::Automatic => write!(f, "automatic"),
            SampleMode::Manual => write!(f, "manual"),
        }
    }
}

/// A fused, validated reading at a position. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSample {
    pub field: RawField,
    pub magnitude: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
    pub mode: SampleMode,
}

/// Point identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub Uuid);

impl PointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Severity tier of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Safe,
    Caution,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Safe => write!(f, "safe"),
            Severity::Caution => write!(f, "caution"),
            Severity::Danger => write!(f, "danger"),
        }
    }
}

/// A classified sample belonging to one mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    pub id: PointId,
    pub mission_id: MissionId,
    pub sample: MeasurementSample,
    /// Absolute deviation of the magnitude from the mission reference, in μT.
    pub noise: f64,
    pub severity: Severity,
    pub in_restricted_zone: bool,
}
