//! Severity classification of fused samples.

use crate::measurement::{MeasurementPoint, MeasurementSample, PointId, Severity};
use crate::mission::{Mission, Thresholds};
use crate::zones::RestrictedZoneIndex;

/// Maps a noise value to its tier.
///
/// Tiers are half-open: a value equal to a threshold belongs to the higher
/// tier.
pub fn severity_for(noise: f64, thresholds: Thresholds) -> Severity {
    if noise < thresholds.safe() {
        Severity::Safe
    } else if noise < thresholds.danger() {
        Severity::Caution
    } else {
        Severity::Danger
    }
}

/// Absolute deviation of `magnitude` from the mission reference.
pub fn noise(magnitude: f64, reference_ut: f64) -> f64 {
    (magnitude - reference_ut).abs()
}

/// Turns samples into measurement points for a mission.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdClassifier;

impl ThresholdClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classifies a sample without zone lookup.
    pub fn classify(&self, sample: MeasurementSample, mission: &Mission) -> MeasurementPoint {
        let noise = noise(sample.magnitude, mission.reference_ut());
        MeasurementPoint {
            id: PointId::new(),
            mission_id: mission.id(),
            severity: severity_for(noise, mission.thresholds()),
            noise,
            sample,
            in_restricted_zone: false,
        }
    }

    /// Classifies a sample and flags it if it falls inside any restricted zone.
    pub fn classify_with_zones(
        &self,
        sample: MeasurementSample,
        mission: &Mission,
        zones: &RestrictedZoneIndex,
    ) -> MeasurementPoint {
        let in_zone = zones.contains_point(sample.latitude, sample.longitude);
        MeasurementPoint {
            in_restricted_zone: in_zone,
            ..self.classify(sample, mission)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{RawField, SampleMode};
    use chrono::Utc;

    fn sample(magnitude: f64) -> MeasurementSample {
        MeasurementSample {
            field: RawField::new(0.0, 0.0, magnitude),
            magnitude,
            latitude: 35.0,
            longitude: 139.0,
            accuracy_m: 3.0,
            timestamp: Utc::now(),
            mode: SampleMode::Manual,
        }
    }

    fn mission() -> Mission {
        Mission::builder("Test site", "Tanaka").build().unwrap()
    }

    #[test]
    fn test_caution_example() {
        let point = ThresholdClassifier.classify(sample(58.3), &mission());
        assert!((point.noise - 12.3).abs() < 1e-9);
        assert_eq!(point.severity, Severity::Caution);
        assert!(!point.in_restricted_zone);
    }

    #[test]
    fn test_danger_example() {
        let point = ThresholdClassifier.classify(sample(100.0), &mission());
        assert_eq!(point.noise, 54.0);
        assert_eq!(point.severity, Severity::Danger);
    }

    #[test]
    fn test_below_reference_uses_absolute_deviation() {
        let point = ThresholdClassifier.classify(sample(40.0), &mission());
        assert_eq!(point.noise, 6.0);
        assert_eq!(point.severity, Severity::Safe);
    }

    #[test]
    fn test_boundaries_belong_to_higher_tier() {
        let thresholds = Thresholds::new(10.0, 50.0).unwrap();
        assert_eq!(severity_for(9.999, thresholds), Severity::Safe);
        assert_eq!(severity_for(10.0, thresholds), Severity::Caution);
        assert_eq!(severity_for(49.999, thresholds), Severity::Caution);
        assert_eq!(severity_for(50.0, thresholds), Severity::Danger);
    }

    #[test]
    fn test_point_carries_mission_id() {
        let m = mission();
        let point = ThresholdClassifier.classify(sample(46.0), &m);
        assert_eq!(point.mission_id, m.id());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_tiers_partition_noise(
                safe in 0.1..100.0_f64,
                gap in 0.1..100.0_f64,
                noise in 0.0..300.0_f64
            ) {
                let danger = safe + gap;
                let thresholds = Thresholds::new(safe, danger).unwrap();
                let expected = if noise < safe {
                    Severity::Safe
                } else if noise < danger {
                    Severity::Caution
                } else {
                    Severity::Danger
                };
                prop_assert_eq!(severity_for(noise, thresholds), expected);
            }

            #[test]
            fn test_severity_monotonic_in_noise(
                a in 0.0..200.0_f64,
                b in 0.0..200.0_f64
            ) {
                let thresholds = Thresholds::default();
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(severity_for(lo, thresholds) <= severity_for(hi, thresholds));
            }
        }
    }
}
