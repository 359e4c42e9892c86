//! Sensor fusion: combine a magnetometer reading with a position fix.
//!
//! [`SampleFuser`] is a pure transform. [`MeasurementSession`] is the push
//! interface that sensor callbacks feed; it keeps the current reading window
//! and the latest fix and hands both to the fuser when a sample is taken.

mod session;
mod smoothing;

pub use session::MeasurementSession;
pub use smoothing::ReadingWindow;

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::coord::{MAX_LON, MIN_LON};
use crate::measurement::{MeasurementSample, PositionFix, RawField, SampleMode};
use crate::mission::DEFAULT_MEASUREMENT_INTERVAL;

/// Default horizontal accuracy bound in metres.
pub const DEFAULT_MAX_ACCURACY_M: f64 = 50.0;

/// Lower bound on the staleness window regardless of interval.
pub const MIN_POSITION_AGE: Duration = Duration::from_secs(1);

/// Errors that reject a single sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    #[error("position fix is {age:?} old (max {max:?})")]
    StalePosition { age: Duration, max: Duration },

    #[error("position accuracy {accuracy_m} m exceeds {max_m} m")]
    LowAccuracy { accuracy_m: f64, max_m: f64 },

    #[error("no magnetometer reading in the current window")]
    NoReading,

    #[error("no position fix received")]
    NoPositionFix,
}

/// Fusion bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Fixes with a larger horizontal accuracy radius are rejected.
    pub max_accuracy_m: f64,

    /// Fixes older than this at sampling time are rejected.
    pub max_position_age: Duration,

    /// EMA weight of the newest reading within a window, `(0, 1]`.
    ///
    /// `None` disables averaging; the last reading in the window wins.
    pub smoothing_alpha: Option<f64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::for_interval(DEFAULT_MEASUREMENT_INTERVAL)
    }
}

impl FusionConfig {
    /// Bounds for a mission sampling every `interval`.
    ///
    /// Staleness is twice the interval, never below [`MIN_POSITION_AGE`].
    pub fn for_interval(interval: Duration) -> Self {
        Self {
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            max_position_age: (interval * 2).max(MIN_POSITION_AGE),
            smoothing_alpha: None,
        }
    }

    pub fn with_max_accuracy(mut self, meters: f64) -> Self {
        self.max_accuracy_m = meters;
        self
    }

    pub fn with_max_position_age(mut self, age: Duration) -> Self {
        self.max_position_age = age;
        self
    }

    /// Enables EMA smoothing. Values outside `(0, 1]` disable it.
    pub fn with_smoothing(mut self, alpha: f64) -> Self {
        self.smoothing_alpha = (alpha > 0.0 && alpha <= 1.0).then_some(alpha);
        self
    }
}

/// Pure fusion of one reading and one fix.
#[derive(Debug, Clone, Default)]
pub struct SampleFuser {
    config: FusionConfig,
}

impl SampleFuser {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Builds a sample or explains why the inputs are unusable.
    ///
    /// # Arguments
    ///
    /// * `raw` - Magnetometer reading (μT)
    /// * `fix` - Most recent position fix
    /// * `now` - Sampling time, used for the staleness check and as the sample timestamp
    /// * `mode` - What triggered the sample
    ///
    /// # Errors
    ///
    /// * `LowAccuracy` - Accuracy radius above the bound, no-fix quality, or unusable coordinates
    /// * `StalePosition` - Fix older than the staleness bound
    /// * `NoReading` - Reading contains non-finite components
    pub fn fuse(
        &self,
        raw: RawField,
        fix: &PositionFix,
        now: DateTime<Utc>,
        mode: SampleMode,
    ) -> Result<MeasurementSample, FusionError> {
        let magnitude = raw.magnitude();
        if !magnitude.is_finite() {
            return Err(FusionError::NoReading);
        }

        let usable_position = fix.quality.is_valid()
            && (-90.0..=90.0).contains(&fix.latitude)
            && (MIN_LON..=MAX_LON).contains(&fix.longitude);
        // NaN accuracy fails the <= comparison
        if !usable_position || !(fix.accuracy_m <= self.config.max_accuracy_m) {
            return Err(FusionError::LowAccuracy {
                accuracy_m: fix.accuracy_m,
                max_m: self.config.max_accuracy_m,
            });
        }

        // A fix stamped slightly ahead of `now` (clock skew) counts as fresh
        let age = (now - fix.timestamp).to_std().unwrap_or(Duration::ZERO);
        if age > self.config.max_position_age {
            return Err(FusionError::StalePosition {
                age,
                max: self.config.max_position_age,
            });
        }

        Ok(MeasurementSample {
            field: raw,
            magnitude,
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy_m: fix.accuracy_m,
            timestamp: now,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::FixQuality;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn fix(accuracy_m: f64, age_ms: i64) -> PositionFix {
        PositionFix::new(
            35.6,
            139.7,
            accuracy_m,
            now() - chrono::Duration::milliseconds(age_ms),
        )
    }

    #[test]
    fn test_default_bounds() {
        let config = FusionConfig::default();
        assert_eq!(config.max_accuracy_m, 50.0);
        assert_eq!(config.max_position_age, Duration::from_secs(2));
        assert_eq!(config.smoothing_alpha, None);
    }

    #[test]
    fn test_staleness_floor() {
        let config = FusionConfig::for_interval(Duration::from_millis(100));
        assert_eq!(config.max_position_age, Duration::from_secs(1));
    }

    #[test]
    fn test_fuse_accepts_fresh_accurate_fix() {
        let fuser = SampleFuser::default();
        let sample = fuser
            .fuse(RawField::new(3.0, 4.0, 12.0), &fix(5.0, 200), now(), SampleMode::Manual)
            .unwrap();

        assert_eq!(sample.magnitude, 13.0);
        assert_eq!(sample.latitude, 35.6);
        assert_eq!(sample.timestamp, now());
        assert_eq!(sample.mode, SampleMode::Manual);
    }

    #[test]
    fn test_low_accuracy_rejected() {
        let fuser = SampleFuser::default();
        let result = fuser.fuse(RawField::default(), &fix(55.0, 0), now(), SampleMode::Automatic);
        assert_eq!(
            result,
            Err(FusionError::LowAccuracy {
                accuracy_m: 55.0,
                max_m: 50.0
            })
        );
    }

    #[test]
    fn test_accuracy_at_bound_accepted() {
        let fuser = SampleFuser::default();
        assert!(fuser
            .fuse(RawField::default(), &fix(50.0, 0), now(), SampleMode::Automatic)
            .is_ok());
    }

    #[test]
    fn test_no_fix_quality_is_low_accuracy() {
        let fuser = SampleFuser::default();
        let no_fix = fix(3.0, 0).with_quality(FixQuality::NoFix);
        let result = fuser.fuse(RawField::default(), &no_fix, now(), SampleMode::Automatic);
        assert!(matches!(result, Err(FusionError::LowAccuracy { .. })));
    }

    #[test]
    fn test_stale_position_rejected() {
        let fuser = SampleFuser::default();
        let result = fuser.fuse(RawField::default(), &fix(5.0, 2_500), now(), SampleMode::Automatic);
        assert!(matches!(result, Err(FusionError::StalePosition { .. })));
    }

    #[test]
    fn test_future_fix_is_fresh() {
        let fuser = SampleFuser::default();
        assert!(fuser
            .fuse(RawField::default(), &fix(5.0, -300), now(), SampleMode::Automatic)
            .is_ok());
    }

    #[test]
    fn test_non_finite_reading_rejected() {
        let fuser = SampleFuser::default();
        let raw = RawField::new(f64::NAN, 0.0, 0.0);
        let result = fuser.fuse(raw, &fix(5.0, 0), now(), SampleMode::Automatic);
        assert_eq!(result, Err(FusionError::NoReading));
    }

    #[test]
    fn test_with_smoothing_ignores_out_of_range() {
        assert_eq!(FusionConfig::default().with_smoothing(0.3).smoothing_alpha, Some(0.3));
        assert_eq!(FusionConfig::default().with_smoothing(0.0).smoothing_alpha, None);
        assert_eq!(FusionConfig::default().with_smoothing(1.5).smoothing_alpha, None);
    }
}
