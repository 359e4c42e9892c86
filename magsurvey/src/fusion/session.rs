use chrono::{DateTime, Utc};
use tracing::trace;

use super::{FusionError, ReadingWindow, SampleFuser};
use crate::measurement::{MeasurementSample, PositionFix, RawField, SampleMode};

/// Push interface for sensor and location callbacks.
///
/// Not thread-safe on its own; share it behind a mutex when callbacks arrive
/// on different threads.
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    fuser: SampleFuser,
    window: ReadingWindow,
    latest_fix: Option<PositionFix>,
}

impl MeasurementSession {
    pub fn new(fuser: SampleFuser) -> Self {
        let window = ReadingWindow::new(fuser.config().smoothing_alpha);
        Self {
            fuser,
            window,
            latest_fix: None,
        }
    }

    /// Records a magnetometer reading in the current window.
    pub fn on_reading(&mut self, raw: RawField) {
        self.window.push(raw);
    }

    /// Replaces the latest position fix.
    pub fn on_position_fix(&mut self, fix: PositionFix) {
        trace!(
            lat = fix.latitude,
            lon = fix.longitude,
            accuracy_m = fix.accuracy_m,
            "position fix"
        );
        self.latest_fix = Some(fix);
    }

    pub fn latest_fix(&self) -> Option<&PositionFix> {
        self.latest_fix.as_ref()
    }

    /// Fuses the window's reading with the latest fix.
    ///
    /// Once both inputs are present the window is closed whether or not the
    /// fix passes validation, so the next sample only sees fresh readings.
    pub fn take_sample(
        &mut self,
        now: DateTime<Utc>,
        mode: SampleMode,
    ) -> Result<MeasurementSample, FusionError> {
        let fix = self.latest_fix.ok_or(FusionError::NoPositionFix)?;
        let raw = self.window.current().ok_or(FusionError::NoReading)?;

        let readings = self.window.len();
        self.window.reset();
        trace!(readings, %mode, "closing reading window");

        self.fuser.fuse(raw, &fix, now, mode)
    }
}
