//! Live measurement pipeline.
//!
//! [`MeasurementPipeline`] ties the push-driven [`MeasurementSession`] to the
//! classifier and the mission's [`SurveyStore`]:
//!
//! ```text
//! on_reading / on_position_fix / on_nmea / on_ubx
//!         │
//!         ▼
//! MeasurementSession ──► SampleFuser ──► ThresholdClassifier ──► SurveyStore
//!                                              │
//!                                              └──► RestrictedZoneIndex
//! ```
//!
//! Manual mode calls [`MeasurementPipeline::capture`] once per trigger.
//! Automatic mode runs [`MeasurementPipeline::run_automatic`], which captures
//! on every tick of the mission interval until cancelled.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::ThresholdClassifier;
use crate::fusion::{FusionConfig, FusionError, MeasurementSession, SampleFuser};
use crate::measurement::{MeasurementPoint, PositionFix, RawField, SampleMode};
use crate::mission::Mission;
use crate::nmea::{NmeaError, NmeaReceiver};
use crate::store::{StoreError, SurveyStore};
use crate::ubx::{NavPvt, UbxDecoder};
use crate::zones::RestrictedZoneIndex;

/// Why a capture produced no point.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters from an automatic sampling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplingStats {
    pub captured: u64,
    pub rejected: u64,
}

/// Fuses, classifies and stores samples for one mission.
///
/// Shared between the sensor callbacks and the sampling loop, typically as
/// an `Arc<MeasurementPipeline>`. A mission update requires building a new
/// pipeline; the mission is captured at construction.
pub struct MeasurementPipeline {
    mission: Mission,
    store: Arc<SurveyStore>,
    zones: Arc<RestrictedZoneIndex>,
    classifier: ThresholdClassifier,
    session: Mutex<MeasurementSession>,
    nmea: Mutex<NmeaReceiver>,
    ubx: Mutex<UbxDecoder>,
}

impl MeasurementPipeline {
    pub fn new(
        mission: Mission,
        store: Arc<SurveyStore>,
        zones: Arc<RestrictedZoneIndex>,
        fusion: FusionConfig,
    ) -> Self {
        Self {
            mission,
            store,
            zones,
            classifier: ThresholdClassifier::new(),
            session: Mutex::new(MeasurementSession::new(SampleFuser::new(fusion))),
            nmea: Mutex::new(NmeaReceiver::new()),
            ubx: Mutex::new(UbxDecoder::new()),
        }
    }

    pub fn mission(&self) -> &Mission {
        &self.mission
    }

    pub fn store(&self) -> &Arc<SurveyStore> {
        &self.store
    }

    pub fn on_reading(&self, raw: RawField) {
        self.session.lock().on_reading(raw);
    }

    pub fn on_position_fix(&self, fix: PositionFix) {
        self.session.lock().on_position_fix(fix);
    }

    /// Feeds an NMEA sentence from an external GNSS receiver.
    ///
    /// Returns the position fix it produced, if any. GSA sentences and RMC
    /// before any HDOP is known update receiver state only.
    pub fn on_nmea(
        &self,
        sentence: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Option<PositionFix>, NmeaError> {
        let fix = self.nmea.lock().feed(sentence, received_at)?;
        if let Some(fix) = fix {
            self.on_position_fix(fix);
        }
        Ok(fix)
    }

    /// Feeds raw bytes from a UBX binary stream.
    ///
    /// Every complete NAV-PVT frame with a valid fix updates the position;
    /// other messages are ignored. Returns the number of fixes applied.
    pub fn on_ubx(&self, bytes: &[u8], received_at: DateTime<Utc>) -> usize {
        let frames = self.ubx.lock().push(bytes);
        let mut applied = 0;
        for frame in frames.iter().filter(|frame| frame.is_nav_pvt()) {
            match NavPvt::parse(frame).and_then(|pvt| pvt.to_position_fix(received_at)) {
                Ok(fix) => {
                    self.on_position_fix(fix);
                    applied += 1;
                }
                Err(e) => debug!(error = %e, "NAV-PVT skipped"),
            }
        }
        applied
    }

    /// Takes one sample, classifies it and appends it to the store.
    ///
    /// Rejected samples are logged at `warn` and returned as errors; the
    /// pipeline stays usable.
    pub fn capture(
        &self,
        now: DateTime<Utc>,
        mode: SampleMode,
    ) -> Result<MeasurementPoint, PipelineError> {
        let sample = self.session.lock().take_sample(now, mode);
        let sample = match sample {
            Ok(sample) => sample,
            Err(e) => {
                warn!(mission = %self.mission.id(), %mode, error = %e, "Sample rejected");
                return Err(e.into());
            }
        };

        let point = self
            .classifier
            .classify_with_zones(sample, &self.mission, &self.zones);
        self.store.append(point.clone())?;

        debug!(
            point = %point.id,
            noise = point.noise,
            severity = %point.severity,
            in_zone = point.in_restricted_zone,
            "Captured measurement"
        );
        Ok(point)
    }

    /// Captures on every mission interval until `cancel` fires or the
    /// mission's store is closed.
    pub async fn run_automatic(&self, cancel: CancellationToken) -> SamplingStats {
        let period = self.mission.measurement_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = SamplingStats::default();
        info!(mission = %self.mission.id(), ?period, "Automatic sampling started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    match self.capture(Utc::now(), SampleMode::Automatic) {
                        Ok(_) => stats.captured += 1,
                        Err(PipelineError::Store(StoreError::Closed(_))) => {
                            warn!(mission = %self.mission.id(), "Mission deleted, stopping sampling");
                            break;
                        }
                        Err(_) => stats.rejected += 1,
                    }
                }
            }
        }

        info!(
            mission = %self.mission.id(),
            captured = stats.captured,
            rejected = stats.rejected,
            "Automatic sampling stopped"
        );
        stats
    }
}
