//! Stateful combination of NMEA sentences into position fixes.

use chrono::{DateTime, Utc};
use tracing::trace;

use super::{parse_sentence, NmeaError, Sentence, HDOP_TO_METERS};
use crate::measurement::{FixQuality, PositionFix};

/// Tracks receiver state across sentences.
///
/// GGA is self-contained and always yields a fix. RMC carries position and
/// time but no accuracy, so it yields a fix only once GGA or GSA has reported
/// an HDOP. GSA updates the fix type and HDOP without yielding a fix; a 2D
/// or 3D report never downgrades an RTK quality learned from GGA.
#[derive(Debug, Clone, Default)]
pub struct NmeaReceiver {
    quality: Option<FixQuality>,
    accuracy_m: Option<f64>,
}

impl NmeaReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sentence.
    ///
    /// Returns the fix it produces, if any. Errors are those of
    /// [`parse_sentence`]; a `NoFix` error also clears the remembered
    /// quality.
    pub fn feed(
        &mut self,
        sentence: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Option<PositionFix>, NmeaError> {
        let parsed = match parse_sentence(sentence, received_at) {
            Ok(parsed) => parsed,
            Err(NmeaError::NoFix) => {
                self.quality = Some(FixQuality::NoFix);
                return Err(NmeaError::NoFix);
            }
            Err(e) => return Err(e),
        };

        match parsed {
            Sentence::Gga(fix) => {
                self.quality = Some(fix.quality);
                self.accuracy_m = Some(fix.accuracy_m);
                Ok(Some(fix))
            }
            Sentence::Gsa(gsa) => {
                let keep_rtk = self.quality.is_some_and(|q| q.is_rtk()) && gsa.fix.is_valid();
                if !keep_rtk {
                    self.quality = Some(gsa.fix);
                }
                if let Some(hdop) = gsa.hdop {
                    self.accuracy_m = Some(hdop * HDOP_TO_METERS);
                }
                Ok(None)
            }
            Sentence::Rmc(rmc) => {
                let Some(accuracy_m) = self.accuracy_m else {
                    trace!("RMC before any HDOP, no fix emitted");
                    return Ok(None);
                };
                // RMC status A is authoritative for validity
                let quality = self
                    .quality
                    .filter(FixQuality::is_valid)
                    .unwrap_or(FixQuality::Fix3d);
                Ok(Some(PositionFix {
                    latitude: rmc.latitude,
                    longitude: rmc.longitude,
                    accuracy_m,
                    timestamp: rmc.timestamp,
                    quality,
                }))
            }
        }
    }

    /// The last fix quality reported, if any.
    pub fn quality(&self) -> Option<FixQuality> {
        self.quality
    }
}
