//! NMEA 0183 parsing for external GNSS receivers.
//!
//! RTK receivers attached over serial stream NMEA sentences. Three types are
//! understood:
//!
//! - **GGA**: position, fix quality and HDOP; a complete [`PositionFix`] on
//!   its own ([`parse_gga`])
//! - **RMC**: position, validity, date and time, speed and course
//! - **GSA**: 2D/3D fix type and dilution of precision
//!
//! [`parse_sentence`] decodes any of them. [`NmeaReceiver`] combines the
//! stream into position fixes, so a receiver configured for RMC and GSA
//! output is as usable as one sending GGA. Other sentence types are
//! rejected with [`NmeaError::Unsupported`] so callers can skip them.

mod receiver;

pub use receiver::NmeaReceiver;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use crate::measurement::{FixQuality, PositionFix};

/// Metres of horizontal accuracy per unit of HDOP.
pub const HDOP_TO_METERS: f64 = 3.0;

/// Metres per second in one knot.
const KNOT_TO_MPS: f64 = 0.514_444;

/// Errors from sentence parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NmeaError {
    #[error("sentence does not start with '$'")]
    NotNmea,

    #[error("unsupported sentence type {0}")]
    Unsupported(String),

    #[error("checksum mismatch: sentence says {expected:02X}, computed {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("malformed checksum {0:?}")]
    InvalidChecksum(String),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("receiver reports no fix")]
    NoFix,
}

/// A decoded sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    Gga(PositionFix),
    Rmc(Rmc),
    Gsa(Gsa),
}

/// Recommended minimum data (RMC) with a valid status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rmc {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    /// Ground speed in metres per second.
    pub speed_mps: Option<f64>,
    /// Course over ground in degrees from true north.
    pub course_deg: Option<f64>,
}

/// Fix type and dilution of precision (GSA).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gsa {
    /// `NoFix`, `Fix2d` or `Fix3d`; GSA cannot report differential or RTK.
    pub fix: FixQuality,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
}

/// Decodes a GGA, RMC or GSA sentence.
///
/// # Errors
///
/// * `NoFix` - GGA quality 0 (or another value without a position), or RMC status `V`
/// * `ChecksumMismatch` - The `*hh` suffix does not match the payload
/// * `Unsupported` - Any other sentence type
pub fn parse_sentence(sentence: &str, received_at: DateTime<Utc>) -> Result<Sentence, NmeaError> {
    let fields = split_fields(sentence)?;
    let talker = fields[0];
    if talker.ends_with("GGA") {
        gga(&fields, received_at).map(Sentence::Gga)
    } else if talker.ends_with("RMC") {
        rmc(&fields, received_at).map(Sentence::Rmc)
    } else if talker.ends_with("GSA") {
        gsa(&fields).map(Sentence::Gsa)
    } else {
        Err(NmeaError::Unsupported(talker.to_string()))
    }
}

/// Parses a GGA sentence into a position fix.
///
/// The checksum is verified when present. The UTC time of day in the
/// sentence is placed on the calendar day closest to `received_at`; a
/// sentence without a time uses `received_at` itself.
///
/// # Errors
///
/// * `NoFix` - Quality field is 0 or a value with no usable position
/// * `ChecksumMismatch` - The `*hh` suffix does not match the payload
/// * `Unsupported` - The sentence is valid NMEA but not GGA
pub fn parse_gga(sentence: &str, received_at: DateTime<Utc>) -> Result<PositionFix, NmeaError> {
    let fields = split_fields(sentence)?;
    if !fields[0].ends_with("GGA") {
        return Err(NmeaError::Unsupported(fields[0].to_string()));
    }
    gga(&fields, received_at)
}

/// XOR of every byte between `$` and `*`.
pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, b| acc ^ b)
}

/// Checks framing and checksum, then splits the payload on commas.
fn split_fields(sentence: &str) -> Result<Vec<&str>, NmeaError> {
    let sentence = sentence.trim();
    let body = sentence.strip_prefix('$').ok_or(NmeaError::NotNmea)?;

    let payload = match body.split_once('*') {
        Some((payload, checksum)) => {
            verify_checksum(payload, checksum)?;
            payload
        }
        None => body,
    };
    Ok(payload.split(',').collect())
}

fn required<'a>(fields: &[&'a str], index: usize, name: &'static str) -> Result<&'a str, NmeaError> {
    optional(fields, index).ok_or(NmeaError::MissingField(name))
}

fn optional<'a>(fields: &[&'a str], index: usize) -> Option<&'a str> {
    fields.get(index).copied().filter(|value| !value.is_empty())
}

fn optional_number(
    fields: &[&str],
    index: usize,
    name: &'static str,
) -> Result<Option<f64>, NmeaError> {
    optional(fields, index)
        .map(|value| parse_number(value, name))
        .transpose()
}

fn gga(fields: &[&str], received_at: DateTime<Utc>) -> Result<PositionFix, NmeaError> {
    let quality = match required(fields, 6, "quality")? {
        "1" => FixQuality::Fix3d,
        "2" => FixQuality::Dgps,
        "4" => FixQuality::RtkFixed,
        "5" => FixQuality::RtkFloat,
        "0" | "3" | "6" | "7" | "8" => return Err(NmeaError::NoFix),
        other => {
            return Err(NmeaError::InvalidField {
                field: "quality",
                value: other.to_string(),
            })
        }
    };

    let latitude = parse_coordinate(
        required(fields, 2, "latitude")?,
        required(fields, 3, "latitude hemisphere")?,
        2,
    )?;
    let longitude = parse_coordinate(
        required(fields, 4, "longitude")?,
        required(fields, 5, "longitude hemisphere")?,
        3,
    )?;
    let hdop = parse_number(required(fields, 8, "hdop")?, "hdop")?;

    let timestamp = match optional(fields, 1) {
        Some(time) => resolve_timestamp(time, received_at)?,
        None => received_at,
    };

    Ok(PositionFix {
        latitude,
        longitude,
        accuracy_m: hdop * HDOP_TO_METERS,
        timestamp,
        quality,
    })
}

fn rmc(fields: &[&str], received_at: DateTime<Utc>) -> Result<Rmc, NmeaError> {
    match required(fields, 2, "status")? {
        "A" => {}
        "V" => return Err(NmeaError::NoFix),
        other => {
            return Err(NmeaError::InvalidField {
                field: "status",
                value: other.to_string(),
            })
        }
    }

    let latitude = parse_coordinate(
        required(fields, 3, "latitude")?,
        required(fields, 4, "latitude hemisphere")?,
        2,
    )?;
    let longitude = parse_coordinate(
        required(fields, 5, "longitude")?,
        required(fields, 6, "longitude hemisphere")?,
        3,
    )?;

    let timestamp = match (optional(fields, 1), optional(fields, 9)) {
        (Some(time), Some(date)) => {
            let time_of_day = parse_time(time)?;
            let date = NaiveDate::parse_from_str(date, "%d%m%y").map_err(|_| {
                NmeaError::InvalidField {
                    field: "date",
                    value: date.to_string(),
                }
            })?;
            date.and_time(time_of_day).and_utc()
        }
        (Some(time), None) => resolve_timestamp(time, received_at)?,
        (None, _) => received_at,
    };

    Ok(Rmc {
        latitude,
        longitude,
        timestamp,
        speed_mps: optional_number(fields, 7, "speed")?.map(|knots| knots * KNOT_TO_MPS),
        course_deg: optional_number(fields, 8, "course")?,
    })
}

fn gsa(fields: &[&str]) -> Result<Gsa, NmeaError> {
    let fix = match required(fields, 2, "fix type")? {
        "1" => FixQuality::NoFix,
        "2" => FixQuality::Fix2d,
        "3" => FixQuality::Fix3d,
        other => {
            return Err(NmeaError::InvalidField {
                field: "fix type",
                value: other.to_string(),
            })
        }
    };

    Ok(Gsa {
        fix,
        pdop: optional_number(fields, 15, "pdop")?,
        hdop: optional_number(fields, 16, "hdop")?,
        vdop: optional_number(fields, 17, "vdop")?,
    })
}

fn verify_checksum(payload: &str, given: &str) -> Result<(), NmeaError> {
    let expected = u8::from_str_radix(given.trim(), 16)
        .map_err(|_| NmeaError::InvalidChecksum(given.to_string()))?;
    let actual = checksum(payload);
    if expected != actual {
        return Err(NmeaError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

fn parse_number(value: &str, field: &'static str) -> Result<f64, NmeaError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| NmeaError::InvalidField {
            field,
            value: value.to_string(),
        })
}

/// Converts `ddmm.mmmm` / `dddmm.mmmm` with a hemisphere letter to degrees.
fn parse_coordinate(value: &str, hemisphere: &str, degree_digits: usize) -> Result<f64, NmeaError> {
    let (field, limit, negative) = match (degree_digits, hemisphere) {
        (2, "N") => ("latitude", 90.0, false),
        (2, "S") => ("latitude", 90.0, true),
        (_, "E") => ("longitude", 180.0, false),
        (_, "W") => ("longitude", 180.0, true),
        _ => {
            return Err(NmeaError::InvalidField {
                field: "hemisphere",
                value: hemisphere.to_string(),
            })
        }
    };
    let invalid = || NmeaError::InvalidField {
        field,
        value: value.to_string(),
    };

    if value.len() < degree_digits || !value.is_char_boundary(degree_digits) {
        return Err(invalid());
    }
    let (degrees, minutes) = value.split_at(degree_digits);
    let degrees: f64 = degrees.parse().map_err(|_| invalid())?;
    let minutes: f64 = minutes.parse().map_err(|_| invalid())?;
    if !(0.0..60.0).contains(&minutes) {
        return Err(invalid());
    }

    let decimal = degrees + minutes / 60.0;
    if decimal > limit {
        return Err(invalid());
    }
    Ok(if negative { -decimal } else { decimal })
}

fn parse_time(time: &str) -> Result<NaiveTime, NmeaError> {
    NaiveTime::parse_from_str(time, "%H%M%S%.f").map_err(|_| NmeaError::InvalidField {
        field: "time",
        value: time.to_string(),
    })
}

/// Places an `hhmmss.ss` time on the day nearest to `received_at`.
fn resolve_timestamp(time: &str, received_at: DateTime<Utc>) -> Result<DateTime<Utc>, NmeaError> {
    let time_of_day = parse_time(time)?;

    let candidate = received_at.date_naive().and_time(time_of_day).and_utc();
    let half_day = Duration::hours(12);
    Ok(if candidate - received_at > half_day {
        candidate - Duration::days(1)
    } else if received_at - candidate > half_day {
        candidate + Duration::days(1)
    } else {
        candidate
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn received(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, h, m, s).unwrap()
    }

    fn sentence(payload: &str) -> String {
        format!("${}*{:02X}", payload, checksum(payload))
    }

    #[test]
    fn test_parse_standard_gga() {
        let fix = parse_gga(
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
            received(12, 35, 20),
        )
        .unwrap();

        assert!((fix.latitude - 48.1173).abs() < 1e-4);
        assert!((fix.longitude - 11.516_666).abs() < 1e-4);
        assert!((fix.accuracy_m - 2.7).abs() < 1e-9);
        assert_eq!(fix.quality, FixQuality::Fix3d);
        assert_eq!(fix.timestamp, received(12, 35, 19));
    }

    #[test]
    fn test_parse_rtk_fixed() {
        let fix = parse_gga(
            "$GNGGA,001043.00,3540.8904,N,13945.9876,E,4,12,0.6,40.1,M,39.5,M,1.0,0000*6C",
            received(0, 10, 50),
        )
        .unwrap();

        assert!((fix.latitude - 35.681_506_7).abs() < 1e-6);
        assert!((fix.longitude - 139.766_46).abs() < 1e-6);
        assert_eq!(fix.quality, FixQuality::RtkFixed);
        assert!(fix.quality.is_rtk());
    }

    #[test]
    fn test_southern_western_hemisphere_and_day_rollover() {
        let fix = parse_gga(
            "$GPGGA,235959.00,3540.8904,S,13945.9876,W,5,12,1.2,40.1,M,39.5,M,,*51",
            received(0, 0, 2),
        )
        .unwrap();

        assert!(fix.latitude < 0.0);
        assert!(fix.longitude < 0.0);
        assert_eq!(fix.quality, FixQuality::RtkFloat);
        assert_eq!(
            fix.timestamp,
            Utc.with_ymd_and_hms(2026, 5, 1, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_no_fix() {
        let result = parse_gga("$GPGGA,120000.00,,,,,0,00,99.9,,M,,M,,*5C", received(12, 0, 0));
        assert_eq!(result, Err(NmeaError::NoFix));
    }

    #[test]
    fn test_checksum_mismatch() {
        let result = parse_gga(
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48",
            received(12, 35, 20),
        );
        assert_eq!(
            result,
            Err(NmeaError::ChecksumMismatch {
                expected: 0x48,
                actual: 0x47
            })
        );
    }

    #[test]
    fn test_missing_checksum_accepted() {
        let result = parse_gga(
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            received(12, 35, 20),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_other_sentences_unsupported() {
        let result = parse_gga(
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W",
            received(12, 0, 0),
        );
        assert_eq!(result, Err(NmeaError::Unsupported("GPRMC".to_string())));
        assert_eq!(parse_gga("garbage", received(0, 0, 0)), Err(NmeaError::NotNmea));
    }

    #[test]
    fn test_parse_rmc_with_date() {
        let parsed = parse_sentence(
            &sentence("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W"),
            received(0, 0, 0),
        )
        .unwrap();

        let Sentence::Rmc(rmc) = parsed else {
            panic!("expected RMC, got {:?}", parsed);
        };
        assert!((rmc.latitude - 48.1173).abs() < 1e-4);
        assert_eq!(rmc.timestamp, Utc.with_ymd_and_hms(1994, 3, 23, 12, 35, 19).unwrap());
        assert!((rmc.speed_mps.unwrap() - 11.523_546).abs() < 1e-4);
        assert_eq!(rmc.course_deg, Some(84.4));
    }

    #[test]
    fn test_rmc_void_status_is_no_fix() {
        let result = parse_sentence(
            &sentence("GNRMC,123519,V,,,,,,,230394,,,N"),
            received(12, 0, 0),
        );
        assert_eq!(result, Err(NmeaError::NoFix));
    }

    #[test]
    fn test_parse_gsa() {
        let parsed = parse_sentence(
            &sentence("GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1"),
            received(12, 0, 0),
        )
        .unwrap();
        assert_eq!(
            parsed,
            Sentence::Gsa(Gsa {
                fix: FixQuality::Fix3d,
                pdop: Some(2.5),
                hdop: Some(1.3),
                vdop: Some(2.1),
            })
        );

        let no_fix = parse_sentence(&sentence("GPGSA,A,1,,,,,,,,,,,,,,,"), received(12, 0, 0));
        assert!(matches!(
            no_fix,
            Ok(Sentence::Gsa(Gsa {
                fix: FixQuality::NoFix,
                hdop: None,
                ..
            }))
        ));
    }

    #[test]
    fn test_parse_sentence_rejects_other_types() {
        let result = parse_sentence(
            &sentence("GPVTG,054.7,T,034.4,M,005.5,N,010.2,K"),
            received(0, 0, 0),
        );
        assert_eq!(result, Err(NmeaError::Unsupported("GPVTG".to_string())));
    }

    #[test]
    fn test_invalid_coordinate() {
        let result = parse_gga(
            "$GPGGA,123519,48x7.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            received(12, 35, 20),
        );
        assert!(matches!(
            result,
            Err(NmeaError::InvalidField { field: "latitude", .. })
        ));
    }
}
