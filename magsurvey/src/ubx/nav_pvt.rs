//! NAV-PVT (class 0x01, id 0x07) navigation solution.

use bytes::Buf;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::{UbxError, UbxFrame, CLASS_NAV, ID_NAV_PVT};
use crate::measurement::{FixQuality, PositionFix};

/// Payload bytes up to and including the fields read here.
const MIN_PAYLOAD_LEN: usize = 84;

const VALID_DATE: u8 = 0x01;
const VALID_TIME: u8 = 0x02;
const VALID_DATE_TIME: u8 = VALID_DATE | VALID_TIME;
const GNSS_FIX_OK: u8 = 0x01;

/// Carrier-phase range solution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierSolution {
    None,
    Float,
    Fixed,
}

/// Decoded navigation solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavPvt {
    /// GPS time of week of the navigation epoch, in milliseconds.
    pub itow_ms: u32,
    /// UTC time, when the receiver flags both date and time valid.
    pub time: Option<DateTime<Utc>>,
    /// 0 none, 1 dead reckoning, 2 2D, 3 3D, 4 GNSS + dead reckoning, 5 time only.
    pub fix_type: u8,
    pub gnss_fix_ok: bool,
    pub carrier_solution: CarrierSolution,
    pub satellites: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub height_msl_m: f64,
    pub horizontal_accuracy_m: f64,
    pub vertical_accuracy_m: f64,
}

impl NavPvt {
    pub fn parse(frame: &UbxFrame) -> Result<Self, UbxError> {
        if !frame.is_nav_pvt() {
            return Err(UbxError::UnexpectedMessage {
                class: frame.class,
                id: frame.id,
            });
        }
        if frame.payload.len() < MIN_PAYLOAD_LEN {
            return Err(UbxError::Truncated {
                expected: MIN_PAYLOAD_LEN,
                actual: frame.payload.len(),
            });
        }

        let mut buf = &frame.payload[..];
        let itow_ms = buf.get_u32_le();
        let year = buf.get_u16_le();
        let month = buf.get_u8();
        let day = buf.get_u8();
        let hour = buf.get_u8();
        let minute = buf.get_u8();
        let second = buf.get_u8();
        let valid = buf.get_u8();
        let _time_accuracy_ns = buf.get_u32_le();
        let nano = buf.get_i32_le();
        let fix_type = buf.get_u8();
        let flags = buf.get_u8();
        let _flags2 = buf.get_u8();
        let satellites = buf.get_u8();
        let lon = buf.get_i32_le();
        let lat = buf.get_i32_le();
        let _height_ellipsoid_mm = buf.get_i32_le();
        let height_msl_mm = buf.get_i32_le();
        let h_acc_mm = buf.get_u32_le();
        let v_acc_mm = buf.get_u32_le();

        let latitude = lat as f64 * 1e-7;
        let longitude = lon as f64 * 1e-7;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(UbxError::OutOfRange {
                latitude,
                longitude,
            });
        }

        let time = (valid & VALID_DATE_TIME == VALID_DATE_TIME)
            .then(|| {
                NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())?
                    .and_hms_opt(hour.into(), minute.into(), second.into())
            })
            .flatten()
            .map(|naive| naive.and_utc() + Duration::nanoseconds(nano.into()));

        let carrier_solution = match flags >> 6 {
            1 => CarrierSolution::Float,
            2 => CarrierSolution::Fixed,
            _ => CarrierSolution::None,
        };

        Ok(Self {
            itow_ms,
            time,
            fix_type,
            gnss_fix_ok: flags & GNSS_FIX_OK != 0,
            carrier_solution,
            satellites,
            latitude,
            longitude,
            height_msl_m: height_msl_mm as f64 / 1000.0,
            horizontal_accuracy_m: h_acc_mm as f64 / 1000.0,
            vertical_accuracy_m: v_acc_mm as f64 / 1000.0,
        })
    }

    /// Fix quality; anything without `gnssFixOK` is `NoFix`.
    pub fn quality(&self) -> FixQuality {
        if !self.gnss_fix_ok {
            return FixQuality::NoFix;
        }
        match (self.fix_type, self.carrier_solution) {
            (2..=4, CarrierSolution::Fixed) => FixQuality::RtkFixed,
            (2..=4, CarrierSolution::Float) => FixQuality::RtkFloat,
            (3 | 4, CarrierSolution::None) => FixQuality::Fix3d,
            (2, CarrierSolution::None) => FixQuality::Fix2d,
            _ => FixQuality::NoFix,
        }
    }

    /// Converts to a position fix with accuracy taken from hAcc.
    ///
    /// Without a valid receiver time the fix is stamped `received_at`.
    pub fn to_position_fix(&self, received_at: DateTime<Utc>) -> Result<PositionFix, UbxError> {
        let quality = self.quality();
        if !quality.is_valid() {
            return Err(UbxError::NoFix);
        }
        Ok(PositionFix {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_m: self.horizontal_accuracy_m,
            timestamp: self.time.unwrap_or(received_at),
            quality,
        })
    }
}
