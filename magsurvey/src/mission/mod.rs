//! Survey missions: reference field, thresholds and the registry that owns
//! each mission's measurement store.

mod registry;
mod types;

pub use registry::MissionRegistry;
pub use types::{
    Mission, MissionBuilder, MissionId, MissionUpdate, Thresholds, DEFAULT_DANGER_THRESHOLD_UT,
    DEFAULT_MEASUREMENT_INTERVAL, DEFAULT_REFERENCE_UT, DEFAULT_SAFE_THRESHOLD_UT,
    MIN_MEASUREMENT_INTERVAL,
};

use std::time::Duration;

use thiserror::Error;

/// Errors from mission validation and registry operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MissionError {
    #[error("thresholds must satisfy 0 < safe < danger (safe={safe}, danger={danger})")]
    InvalidThresholds { safe: f64, danger: f64 },

    #[error("reference field must be a positive number of μT, got {0}")]
    InvalidReference(f64),

    #[error("measurement interval {interval:?} is shorter than the minimum {min:?}")]
    IntervalTooShort { interval: Duration, min: Duration },

    #[error("mission {0} is required")]
    MissingField(&'static str),

    #[error("mission {0} already exists")]
    AlreadyExists(MissionId),

    #[error("mission {0} not found")]
    NotFound(MissionId),
}
