//! Mission model and threshold validation.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MissionError;

/// Default reference field strength in μT (mean total field over Japan).
pub const DEFAULT_REFERENCE_UT: f64 = 46.0;

/// Default safe threshold in μT of noise.
pub const DEFAULT_SAFE_THRESHOLD_UT: f64 = 10.0;

/// Default danger threshold in μT of noise.
pub const DEFAULT_DANGER_THRESHOLD_UT: f64 = 50.0;

/// Default automatic sampling period.
pub const DEFAULT_MEASUREMENT_INTERVAL: Duration = Duration::from_millis(1000);

/// Shortest sampling period the magnetometer can sustain.
pub const MIN_MEASUREMENT_INTERVAL: Duration = Duration::from_millis(100);

/// Mission identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionId(pub Uuid);

impl MissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Noise thresholds separating the severity tiers.
///
/// Always satisfies `0 < safe < danger`; the only way to build one is
/// through [`Thresholds::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct Thresholds {
    safe: f64,
    danger: f64,
}

#[derive(Deserialize)]
struct RawThresholds {
    safe: f64,
    danger: f64,
}

impl TryFrom<RawThresholds> for Thresholds {
    type Error = MissionError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        Thresholds::new(raw.safe, raw.danger)
    }
}

impl Thresholds {
    pub fn new(safe: f64, danger: f64) -> Result<Self, MissionError> {
        // NaN fails every comparison, so it is rejected here too
        if !(safe > 0.0 && safe < danger && danger.is_finite()) {
            return Err(MissionError::InvalidThresholds { safe, danger });
        }
        Ok(Self { safe, danger })
    }

    pub fn safe(&self) -> f64 {
        self.safe
    }

    pub fn danger(&self) -> f64 {
        self.danger
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            safe: DEFAULT_SAFE_THRESHOLD_UT,
            danger: DEFAULT_DANGER_THRESHOLD_UT,
        }
    }
}

/// A site survey.
///
/// Fields are private so thresholds and interval can only change through
/// [`Mission::apply`], which re-validates them. Deserialization runs the
/// same checks as [`MissionBuilder::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMission")]
pub struct Mission {
    id: MissionId,
    name: String,
    operator: String,
    memo: String,
    reference_ut: f64,
    thresholds: Thresholds,
    #[serde(with = "interval_millis")]
    measurement_interval: Duration,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed: bool,
}

#[derive(Deserialize)]
struct RawMission {
    id: MissionId,
    name: String,
    operator: String,
    memo: String,
    reference_ut: f64,
    thresholds: Thresholds,
    #[serde(with = "interval_millis")]
    measurement_interval: Duration,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed: bool,
}

impl TryFrom<RawMission> for Mission {
    type Error = MissionError;

    fn try_from(raw: RawMission) -> Result<Self, Self::Error> {
        validate_names(&raw.name, &raw.operator)?;
        validate_reference(raw.reference_ut)?;
        validate_interval(raw.measurement_interval)?;
        Ok(Mission {
            id: raw.id,
            name: raw.name,
            operator: raw.operator,
            memo: raw.memo,
            reference_ut: raw.reference_ut,
            thresholds: raw.thresholds,
            measurement_interval: raw.measurement_interval,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            completed: raw.completed,
        })
    }
}

impl Mission {
    /// Starts building a mission with the default reference and thresholds.
    pub fn builder(name: impl Into<String>, operator: impl Into<String>) -> MissionBuilder {
        MissionBuilder {
            name: name.into(),
            operator: operator.into(),
            memo: String::new(),
            reference_ut: DEFAULT_REFERENCE_UT,
            safe: DEFAULT_SAFE_THRESHOLD_UT,
            danger: DEFAULT_DANGER_THRESHOLD_UT,
            measurement_interval: DEFAULT_MEASUREMENT_INTERVAL,
            created_at: None,
        }
    }

    pub fn id(&self) -> MissionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    /// Reference total field strength in μT.
    pub fn reference_ut(&self) -> f64 {
        self.reference_ut
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn measurement_interval(&self) -> Duration {
        self.measurement_interval
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Applies an update, leaving the mission untouched if it is invalid.
    pub fn apply(&mut self, update: MissionUpdate, now: DateTime<Utc>) -> Result<(), MissionError> {
        let current = self.thresholds;
        let thresholds = Thresholds::new(
            update.safe_threshold.unwrap_or(current.safe()),
            update.danger_threshold.unwrap_or(current.danger()),
        )?;
        let reference_ut = update.reference_ut.unwrap_or(self.reference_ut);
        validate_reference(reference_ut)?;
        let interval = update.measurement_interval.unwrap_or(self.measurement_interval);
        validate_interval(interval)?;
        validate_names(
            update.name.as_deref().unwrap_or(&self.name),
            update.operator.as_deref().unwrap_or(&self.operator),
        )?;

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(operator) = update.operator {
            self.operator = operator;
        }
        if let Some(memo) = update.memo {
            self.memo = memo;
        }
        if let Some(completed) = update.completed {
            self.completed = completed;
        }
        self.reference_ut = reference_ut;
        self.thresholds = thresholds;
        self.measurement_interval = interval;
        self.updated_at = now;
        Ok(())
    }
}

/// Builder for [`Mission`].
#[derive(Debug, Clone)]
pub struct MissionBuilder {
    name: String,
    operator: String,
    memo: String,
    reference_ut: f64,
    safe: f64,
    danger: f64,
    measurement_interval: Duration,
    created_at: Option<DateTime<Utc>>,
}

impl MissionBuilder {
    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn reference_ut(mut self, reference_ut: f64) -> Self {
        self.reference_ut = reference_ut;
        self
    }

    pub fn thresholds(mut self, safe: f64, danger: f64) -> Self {
        self.safe = safe;
        self.danger = danger;
        self
    }

    pub fn measurement_interval(mut self, interval: Duration) -> Self {
        self.measurement_interval = interval;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn build(self) -> Result<Mission, MissionError> {
        validate_names(&self.name, &self.operator)?;
        validate_reference(self.reference_ut)?;
        validate_interval(self.measurement_interval)?;
        let thresholds = Thresholds::new(self.safe, self.danger)?;
        let created_at = self.created_at.unwrap_or_else(Utc::now);

        Ok(Mission {
            id: MissionId::new(),
            name: self.name,
            operator: self.operator,
            memo: self.memo,
            reference_ut: self.reference_ut,
            thresholds,
            measurement_interval: self.measurement_interval,
            created_at,
            updated_at: created_at,
            completed: false,
        })
    }
}

/// Partial update of a mission; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct MissionUpdate {
    pub name: Option<String>,
    pub operator: Option<String>,
    pub memo: Option<String>,
    pub reference_ut: Option<f64>,
    pub safe_threshold: Option<f64>,
    pub danger_threshold: Option<f64>,
    pub measurement_interval: Option<Duration>,
    pub completed: Option<bool>,
}

fn validate_names(name: &str, operator: &str) -> Result<(), MissionError> {
    if name.trim().is_empty() {
        return Err(MissionError::MissingField("name"));
    }
    if operator.trim().is_empty() {
        return Err(MissionError::MissingField("operator"));
    }
    Ok(())
}

fn validate_reference(reference_ut: f64) -> Result<(), MissionError> {
    if reference_ut.is_finite() && reference_ut > 0.0 {
        Ok(())
    } else {
        Err(MissionError::InvalidReference(reference_ut))
    }
}

fn validate_interval(interval: Duration) -> Result<(), MissionError> {
    if interval < MIN_MEASUREMENT_INTERVAL {
        Err(MissionError::IntervalTooShort {
            interval,
            min: MIN_MEASUREMENT_INTERVAL,
        })
    } else {
        Ok(())
    }
}

mod interval_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(interval.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
