use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::{StoreState, SEGMENT_LEN};
use crate::measurement::{MeasurementPoint, PointId, Severity};
use crate::mission::MissionId;

/// Immutable view of a store at the moment it was taken.
///
/// Cheap to take and to clone. Iteration can be restarted any number of
/// times and always yields the same points in append order.
#[derive(Debug, Clone)]
pub struct SurveySnapshot {
    mission_id: MissionId,
    sealed: Arc<Vec<Arc<[MeasurementPoint]>>>,
    tail: Arc<Vec<MeasurementPoint>>,
    removed: Arc<HashSet<PointId>>,
}

impl SurveySnapshot {
    pub(crate) fn new(mission_id: MissionId, state: &StoreState) -> Self {
        Self {
            mission_id,
            sealed: Arc::clone(&state.sealed),
            tail: Arc::clone(&state.tail),
            removed: Arc::clone(&state.removed),
        }
    }

    pub fn mission_id(&self) -> MissionId {
        self.mission_id
    }

    /// Live points in append order.
    pub fn iter(&self) -> impl Iterator<Item = &MeasurementPoint> + '_ {
        self.sealed
            .iter()
            .flat_map(|segment| segment.iter())
            .chain(self.tail.iter())
            .filter(move |point| !self.removed.contains(&point.id))
    }

    pub fn get(&self, id: PointId) -> Option<&MeasurementPoint> {
        if self.removed.contains(&id) {
            return None;
        }
        self.iter().find(|point| point.id == id)
    }

    pub fn len(&self) -> usize {
        self.sealed.len() * SEGMENT_LEN + self.tail.len() - self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> SurveyStatistics {
        let mut stats = SurveyStatistics::default();
        let mut total = 0.0;

        for point in self.iter() {
            stats.count += 1;
            total += point.noise;
            stats.min_noise = Some(stats.min_noise.map_or(point.noise, |m| m.min(point.noise)));
            stats.max_noise = Some(stats.max_noise.map_or(point.noise, |m| m.max(point.noise)));
            match point.severity {
                Severity::Safe => stats.safe += 1,
                Severity::Caution => stats.caution += 1,
                Severity::Danger => stats.danger += 1,
            }
            if point.in_restricted_zone {
                stats.in_restricted_zone += 1;
            }
        }

        if stats.count > 0 {
            stats.mean_noise = Some(total / stats.count as f64);
        }
        stats
    }
}

/// Aggregate noise figures for a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SurveyStatistics {
    pub count: usize,
    pub min_noise: Option<f64>,
    pub max_noise: Option<f64>,
    pub mean_noise: Option<f64>,
    pub safe: usize,
    pub caution: usize,
    pub danger: usize,
    pub in_restricted_zone: usize,
}
