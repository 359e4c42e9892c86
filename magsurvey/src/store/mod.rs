//! Append-only measurement store with copy-on-write snapshots.
//!
//! A [`SurveyStore`] keeps one mission's points in fixed-size segments.
//! Full segments are sealed into `Arc<[MeasurementPoint]>` and never change
//! again; only the open tail segment is written. A snapshot clones the
//! `Arc`s of the sealed list, the tail and the removed set. The next write
//! to a shared part copies it first (`Arc::make_mut`), so a snapshot never
//! observes later appends or removals, and an append copies at most one
//! segment however many points the store holds.

mod snapshot;

pub use snapshot::{SurveySnapshot, SurveyStatistics};

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::debug;

use crate::measurement::{MeasurementPoint, PointId};
use crate::mission::MissionId;

/// Errors from store mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("point {0} already exists")]
    DuplicateId(PointId),

    #[error("point belongs to mission {actual}, store holds mission {expected}")]
    MissionMismatch {
        expected: MissionId,
        actual: MissionId,
    },

    #[error("point {0} not found")]
    NotFound(PointId),

    #[error("store for mission {0} was deleted")]
    Closed(MissionId),
}

/// Points per sealed segment.
pub(crate) const SEGMENT_LEN: usize = 256;

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    /// Full segments in append order, each exactly `SEGMENT_LEN` long.
    pub(crate) sealed: Arc<Vec<Arc<[MeasurementPoint]>>>,
    /// The segment being filled.
    pub(crate) tail: Arc<Vec<MeasurementPoint>>,
    /// Every id ever appended, removed ones included. Never shared.
    ids: HashSet<PointId>,
    pub(crate) removed: Arc<HashSet<PointId>>,
}

impl StoreState {
    fn push(&mut self, point: MeasurementPoint) {
        self.ids.insert(point.id);
        let tail = Arc::make_mut(&mut self.tail);
        tail.push(point);
        if tail.len() == SEGMENT_LEN {
            let full = std::mem::replace(tail, Vec::with_capacity(SEGMENT_LEN));
            Arc::make_mut(&mut self.sealed).push(full.into());
        }
    }

    fn appended(&self) -> usize {
        self.sealed.len() * SEGMENT_LEN + self.tail.len()
    }
}

/// Measurement points of one mission.
#[derive(Debug)]
pub struct SurveyStore {
    mission_id: MissionId,
    state: RwLock<StoreState>,
    /// Set once the owning mission is deleted.
    closed: Mutex<bool>,
}

impl SurveyStore {
    pub fn new(mission_id: MissionId) -> Self {
        Self {
            mission_id,
            state: RwLock::new(StoreState::default()),
            closed: Mutex::new(false),
        }
    }

    pub fn mission_id(&self) -> MissionId {
        self.mission_id
    }

    /// Appends a classified point.
    ///
    /// # Errors
    ///
    /// * `MissionMismatch` - The point belongs to another mission
    /// * `DuplicateId` - A point with the same id was appended before, even if since removed
    /// * `Closed` - The mission was deleted
    pub fn append(&self, point: MeasurementPoint) -> Result<(), StoreError> {
        if point.mission_id != self.mission_id {
            return Err(StoreError::MissionMismatch {
                expected: self.mission_id,
                actual: point.mission_id,
            });
        }

        let closed = self.closed.lock();
        if *closed {
            return Err(StoreError::Closed(self.mission_id));
        }

        let mut state = self.state.write();
        if state.ids.contains(&point.id) {
            return Err(StoreError::DuplicateId(point.id));
        }
        state.push(point);
        Ok(())
    }

    /// Soft-deletes a point. Existing snapshots still contain it.
    pub fn remove(&self, id: PointId) -> Result<(), StoreError> {
        let closed = self.closed.lock();
        if *closed {
            return Err(StoreError::Closed(self.mission_id));
        }

        let mut state = self.state.write();
        if !state.ids.contains(&id) || state.removed.contains(&id) {
            return Err(StoreError::NotFound(id));
        }

        Arc::make_mut(&mut state.removed).insert(id);
        debug!(mission = %self.mission_id, point = %id, "removed measurement point");
        Ok(())
    }

    /// Point-in-time view of the live points.
    pub fn snapshot(&self) -> SurveySnapshot {
        SurveySnapshot::new(self.mission_id, &self.state.read())
    }

    /// Number of live (not removed) points.
    pub fn len(&self) -> usize {
        let state = self.state.read();
        state.appended() - state.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects all further writes. Used when the mission is deleted.
    pub(crate) fn close(&self) {
        *self.closed.lock() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{MeasurementSample, RawField, SampleMode, Severity};
    use chrono::Utc;

    pub(crate) fn point(mission_id: MissionId, noise: f64, severity: Severity) -> MeasurementPoint {
        MeasurementPoint {
            id: PointId::new(),
            mission_id,
            sample: MeasurementSample {
                field: RawField::new(0.0, 0.0, 46.0 + noise),
                magnitude: 46.0 + noise,
                latitude: 35.0,
                longitude: 139.0,
                accuracy_m: 2.0,
                timestamp: Utc::now(),
                mode: SampleMode::Automatic,
            },
            noise,
            severity,
            in_restricted_zone: false,
        }
    }

    #[test]
    fn test_append_and_snapshot() {
        let mission = MissionId::new();
        let store = SurveyStore::new(mission);
        store.append(point(mission, 1.0, Severity::Safe)).unwrap();
        store.append(point(mission, 20.0, Severity::Caution)).unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_snapshot_isolated_from_later_appends() {
        let mission = MissionId::new();
        let store = SurveyStore::new(mission);
        store.append(point(mission, 1.0, Severity::Safe)).unwrap();

        let before = store.snapshot();
        store.append(point(mission, 2.0, Severity::Safe)).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before.iter().count(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_read_your_writes() {
        let mission = MissionId::new();
        let store = SurveyStore::new(mission);
        let p = point(mission, 5.0, Severity::Safe);
        let id = p.id;
        store.append(p).unwrap();
        assert!(store.snapshot().iter().any(|p| p.id == id));
    }

    #[test]
    fn test_rejects_mission_mismatch() {
        let store = SurveyStore::new(MissionId::new());
        let result = store.append(point(MissionId::new(), 1.0, Severity::Safe));
        assert!(matches!(result, Err(StoreError::MissionMismatch { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejects_duplicate_id() {
        let mission = MissionId::new();
        let store = SurveyStore::new(mission);
        let p = point(mission, 1.0, Severity::Safe);
        store.append(p.clone()).unwrap();
        assert_eq!(store.append(p.clone()), Err(StoreError::DuplicateId(p.id)));
    }

    #[test]
    fn test_remove_is_soft_and_snapshot_stable() {
        let mission = MissionId::new();
        let store = SurveyStore::new(mission);
        let p = point(mission, 1.0, Severity::Safe);
        let id = p.id;
        store.append(p.clone()).unwrap();

        let before = store.snapshot();
        store.remove(id).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 0);
        assert_eq!(store.remove(id), Err(StoreError::NotFound(id)));
        // A removed id stays reserved
        assert_eq!(store.append(p), Err(StoreError::DuplicateId(id)));
    }

    #[test]
    fn test_append_across_segment_boundaries() {
        let mission = MissionId::new();
        let store = SurveyStore::new(mission);
        let mut ids = Vec::new();
        for i in 0..(SEGMENT_LEN * 2 + 10) {
            let p = point(mission, i as f64, Severity::Safe);
            ids.push(p.id);
            store.append(p).unwrap();
        }

        store.remove(ids[SEGMENT_LEN]).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), SEGMENT_LEN * 2 + 9);
        assert_eq!(store.len(), snapshot.len());

        let seen: Vec<PointId> = snapshot.iter().map(|p| p.id).collect();
        let expected: Vec<PointId> = ids
            .iter()
            .copied()
            .filter(|id| *id != ids[SEGMENT_LEN])
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_remove_unknown() {
        let store = SurveyStore::new(MissionId::new());
        let id = PointId::new();
        assert_eq!(store.remove(id), Err(StoreError::NotFound(id)));
    }

    #[test]
    fn test_closed_store_rejects_writes() {
        let mission = MissionId::new();
        let store = SurveyStore::new(mission);
        store.close();
        assert_eq!(
            store.append(point(mission, 1.0, Severity::Safe)),
            Err(StoreError::Closed(mission))
        );
    }
}
