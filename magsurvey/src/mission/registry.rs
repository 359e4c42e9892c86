//! Mission registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use super::{Mission, MissionError, MissionId, MissionUpdate};
use crate::store::SurveyStore;

struct Entry {
    mission: Mission,
    store: Arc<SurveyStore>,
}

/// Owns missions and their measurement stores.
///
/// Missions are returned by value; callers re-read after an update instead of
/// holding a shared mutable reference.
#[derive(Default)]
pub struct MissionRegistry {
    entries: RwLock<HashMap<MissionId, Entry>>,
}

impl MissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mission with an empty store.
    pub fn create(&self, mission: Mission) -> Result<Arc<SurveyStore>, MissionError> {
        let id = mission.id();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(MissionError::AlreadyExists(id));
        }

        let store = Arc::new(SurveyStore::new(id));
        info!(mission = %id, name = mission.name(), "Created mission");
        entries.insert(
            id,
            Entry {
                mission,
                store: Arc::clone(&store),
            },
        );
        Ok(store)
    }

    pub fn get(&self, id: MissionId) -> Option<Mission> {
        self.entries.read().get(&id).map(|entry| entry.mission.clone())
    }

    /// All missions, newest first.
    pub fn list(&self) -> Vec<Mission> {
        let mut missions: Vec<Mission> = self
            .entries
            .read()
            .values()
            .map(|entry| entry.mission.clone())
            .collect();
        missions.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        missions
    }

    /// Applies an update and returns the new mission state.
    ///
    /// Sampling for the mission should be paused by the caller; points
    /// already stored keep the severity they were classified with.
    pub fn update(&self, id: MissionId, update: MissionUpdate) -> Result<Mission, MissionError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id).ok_or(MissionError::NotFound(id))?;
        entry.mission.apply(update, Utc::now())?;
        Ok(entry.mission.clone())
    }

    /// Deletes a mission and all of its measurement points.
    ///
    /// Outstanding handles to the store stop accepting writes; snapshots
    /// already taken stay readable.
    pub fn delete(&self, id: MissionId) -> Result<Mission, MissionError> {
        let entry = self
            .entries
            .write()
            .remove(&id)
            .ok_or(MissionError::NotFound(id))?;
        entry.store.close();
        info!(mission = %id, points = entry.store.len(), "Deleted mission");
        Ok(entry.mission)
    }

    /// Measurement store of a mission.
    pub fn store(&self, id: MissionId) -> Result<Arc<SurveyStore>, MissionError> {
        self.entries
            .read()
            .get(&id)
            .map(|entry| Arc::clone(&entry.store))
            .ok_or(MissionError::NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
