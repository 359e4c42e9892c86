//! In-memory bookkeeping for the tile cache: status, sizes and LRU order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::TileStatus;
use crate::coord::{BoundingBox, TileKey};

#[derive(Debug, Clone)]
struct IndexEntry {
    status: TileStatus,
    size: u64,
    fetched_at: Option<DateTime<Utc>>,
    /// Fetch order; lower is older.
    sequence: u64,
}

/// Tiles to remove from the store after an eviction decision.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Eviction {
    pub victims: Vec<TileKey>,
    pub bytes_freed: u64,
}

/// Tracks the state of every tile the manager has seen.
///
/// Not synchronized; the manager wraps it in a mutex and never holds the
/// lock across an await.
#[derive(Debug, Default)]
pub(crate) struct TileIndex {
    entries: HashMap<TileKey, IndexEntry>,
    cached_bytes: u64,
    /// Bytes admitted but not yet written to the store.
    reserved_bytes: u64,
    next_sequence: u64,
    pinned: Option<BoundingBox>,
}

impl TileIndex {
    pub fn status(&self, key: &TileKey) -> Option<TileStatus> {
        self.entries.get(key).map(|entry| entry.status)
    }

    pub fn is_cached(&self, key: &TileKey) -> bool {
        self.status(key) == Some(TileStatus::Cached)
    }

    pub fn fetched_at(&self, key: &TileKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).and_then(|entry| entry.fetched_at)
    }

    pub fn cached_bytes(&self) -> u64 {
        self.cached_bytes
    }

    pub fn pinned(&self) -> Option<BoundingBox> {
        self.pinned
    }

    pub fn set_pinned(&mut self, pinned: Option<BoundingBox>) {
        self.pinned = pinned;
    }

    pub fn reserved_bytes(&self) -> u64 {
        self.reserved_bytes
    }

    /// Tiles sharing area with the pinned region. Touching an edge is not enough.
    fn is_pinned(&self, key: &TileKey) -> bool {
        self.pinned
            .map(|region| key.bounds().overlaps(&region))
            .unwrap_or(false)
    }

    /// Marks a tile as pending. Cached tiles are left alone.
    pub fn mark_pending(&mut self, key: TileKey) {
        let entry = self.entries.entry(key).or_insert(IndexEntry {
            status: TileStatus::Pending,
            size: 0,
            fetched_at: None,
            sequence: 0,
        });
        if entry.status == TileStatus::Failed {
            entry.status = TileStatus::Pending;
        }
    }

    /// Marks a tile as failed, recording it if it was unknown. Cached tiles
    /// are left alone.
    pub fn mark_failed(&mut self, key: TileKey) {
        let entry = self.entries.entry(key).or_insert(IndexEntry {
            status: TileStatus::Failed,
            size: 0,
            fetched_at: None,
            sequence: 0,
        });
        if entry.status != TileStatus::Cached {
            entry.status = TileStatus::Failed;
        }
    }

    /// Records a cached tile as the most recently fetched.
    pub fn mark_cached(&mut self, key: TileKey, size: u64, fetched_at: DateTime<Utc>) {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        let previous = self.entries.insert(
            key,
            IndexEntry {
                status: TileStatus::Cached,
                size,
                fetched_at: Some(fetched_at),
                sequence,
            },
        );
        if let Some(prev) = previous.filter(|p| p.status == TileStatus::Cached) {
            self.cached_bytes -= prev.size;
        }
        self.cached_bytes += size;
    }

    /// Forgets a tile entirely. Returns its status if it was known.
    pub fn remove(&mut self, key: &TileKey) -> Option<TileStatus> {
        let entry = self.entries.remove(key)?;
        if entry.status == TileStatus::Cached {
            self.cached_bytes -= entry.size;
        }
        Some(entry.status)
    }

    /// Makes room for `size` bytes and holds them until [`commit`] or
    /// [`release`]. The tile's status is not touched.
    ///
    /// [`commit`]: TileIndex::commit
    /// [`release`]: TileIndex::release
    pub fn reserve(&mut self, size: u64, budget: u64) -> Result<Eviction, u64> {
        let eviction = self.make_room(size, budget)?;
        self.reserved_bytes += size;
        Ok(eviction)
    }

    /// Turns a reservation into a cached tile once its payload is stored.
    pub fn commit(&mut self, key: TileKey, size: u64, fetched_at: DateTime<Utc>) {
        self.release(size);
        self.mark_cached(key, size, fetched_at);
    }

    /// Drops a reservation whose write failed.
    pub fn release(&mut self, size: u64) {
        self.reserved_bytes = self.reserved_bytes.saturating_sub(size);
    }

    /// Chooses the oldest unpinned tiles to drop so that `incoming` more
    /// bytes fit in `budget` next to everything cached or reserved, and
    /// removes them from the index.
    ///
    /// Returns `Err(available)` with the number of evictable bytes when even
    /// evicting every unpinned tile would not make room; nothing is removed
    /// in that case.
    pub fn make_room(&mut self, incoming: u64, budget: u64) -> Result<Eviction, u64> {
        let needed = (self.cached_bytes + self.reserved_bytes + incoming).saturating_sub(budget);
        if needed == 0 {
            return Ok(Eviction::default());
        }

        let mut candidates: Vec<(u64, TileKey, u64)> = self
            .entries
            .iter()
            .filter(|(key, entry)| entry.status == TileStatus::Cached && !self.is_pinned(key))
            .map(|(key, entry)| (entry.sequence, *key, entry.size))
            .collect();

        let available: u64 = candidates.iter().map(|(_, _, size)| size).sum();
        if available < needed || incoming > budget {
            return Err(available);
        }

        candidates.sort_unstable_by_key(|(sequence, _, _)| *sequence);

        let mut eviction = Eviction::default();
        for (_, key, size) in candidates {
            if eviction.bytes_freed >= needed {
                break;
            }
            self.remove(&key);
            eviction.victims.push(key);
            eviction.bytes_freed += size;
        }
        Ok(eviction)
    }

    /// Known tiles whose bounds intersect `region`.
    pub fn keys_in(&self, region: &BoundingBox) -> Vec<TileKey> {
        self.entries
            .keys()
            .filter(|key| key.bounds().intersects(region))
            .copied()
            .collect()
    }

    pub fn keys(&self) -> Vec<TileKey> {
        self.entries.keys().copied().collect()
    }

    /// Failed tiles in key order.
    pub fn failed_keys(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.status == TileStatus::Failed)
            .map(|(key, _)| *key)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// `(cached, pending, failed)` counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        self.entries
            .values()
            .fold((0, 0, 0), |(c, p, f), entry| match entry.status {
                TileStatus::Cached => (c + 1, p, f),
                TileStatus::Pending => (c, p + 1, f),
                TileStatus::Failed => (c, p, f + 1),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut index = TileIndex::default();
        let key = TileKey::new(5, 3, 4);

        index.mark_pending(key);
        assert_eq!(index.status(&key), Some(TileStatus::Pending));

        index.mark_failed(key);
        assert_eq!(index.status(&key), Some(TileStatus::Failed));

        index.mark_pending(key);
        assert_eq!(index.status(&key), Some(TileStatus::Pending));

        index.mark_cached(key, 100, at(0));
        assert!(index.is_cached(&key));

        // Cached tiles ignore pending/failed transitions
        index.mark_pending(key);
        index.mark_failed(key);
        assert!(index.is_cached(&key));
        assert_eq!(index.cached_bytes(), 100);
    }

    #[test]
    fn test_recaching_replaces_size() {
        let mut index = TileIndex::default();
        let key = TileKey::new(5, 3, 4);
        index.mark_cached(key, 100, at(0));
        index.mark_cached(key, 40, at(1));
        assert_eq!(index.cached_bytes(), 40);
    }

    #[test]
    fn test_make_room_evicts_oldest_first() {
        let mut index = TileIndex::default();
        let oldest = TileKey::new(10, 0, 0);
        let middle = TileKey::new(10, 1, 0);
        let newest = TileKey::new(10, 2, 0);
        index.mark_cached(oldest, 100, at(0));
        index.mark_cached(middle, 100, at(1));
        index.mark_cached(newest, 100, at(2));

        let eviction = index.make_room(150, 300).unwrap();
        assert_eq!(eviction.victims, vec![oldest, middle]);
        assert_eq!(eviction.bytes_freed, 200);
        assert_eq!(index.cached_bytes(), 100);
        assert!(index.is_cached(&newest));
    }

    #[test]
    fn test_make_room_skips_pinned() {
        let mut index = TileIndex::default();
        let pinned_key = TileKey::new(10, 0, 0);
        let other = TileKey::new(10, 900, 900);
        index.mark_cached(pinned_key, 100, at(0));
        index.mark_cached(other, 100, at(1));
        index.set_pinned(Some(pinned_key.bounds()));

        let eviction = index.make_room(100, 200).unwrap();
        assert_eq!(eviction.victims, vec![other]);
        assert!(index.is_cached(&pinned_key));
    }

    #[test]
    fn test_make_room_reports_full() {
        let mut index = TileIndex::default();
        let key = TileKey::new(10, 0, 0);
        index.mark_cached(key, 100, at(0));
        index.set_pinned(Some(key.bounds()));

        assert_eq!(index.make_room(50, 120), Err(0));
        assert!(index.is_cached(&key));

        let mut empty = TileIndex::default();
        assert_eq!(empty.make_room(500, 100), Err(0));
    }

    #[test]
    fn test_mark_failed_records_unknown_tile() {
        let mut index = TileIndex::default();
        let key = TileKey::new(7, 10, 20);
        index.mark_failed(key);
        assert_eq!(index.status(&key), Some(TileStatus::Failed));
        assert_eq!(index.failed_keys(), vec![key]);
    }

    #[test]
    fn test_reservations_count_against_budget() {
        let mut index = TileIndex::default();
        let first = TileKey::new(10, 0, 0);
        let second = TileKey::new(10, 1, 0);

        index.reserve(60, 100).unwrap();
        assert_eq!(index.reserved_bytes(), 60);
        // Nothing cached yet to evict, and the reservation holds 60 of 100
        assert_eq!(index.reserve(60, 100), Err(0));

        index.commit(first, 60, at(0));
        assert_eq!(index.reserved_bytes(), 0);
        assert_eq!(index.cached_bytes(), 60);

        index.mark_pending(second);
        index.reserve(60, 100).unwrap();
        index.release(60);
        assert_eq!(index.reserved_bytes(), 0);
        assert_eq!(index.status(&second), Some(TileStatus::Pending));
        assert!(!index.is_cached(&second));
    }

    #[test]
    fn test_tile_touching_pinned_edge_is_evictable() {
        let mut index = TileIndex::default();
        let pinned_key = TileKey::new(10, 100, 100);
        let neighbour = TileKey::new(10, 101, 100);
        index.mark_cached(neighbour, 100, at(0));
        index.mark_cached(pinned_key, 100, at(1));
        index.set_pinned(Some(pinned_key.bounds()));

        let eviction = index.make_room(100, 200).unwrap();
        assert_eq!(eviction.victims, vec![neighbour]);
        assert!(index.is_cached(&pinned_key));
    }

    #[test]
    fn test_counts_and_failed_keys() {
        let mut index = TileIndex::default();
        index.mark_cached(TileKey::new(1, 0, 0), 1, at(0));
        index.mark_pending(TileKey::new(1, 1, 0));
        index.mark_pending(TileKey::new(1, 0, 1));
        index.mark_failed(TileKey::new(1, 0, 1));

        assert_eq!(index.counts(), (1, 1, 1));
        assert_eq!(index.failed_keys(), vec![TileKey::new(1, 0, 1)]);
    }
}
