//! Coarse lat/lon grid used to prune zone candidates.

use std::collections::HashMap;

use crate::coord::BoundingBox;

/// Zones spanning more cells than this are kept in a list that every query
/// scans, so one country-sized layer cannot blow up the grid.
const MAX_CELLS_PER_ENTRY: u64 = 4096;

type Cell = (i32, i32);

#[derive(Debug, Clone)]
pub(crate) struct ZoneGrid {
    cell_degrees: f64,
    cells: HashMap<Cell, Vec<usize>>,
    oversized: Vec<usize>,
}

impl ZoneGrid {
    pub fn new(cell_degrees: f64) -> Self {
        Self {
            cell_degrees,
            cells: HashMap::new(),
            oversized: Vec::new(),
        }
    }

    fn cell_of(&self, lat: f64, lon: f64) -> Cell {
        (
            (lat / self.cell_degrees).floor() as i32,
            (lon / self.cell_degrees).floor() as i32,
        )
    }

    fn cell_span(&self, bbox: &BoundingBox) -> (Cell, Cell) {
        (
            self.cell_of(bbox.south, bbox.west),
            self.cell_of(bbox.north, bbox.east),
        )
    }

    fn span_len(min: Cell, max: Cell) -> u64 {
        let rows = (max.0 - min.0) as i64 + 1;
        let cols = (max.1 - min.1) as i64 + 1;
        (rows * cols) as u64
    }

    pub fn insert(&mut self, entry: usize, bbox: &BoundingBox) {
        let (min, max) = self.cell_span(bbox);
        if Self::span_len(min, max) > MAX_CELLS_PER_ENTRY {
            self.oversized.push(entry);
            return;
        }
        for row in min.0..=max.0 {
            for col in min.1..=max.1 {
                self.cells.entry((row, col)).or_default().push(entry);
            }
        }
    }

    /// Entries whose cells contain the point, plus all oversized entries.
    pub fn candidates_at(&self, lat: f64, lon: f64) -> impl Iterator<Item = usize> + '_ {
        let cell = self.cell_of(lat, lon);
        self.cells
            .get(&cell)
            .into_iter()
            .flatten()
            .chain(self.oversized.iter())
            .copied()
    }

    /// Entries whose cells overlap `bbox`, deduplicated and sorted.
    ///
    /// Returns `None` when the box covers too many cells; callers scan every
    /// entry instead.
    pub fn candidates_in(&self, bbox: &BoundingBox) -> Option<Vec<usize>> {
        let (min, max) = self.cell_span(bbox);
        if Self::span_len(min, max) > MAX_CELLS_PER_ENTRY {
            return None;
        }

        let mut found: Vec<usize> = self.oversized.clone();
        for row in min.0..=max.0 {
            for col in min.1..=max.1 {
                if let Some(entries) = self.cells.get(&(row, col)) {
                    found.extend_from_slice(entries);
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        Some(found)
    }
}
