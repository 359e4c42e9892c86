//! Offline map tile cache.
//!
//! [`TileCacheManager`] downloads the tiles covering a survey region ahead of
//! time so the heatmap can be drawn without connectivity in the field.
//!
//! # Architecture
//!
//! ```text
//! TilePlan ──► TileCacheManager ──► TileSource (HTTP)
//!                    │
//!                    ├──► TileIndex (status, bytes, LRU order, pinned region)
//!                    └──► TileStore (memory or {root}/{z}/{x}/{y}.tile)
//! ```
//!
//! Each tile moves `pending → cached` on success and `pending → failed` on
//! error. A failed tile becomes pending again when it is retried or the
//! region is re-planned. Cached tiles leave the cache only through purge or
//! eviction, and eviction never touches tiles inside the pinned region.

mod config;
mod index;
mod manager;
mod source;
mod store;

pub use config::{TileCacheConfig, DEFAULT_TILE_URL_TEMPLATE};
pub use manager::{DownloadProgress, ProgressCallback, PurgeScope, TileCacheManager, TileCacheStats};
pub use source::{HttpTileSource, TileSource};
pub use store::{DiskTileStore, MemoryTileStore, StoredTile, TileStore};

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::coord::TileKey;

/// Errors from fetching or storing a single tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("tile cache is full: need {needed} bytes, {available} can be freed")]
    StorageFull { needed: u64, available: u64 },

    #[error("tile fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("tile server returned HTTP {0}")]
    Status(u16),

    #[error("tile storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        FetchError::Storage(e.to_string())
    }
}

/// Lifecycle state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TileStatus {
    Pending,
    Cached,
    Failed,
}

impl fmt::Display for TileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileStatus::Pending => write!(f, "pending"),
            TileStatus::Cached => write!(f, "cached"),
            TileStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A tile and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCacheEntry {
    pub key: TileKey,
    pub payload: Bytes,
    pub fetched_at: DateTime<Utc>,
    pub status: TileStatus,
}

/// Aggregate result of a batch download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    /// Tiles skipped because they were already cached.
    pub already_cached: u64,
    /// Tiles fetched and stored by this run.
    pub newly_cached: u64,
    /// Tiles that failed; they can be retried.
    pub failed: u64,
    /// Tiles not finished because the run was cancelled.
    pub pending: u64,
}

impl DownloadSummary {
    pub fn total(&self) -> u64 {
        self.already_cached + self.newly_cached + self.failed + self.pending
    }

    /// Whether every planned tile is now cached.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} already cached, {} downloaded, {} failed, {} pending",
            self.already_cached, self.newly_cached, self.failed, self.pending
        )
    }
}
