//! Tile cache manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::index::TileIndex;
use super::{
    DownloadSummary, FetchError, TileCacheConfig, TileCacheEntry, TileSource, TileStatus,
    TileStore,
};
use crate::coord::{plan_tiles, BoundingBox, TileKey, TilePlan, ZoomRange};

/// Progress of a running download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub completed: u64,
    pub total: u64,
}

/// Callback invoked after each tile of a download completes.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// What to purge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PurgeScope {
    /// Every tile intersecting the box, at any zoom.
    Region(BoundingBox),
    All,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileCacheStats {
    pub cached: usize,
    pub pending: usize,
    pub failed: usize,
    pub cached_bytes: u64,
    pub max_size_bytes: u64,
    pub pinned: Option<BoundingBox>,
}

enum TileOutcome {
    AlreadyCached,
    Cached,
    Failed,
    Cancelled,
}

/// Downloads, stores and evicts offline map tiles.
///
/// # Example
///
/// ```ignore
/// let config = TileCacheConfig::new(dir);
/// let source = Arc::new(HttpTileSource::new(&config)?);
/// let store = Arc::new(DiskTileStore::new(&dir));
/// let manager = TileCacheManager::open(config, source, store).await?;
///
/// let cancel = CancellationToken::new();
/// let summary = manager.download(bbox, zooms, &cancel, None).await;
/// ```
pub struct TileCacheManager {
    config: TileCacheConfig,
    source: Arc<dyn TileSource>,
    store: Arc<dyn TileStore>,
    index: Mutex<TileIndex>,
}

impl TileCacheManager {
    /// Opens the cache, rebuilding the index from tiles already in the store.
    ///
    /// Stored tiles are ordered by modification time so eviction order
    /// survives restarts. If the store exceeds the budget, the oldest tiles
    /// are evicted immediately.
    pub async fn open(
        config: TileCacheConfig,
        source: Arc<dyn TileSource>,
        store: Arc<dyn TileStore>,
    ) -> Result<Self, FetchError> {
        let mut stored = store.list().await?;
        stored.sort_by_key(|tile| (tile.fetched_at, tile.key));

        let mut index = TileIndex::default();
        for tile in &stored {
            index.mark_cached(tile.key, tile.size, tile.fetched_at);
        }
        info!(
            tiles = stored.len(),
            bytes = index.cached_bytes(),
            "Opened tile cache"
        );

        let manager = Self {
            config,
            source,
            store,
            index: Mutex::new(index),
        };
        manager.enforce_budget().await;
        Ok(manager)
    }

    pub fn config(&self) -> &TileCacheConfig {
        &self.config
    }

    /// Every tile covering `bbox` at each zoom in `zooms`, lazily.
    pub fn plan_download(&self, bbox: BoundingBox, zooms: ZoomRange) -> TilePlan {
        plan_tiles(bbox, zooms)
    }

    pub fn status(&self, key: TileKey) -> Option<TileStatus> {
        self.index.lock().status(&key)
    }

    /// Returns a tile, downloading it if it is not cached.
    ///
    /// # Errors
    ///
    /// * `Timeout` - The source did not answer within the configured timeout
    /// * `StorageFull` - The tile cannot fit even after evicting unpinned tiles
    /// * Any error from the source or store
    pub async fn fetch(&self, key: TileKey) -> Result<TileCacheEntry, FetchError> {
        if let Some(entry) = self.get(key).await? {
            return Ok(entry);
        }

        self.index.lock().mark_pending(key);
        match self.fetch_remote(key).await {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.index.lock().mark_failed(key);
                Err(e)
            }
        }
    }

    /// Returns a cached tile without touching the network.
    pub async fn get(&self, key: TileKey) -> Result<Option<TileCacheEntry>, FetchError> {
        let Some(fetched_at) = ({
            let index = self.index.lock();
            index.is_cached(&key).then(|| index.fetched_at(&key)).flatten()
        }) else {
            return Ok(None);
        };

        match self.store.get(key).await? {
            Some(payload) => Ok(Some(TileCacheEntry {
                key,
                payload,
                fetched_at,
                status: TileStatus::Cached,
            })),
            None => {
                debug!(tile = %key, "indexed tile missing from store");
                self.index.lock().remove(&key);
                Ok(None)
            }
        }
    }

    /// Stores a tile obtained elsewhere, subject to the size budget.
    pub async fn put(&self, key: TileKey, payload: Bytes) -> Result<TileCacheEntry, FetchError> {
        self.admit(key, payload).await
    }

    /// Removes one tile regardless of pinning. Returns whether it was known.
    pub async fn evict(&self, key: TileKey) -> Result<bool, FetchError> {
        let known = self.index.lock().remove(&key).is_some();
        let stored = self.store.delete(key).await?;
        Ok(known || stored)
    }

    /// Removes tiles in a region, or everything. Returns the number removed.
    pub async fn purge(&self, scope: PurgeScope) -> Result<usize, FetchError> {
        let keys = {
            let index = self.index.lock();
            match scope {
                PurgeScope::Region(region) => index.keys_in(&region),
                PurgeScope::All => index.keys(),
            }
        };

        let mut removed = 0;
        for key in keys {
            if self.evict(key).await? {
                removed += 1;
            }
        }
        info!(?scope, removed, "Purged tiles");
        Ok(removed)
    }

    /// Exempts tiles intersecting `region` from eviction.
    pub fn pin_region(&self, region: BoundingBox) {
        self.index.lock().set_pinned(Some(region));
    }

    pub fn unpin(&self) {
        self.index.lock().set_pinned(None);
    }

    pub fn stats(&self) -> TileCacheStats {
        let index = self.index.lock();
        let (cached, pending, failed) = index.counts();
        TileCacheStats {
            cached,
            pending,
            failed,
            cached_bytes: index.cached_bytes(),
            max_size_bytes: self.config.max_size_bytes,
            pinned: index.pinned(),
        }
    }

    /// Downloads every tile of the plan that is not already cached.
    ///
    /// Fetches run concurrently up to the configured limit. A failing tile
    /// is recorded and the batch continues. On cancellation, in-flight
    /// network requests are dropped and their tiles stay pending, as do
    /// tiles not yet started. A tile whose bytes already arrived finishes
    /// its write and counts as cached.
    pub async fn download(
        &self,
        bbox: BoundingBox,
        zooms: ZoomRange,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> DownloadSummary {
        let plan = self.plan_download(bbox, zooms);
        let total = plan.tile_count();
        info!(tiles = total, ?bbox, min_zoom = zooms.min, max_zoom = zooms.max, "Starting tile download");

        let summary = self.run_batch(plan, total, cancel, on_progress).await;
        info!(%summary, "Tile download finished");
        summary
    }

    /// Moves failed tiles back to pending and downloads them again.
    pub async fn retry_failed(
        &self,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> DownloadSummary {
        let failed = self.index.lock().failed_keys();
        let total = failed.len() as u64;
        info!(tiles = total, "Retrying failed tiles");

        let summary = self.run_batch(failed, total, cancel, on_progress).await;
        info!(%summary, "Retry finished");
        summary
    }

    async fn run_batch<I>(
        &self,
        keys: I,
        total: u64,
        cancel: &CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> DownloadSummary
    where
        I: IntoIterator<Item = TileKey>,
    {
        let completed = AtomicU64::new(0);
        let mut summary = DownloadSummary::default();

        let mut outcomes = stream::iter(keys)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|key| self.download_one(key, cancel))
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                TileOutcome::AlreadyCached => summary.already_cached += 1,
                TileOutcome::Cached => summary.newly_cached += 1,
                TileOutcome::Failed => summary.failed += 1,
                TileOutcome::Cancelled => summary.pending += 1,
            }
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(callback) = &on_progress {
                callback(DownloadProgress {
                    completed: done,
                    total,
                });
            }
        }

        // Tiles never started because of cancellation
        summary.pending += total.saturating_sub(summary.total());
        summary
    }

    async fn download_one(&self, key: TileKey, cancel: &CancellationToken) -> TileOutcome {
        {
            let mut index = self.index.lock();
            if index.is_cached(&key) {
                return TileOutcome::AlreadyCached;
            }
            index.mark_pending(key);
        }

        // Only the network phase is cancellable; once bytes arrive the write
        // runs to completion so the index never claims a tile the store lacks
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TileOutcome::Cancelled,
            fetched = self.fetch_payload(key) => fetched,
        };

        let result = match fetched {
            Ok(payload) => self.admit(key, payload).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(_) => TileOutcome::Cached,
            Err(e) => {
                warn!(tile = %key, error = %e, "Tile fetch failed");
                self.index.lock().mark_failed(key);
                TileOutcome::Failed
            }
        }
    }

    async fn fetch_payload(&self, key: TileKey) -> Result<Bytes, FetchError> {
        tokio::time::timeout(self.config.timeout, self.source.fetch(key))
            .await
            .map_err(|_| FetchError::Timeout(self.config.timeout))?
    }

    async fn fetch_remote(&self, key: TileKey) -> Result<TileCacheEntry, FetchError> {
        let payload = self.fetch_payload(key).await?;
        self.admit(key, payload).await
    }

    /// Reserves room for a payload, writes it, and only then marks it cached.
    ///
    /// On failure the reservation is released and the tile keeps whatever
    /// pending entry the caller gave it; a replaced cached tile is dropped
    /// from both the index and the store.
    async fn admit(&self, key: TileKey, payload: Bytes) -> Result<TileCacheEntry, FetchError> {
        let size = payload.len() as u64;

        let (reserved, replaced) = {
            let mut index = self.index.lock();
            // A re-put of a cached tile frees its old bytes first
            let replaced = index.is_cached(&key);
            if replaced {
                index.remove(&key);
            }
            (index.reserve(size, self.config.max_size_bytes), replaced)
        };

        let eviction = match reserved {
            Ok(eviction) => eviction,
            Err(available) => {
                if replaced {
                    // The old payload is no longer indexed
                    self.store.delete(key).await?;
                }
                return Err(FetchError::StorageFull {
                    needed: size,
                    available,
                });
            }
        };

        for victim in &eviction.victims {
            if let Err(e) = self.store.delete(*victim).await {
                warn!(tile = %victim, error = %e, "Failed to delete evicted tile");
            }
        }
        if !eviction.victims.is_empty() {
            debug!(
                evicted = eviction.victims.len(),
                bytes = eviction.bytes_freed,
                "Evicted tiles"
            );
        }

        if let Err(e) = self.store.put(key, payload.clone()).await {
            self.index.lock().release(size);
            if replaced {
                if let Err(e) = self.store.delete(key).await {
                    warn!(tile = %key, error = %e, "Failed to delete replaced tile");
                }
            }
            return Err(e.into());
        }

        let fetched_at = Utc::now();
        self.index.lock().commit(key, size, fetched_at);
        Ok(TileCacheEntry {
            key,
            payload,
            fetched_at,
            status: TileStatus::Cached,
        })
    }

    /// Evicts down to the budget, e.g. after reopening with a smaller limit.
    async fn enforce_budget(&self) {
        let eviction = {
            let mut index = self.index.lock();
            match index.make_room(0, self.config.max_size_bytes) {
                Ok(eviction) => eviction,
                Err(available) => {
                    warn!(
                        cached = index.cached_bytes(),
                        evictable = available,
                        budget = self.config.max_size_bytes,
                        "Tile cache over budget and cannot be reduced"
                    );
                    return;
                }
            }
        };
        for victim in eviction.victims {
            if let Err(e) = self.store.delete(victim).await {
                warn!(tile = %victim, error = %e, "Failed to delete evicted tile");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::source::tests::MockTileSource;
    use crate::tiles::{MemoryTileStore, StoredTile};
    use futures::future::BoxFuture;
    use std::io;
    use std::time::Duration;

    /// Memory store whose writes can be slowed down or made to fail.
    #[derive(Default)]
    struct UnreliableStore {
        inner: MemoryTileStore,
        put_delay: Option<Duration>,
        fail_puts: bool,
    }

    impl TileStore for UnreliableStore {
        fn get(&self, key: TileKey) -> BoxFuture<'_, io::Result<Option<Bytes>>> {
            self.inner.get(key)
        }

        fn put(&self, key: TileKey, payload: Bytes) -> BoxFuture<'_, io::Result<()>> {
            Box::pin(async move {
                if let Some(delay) = self.put_delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail_puts {
                    return Err(io::Error::other("disk full"));
                }
                self.inner.put(key, payload).await
            })
        }

        fn delete(&self, key: TileKey) -> BoxFuture<'_, io::Result<bool>> {
            self.inner.delete(key)
        }

        fn list(&self) -> BoxFuture<'_, io::Result<Vec<StoredTile>>> {
            self.inner.list()
        }
    }

    fn region() -> BoundingBox {
        // Covers exactly 2x2 tiles at zoom 1
        BoundingBox::new(-80.0, -170.0, 80.0, 170.0).unwrap()
    }

    async fn manager_with(
        source: Arc<MockTileSource>,
        store: Arc<MemoryTileStore>,
        config: TileCacheConfig,
    ) -> TileCacheManager {
        TileCacheManager::open(config, source, store).await.unwrap()
    }

    #[tokio::test]
    async fn test_download_then_replan_fetches_nothing() {
        let source = Arc::new(MockTileSource::new(b"tile"));
        let manager = manager_with(
            Arc::clone(&source),
            Arc::new(MemoryTileStore::new()),
            TileCacheConfig::default(),
        )
        .await;
        let cancel = CancellationToken::new();
        let zooms = ZoomRange::single(1).unwrap();

        let first = manager.download(region(), zooms, &cancel, None).await;
        assert_eq!(first.newly_cached, 4);
        assert_eq!(source.calls(), 4);

        let second = manager.download(region(), zooms, &cancel, None).await;
        assert_eq!(second.already_cached, 4);
        assert_eq!(second.newly_cached, 0);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_partially_cached_region() {
        let source = Arc::new(MockTileSource::new(b"tile"));
        let manager = manager_with(
            Arc::clone(&source),
            Arc::new(MemoryTileStore::new()),
            TileCacheConfig::default(),
        )
        .await;
        manager.put(TileKey::new(1, 0, 0), Bytes::from_static(b"x")).await.unwrap();
        manager.put(TileKey::new(1, 1, 1), Bytes::from_static(b"y")).await.unwrap();

        let summary = manager
            .download(region(), ZoomRange::single(1).unwrap(), &CancellationToken::new(), None)
            .await;

        assert_eq!(source.calls(), 2);
        assert_eq!(summary.already_cached, 2);
        assert_eq!(summary.newly_cached, 2);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let bad = TileKey::new(1, 1, 0);
        let source = Arc::new(MockTileSource::new(b"tile").failing(bad, FetchError::Status(503)));
        let manager = manager_with(
            Arc::clone(&source),
            Arc::new(MemoryTileStore::new()),
            TileCacheConfig::default(),
        )
        .await;
        let cancel = CancellationToken::new();

        let summary = manager
            .download(region(), ZoomRange::single(1).unwrap(), &cancel, None)
            .await;
        assert_eq!(summary.newly_cached, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(manager.status(bad), Some(TileStatus::Failed));

        let retry = manager.retry_failed(&cancel, None).await;
        assert_eq!(retry.failed, 1);
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let source = Arc::new(MockTileSource::new(b"tile").with_delay(Duration::from_millis(200)));
        let config = TileCacheConfig::default().with_timeout(Duration::from_millis(20));
        let manager = manager_with(source, Arc::new(MemoryTileStore::new()), config).await;

        let key = TileKey::new(3, 1, 1);
        let result = manager.fetch(key).await;
        assert_eq!(result, Err(FetchError::Timeout(Duration::from_millis(20))));
        assert_eq!(manager.status(key), Some(TileStatus::Failed));
    }

    #[tokio::test]
    async fn test_cancelled_download_leaves_tiles_pending() {
        let source = Arc::new(MockTileSource::new(b"tile").with_delay(Duration::from_secs(30)));
        let manager = manager_with(
            source,
            Arc::new(MemoryTileStore::new()),
            TileCacheConfig::default().with_concurrency(2),
        )
        .await;
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let summary = manager
            .download(region(), ZoomRange::single(1).unwrap(), &cancel, None)
            .await;

        assert_eq!(summary.pending, 4);
        assert_eq!(summary.failed, 0);
        let stats = manager.stats();
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.cached, 0);
    }

    #[tokio::test]
    async fn test_store_write_failure_marks_tiles_failed() {
        let source = Arc::new(MockTileSource::new(b"tile"));
        let store = Arc::new(UnreliableStore {
            fail_puts: true,
            ..Default::default()
        });
        let manager = TileCacheManager::open(TileCacheConfig::default(), source.clone(), store)
            .await
            .unwrap();
        let cancel = CancellationToken::new();

        let summary = manager
            .download(region(), ZoomRange::single(1).unwrap(), &cancel, None)
            .await;
        assert_eq!(summary.failed, 4);
        assert_eq!(manager.status(TileKey::new(1, 1, 0)), Some(TileStatus::Failed));

        let stats = manager.stats();
        assert_eq!(stats.failed, 4);
        assert_eq!(stats.cached_bytes, 0);

        let retry = manager.retry_failed(&cancel, None).await;
        assert_eq!(retry.total(), 4);
        assert_eq!(retry.failed, 4);
        assert_eq!(source.calls(), 8);
    }

    #[tokio::test]
    async fn test_fetch_with_failing_store_is_retryable() {
        let store = Arc::new(UnreliableStore {
            fail_puts: true,
            ..Default::default()
        });
        let manager = TileCacheManager::open(
            TileCacheConfig::default(),
            Arc::new(MockTileSource::new(b"tile")),
            store,
        )
        .await
        .unwrap();

        let key = TileKey::new(6, 10, 10);
        assert!(matches!(manager.fetch(key).await, Err(FetchError::Storage(_))));
        assert_eq!(manager.status(key), Some(TileStatus::Failed));
    }

    #[tokio::test]
    async fn test_cancel_during_write_keeps_index_and_store_in_step() {
        let source = Arc::new(MockTileSource::new(b"tile"));
        let store = Arc::new(UnreliableStore {
            put_delay: Some(Duration::from_millis(300)),
            ..Default::default()
        });
        let manager = TileCacheManager::open(
            TileCacheConfig::default().with_concurrency(4),
            source.clone(),
            store.clone(),
        )
        .await
        .unwrap();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let zooms = ZoomRange::single(1).unwrap();
        let summary = manager.download(region(), zooms, &cancel, None).await;

        // Bytes were already in hand when the token fired
        assert_eq!(summary.newly_cached, 4);
        assert_eq!(summary.pending, 0);
        for key in manager.plan_download(region(), zooms) {
            let indexed = manager.status(key) == Some(TileStatus::Cached);
            let stored = store.get(key).await.unwrap().is_some();
            assert_eq!(indexed, stored, "index and store disagree on {}", key);
        }
        assert_eq!(manager.stats().cached_bytes, 16);

        let replan = manager
            .download(region(), zooms, &CancellationToken::new(), None)
            .await;
        assert_eq!(replan.already_cached, 4);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_tile_is_not_readable_until_written() {
        let store = Arc::new(UnreliableStore {
            put_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let manager = Arc::new(
            TileCacheManager::open(
                TileCacheConfig::default(),
                Arc::new(MockTileSource::new(b"tile")),
                store,
            )
            .await
            .unwrap(),
        );
        let key = TileKey::new(8, 3, 3);

        let writer = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.put(key, Bytes::from_static(b"abcd")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.get(key).await.unwrap(), None);
        assert_eq!(manager.stats().cached, 0);

        writer.await.unwrap().unwrap();
        assert!(manager.get(key).await.unwrap().is_some());
        assert_eq!(manager.stats().cached_bytes, 4);
    }

    #[tokio::test]
    async fn test_eviction_respects_pinned_region() {
        let source = Arc::new(MockTileSource::new(b"0123456789"));
        let config = TileCacheConfig::default()
            .with_max_size_bytes(30)
            .with_concurrency(1);
        let manager = manager_with(source, Arc::new(MemoryTileStore::new()), config).await;

        let pinned = TileKey::new(12, 100, 100);
        manager.fetch(pinned).await.unwrap();
        manager.pin_region(pinned.bounds());

        for x in 2000..2005 {
            manager.fetch(TileKey::new(12, x, 2000)).await.unwrap();
        }

        assert_eq!(manager.status(pinned), Some(TileStatus::Cached));
        assert!(manager.stats().cached_bytes <= 30);
        assert_eq!(manager.status(TileKey::new(12, 2000, 2000)), None);
        assert_eq!(manager.status(TileKey::new(12, 2004, 2000)), Some(TileStatus::Cached));
    }

    #[tokio::test]
    async fn test_storage_full_when_everything_pinned() {
        let source = Arc::new(MockTileSource::new(b"0123456789"));
        let config = TileCacheConfig::default().with_max_size_bytes(10);
        let manager = manager_with(source, Arc::new(MemoryTileStore::new()), config).await;

        let pinned = TileKey::new(12, 100, 100);
        manager.fetch(pinned).await.unwrap();
        manager.pin_region(pinned.bounds());

        let result = manager.fetch(TileKey::new(12, 3000, 3000)).await;
        assert!(matches!(result, Err(FetchError::StorageFull { needed: 10, .. })));
        assert_eq!(manager.status(pinned), Some(TileStatus::Cached));
    }

    #[tokio::test]
    async fn test_purge_region_and_all() {
        let store = Arc::new(MemoryTileStore::new());
        let manager = manager_with(
            Arc::new(MockTileSource::new(b"tile")),
            Arc::clone(&store),
            TileCacheConfig::default(),
        )
        .await;
        let cancel = CancellationToken::new();
        manager
            .download(region(), ZoomRange::single(1).unwrap(), &cancel, None)
            .await;

        // North-western quadrant only
        let nw = BoundingBox::new(10.0, -170.0, 80.0, -10.0).unwrap();
        assert_eq!(manager.purge(PurgeScope::Region(nw)).await.unwrap(), 1);
        assert_eq!(manager.status(TileKey::new(1, 0, 0)), None);
        assert_eq!(manager.stats().cached, 3);

        assert_eq!(manager.purge(PurgeScope::All).await.unwrap(), 3);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_rebuilds_index_from_store() {
        let store = Arc::new(MemoryTileStore::new());
        store.put(TileKey::new(4, 1, 1), Bytes::from_static(b"abc")).await.unwrap();

        let source = Arc::new(MockTileSource::new(b"tile"));
        let manager = manager_with(Arc::clone(&source), store, TileCacheConfig::default()).await;

        let entry = manager.fetch(TileKey::new(4, 1, 1)).await.unwrap();
        assert_eq!(entry.payload, Bytes::from_static(b"abc"));
        assert_eq!(source.calls(), 0);
        assert_eq!(manager.stats().cached_bytes, 3);
    }

    #[tokio::test]
    async fn test_progress_callback() {
        let manager = manager_with(
            Arc::new(MockTileSource::new(b"tile")),
            Arc::new(MemoryTileStore::new()),
            TileCacheConfig::default(),
        )
        .await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().push(p));

        manager
            .download(
                region(),
                ZoomRange::new(0, 1).unwrap(),
                &CancellationToken::new(),
                Some(callback),
            )
            .await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen.last().map(|p| (p.completed, p.total)), Some((5, 5)));
    }
}
