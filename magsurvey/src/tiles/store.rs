//! Tile storage backends.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::coord::TileKey;

/// File extension of stored tiles.
const TILE_EXTENSION: &str = "tile";

/// File extension of a tile still being written.
const PARTIAL_EXTENSION: &str = "part";

/// A tile found in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTile {
    pub key: TileKey,
    pub size: u64,
    pub fetched_at: DateTime<Utc>,
}

/// Persistent `(zoom, x, y) → bytes` storage.
///
/// The manager keeps its own index and only uses the store for payloads;
/// [`TileStore::list`] lets it rebuild that index on startup.
pub trait TileStore: Send + Sync {
    fn get(&self, key: TileKey) -> BoxFuture<'_, io::Result<Option<Bytes>>>;

    /// Stores a payload, replacing any previous one.
    fn put(&self, key: TileKey, payload: Bytes) -> BoxFuture<'_, io::Result<()>>;

    /// Removes a payload. Returns whether it existed.
    fn delete(&self, key: TileKey) -> BoxFuture<'_, io::Result<bool>>;

    /// Every tile currently stored.
    fn list(&self) -> BoxFuture<'_, io::Result<Vec<StoredTile>>>;
}

/// In-memory store; contents are lost when dropped.
#[derive(Default)]
pub struct MemoryTileStore {
    tiles: RwLock<HashMap<TileKey, (Bytes, DateTime<Utc>)>>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileStore for MemoryTileStore {
    fn get(&self, key: TileKey) -> BoxFuture<'_, io::Result<Option<Bytes>>> {
        let found = self.tiles.read().get(&key).map(|(bytes, _)| bytes.clone());
        Box::pin(async move { Ok(found) })
    }

    fn put(&self, key: TileKey, payload: Bytes) -> BoxFuture<'_, io::Result<()>> {
        self.tiles.write().insert(key, (payload, Utc::now()));
        Box::pin(async { Ok(()) })
    }

    fn delete(&self, key: TileKey) -> BoxFuture<'_, io::Result<bool>> {
        let existed = self.tiles.write().remove(&key).is_some();
        Box::pin(async move { Ok(existed) })
    }

    fn list(&self) -> BoxFuture<'_, io::Result<Vec<StoredTile>>> {
        let tiles = self
            .tiles
            .read()
            .iter()
            .map(|(key, (bytes, fetched_at))| StoredTile {
                key: *key,
                size: bytes.len() as u64,
                fetched_at: *fetched_at,
            })
            .collect();
        Box::pin(async move { Ok(tiles) })
    }
}

/// On-disk store laid out as `{root}/{zoom}/{x}/{y}.tile`.
///
/// Blocking file I/O runs on tokio's blocking pool. Writes go to a
/// temporary `.part` file first and are renamed into place, so a crash never
/// leaves a truncated tile behind. A failed write removes its `.part` file;
/// any left over from a crash are swept by [`TileStore::list`], which the
/// manager calls once when it opens.
pub struct DiskTileStore {
    root: PathBuf,
}

impl DiskTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a tile's file.
    pub fn tile_path(&self, key: TileKey) -> PathBuf {
        self.root
            .join(key.zoom.to_string())
            .join(key.x.to_string())
            .join(format!("{}.{}", key.y, TILE_EXTENSION))
    }
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::other(e.to_string()))?
}

impl TileStore for DiskTileStore {
    fn get(&self, key: TileKey) -> BoxFuture<'_, io::Result<Option<Bytes>>> {
        let path = self.tile_path(key);
        Box::pin(blocking(move || match std::fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }))
    }

    fn put(&self, key: TileKey, payload: Bytes) -> BoxFuture<'_, io::Result<()>> {
        let path = self.tile_path(key);
        Box::pin(blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let partial = path.with_extension(PARTIAL_EXTENSION);
            let written =
                std::fs::write(&partial, &payload).and_then(|()| std::fs::rename(&partial, &path));
            if written.is_err() {
                // The write error is what the caller needs to see
                let _ = std::fs::remove_file(&partial);
            }
            written
        }))
    }

    fn delete(&self, key: TileKey) -> BoxFuture<'_, io::Result<bool>> {
        let path = self.tile_path(key);
        Box::pin(blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }))
    }

    fn list(&self) -> BoxFuture<'_, io::Result<Vec<StoredTile>>> {
        let root = self.root.clone();
        Box::pin(blocking(move || scan_tiles(&root)))
    }
}

/// Walks `{root}/{z}/{x}/{y}.tile`, ignoring anything that does not parse
/// and deleting stale partial writes.
fn scan_tiles(root: &Path) -> io::Result<Vec<StoredTile>> {
    let mut tiles = Vec::new();
    let zoom_dirs = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(tiles),
        Err(e) => return Err(e),
    };

    for zoom_entry in zoom_dirs.flatten() {
        let Some(zoom) = parse_name::<u8>(&zoom_entry.file_name()) else {
            continue;
        };
        let Ok(x_dirs) = std::fs::read_dir(zoom_entry.path()) else {
            continue;
        };

        for x_entry in x_dirs.flatten() {
            let Some(x) = parse_name::<u32>(&x_entry.file_name()) else {
                continue;
            };
            let Ok(files) = std::fs::read_dir(x_entry.path()) else {
                continue;
            };

            for file in files.flatten() {
                let path = file.path();
                match path.extension().and_then(|e| e.to_str()) {
                    Some(TILE_EXTENSION) => {}
                    Some(PARTIAL_EXTENSION) => {
                        match std::fs::remove_file(&path) {
                            Ok(()) => debug!(path = %path.display(), "removed partial tile"),
                            Err(e) => {
                                warn!(path = %path.display(), error = %e, "cannot remove partial tile")
                            }
                        }
                        continue;
                    }
                    _ => continue,
                }
                let Some(y) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse::<u32>().ok())
                else {
                    continue;
                };
                let Ok(metadata) = file.metadata() else {
                    continue;
                };
                let fetched_at = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                tiles.push(StoredTile {
                    key: TileKey::new(zoom, x, y),
                    size: metadata.len(),
                    fetched_at,
                });
            }
        }
    }

    debug!(root = %root.display(), tiles = tiles.len(), "scanned tile store");
    Ok(tiles)
}

fn parse_name<T: std::str::FromStr>(name: &std::ffi::OsStr) -> Option<T> {
    name.to_str().and_then(|s| s.parse().ok())
}
