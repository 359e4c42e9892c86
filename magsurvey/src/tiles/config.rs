//! Configuration for the tile cache.

use std::path::PathBuf;
use std::time::Duration;

/// OpenStreetMap standard raster tiles.
pub const DEFAULT_TILE_URL_TEMPLATE: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Configuration for the tile cache.
#[derive(Debug, Clone)]
pub struct TileCacheConfig {
    /// Directory holding `{z}/{x}/{y}.tile` files.
    ///
    /// `None` keeps tiles in memory only.
    pub directory: Option<PathBuf>,

    /// Tile URL with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,

    /// Byte budget before least-recently-fetched tiles are evicted.
    pub max_size_bytes: u64,

    /// Maximum concurrent tile fetches.
    pub concurrency: usize,

    /// Timeout for a single tile fetch.
    pub timeout: Duration,

    /// User-Agent sent to the tile server. OSM rejects requests without one.
    pub user_agent: String,
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            url_template: DEFAULT_TILE_URL_TEMPLATE.to_string(),
            max_size_bytes: 512 * 1024 * 1024,
            concurrency: 4,
            timeout: Duration::from_secs(30),
            user_agent: concat!("magsurvey/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TileCacheConfig {
    /// Create a configuration storing tiles under `directory`.
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory: Some(directory),
            ..Default::default()
        }
    }

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the fetch concurrency (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
