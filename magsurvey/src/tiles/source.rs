//! Tile sources.

use bytes::Bytes;
use futures::future::BoxFuture;

use super::{FetchError, TileCacheConfig};
use crate::coord::TileKey;

/// Something that produces tile bytes for a key.
///
/// Dyn-compatible so the manager can hold an `Arc<dyn TileSource>` and tests
/// can substitute a scripted source.
pub trait TileSource: Send + Sync {
    fn fetch(&self, key: TileKey) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}

/// Fetches tiles over HTTP from a `{z}/{x}/{y}` URL template.
pub struct HttpTileSource {
    client: reqwest::Client,
    url_template: String,
}

impl HttpTileSource {
    /// Creates a source from the cache configuration.
    ///
    /// The per-request timeout is enforced by the manager, not the client.
    pub fn new(config: &TileCacheConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                FetchError::NetworkUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            url_template: config.url_template.clone(),
        })
    }

    /// Builds the tile URL for a key.
    pub fn url_for(&self, key: TileKey) -> String {
        self.url_template
            .replace("{z}", &key.zoom.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
    }
}

impl TileSource for HttpTileSource {
    fn fetch(&self, key: TileKey) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        Box::pin(async move {
            let url = self.url_for(key);
            let response = self.client.get(&url).send().await.map_err(map_reqwest_error)?;

            if !response.status().is_success() {
                return Err(FetchError::Status(response.status().as_u16()));
            }

            response.bytes().await.map_err(map_reqwest_error)
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::NetworkUnavailable(format!("request timed out: {}", e))
    } else if let Some(status) = e.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::NetworkUnavailable(e.to_string())
    }
}
