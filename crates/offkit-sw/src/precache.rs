//! Precache loader.
//!
//! Populates a fresh generation's store with every manifest entry, all or
//! nothing.

use std::sync::Arc;

use futures::future::try_join_all;
use offkit_net::{Fetcher, Request};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheStorage, RequestKey, StoredResponse};
use crate::config::AssetManifest;
use crate::generation::CacheGeneration;
use crate::{Result, ServiceWorkerError};

/// Fetches and stores the asset manifest during install.
pub struct PrecacheLoader {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
}

impl PrecacheLoader {
    pub fn new(fetcher: Arc<dyn Fetcher>, storage: Arc<dyn CacheStorage>) -> Self {
        Self { fetcher, storage }
    }

    /// Store every manifest URL under `generation`, returning how many were stored.
    ///
    /// Nothing is written unless every URL fetched with an OK status. On
    /// failure the generation's store is deleted again.
    pub async fn load(&self, generation: &CacheGeneration, manifest: &AssetManifest) -> Result<usize> {
        let cache = self.storage.open(generation.as_str()).await?;

        let fetched = try_join_all(manifest.iter().map(|url| self.fetch_one(url))).await;

        let outcome = match fetched {
            Ok(entries) => {
                let count = entries.len();
                cache.put_all(entries).await.map(|()| count)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(count) => {
                info!(generation = %generation, count, "Precached assets");
                Ok(count)
            }
            Err(e) => {
                error!(generation = %generation, error = %e, "Precache failed");
                if let Err(cleanup) = self.storage.delete(generation.as_str()).await {
                    warn!(generation = %generation, error = %cleanup, "Failed to discard partial cache");
                }
                Err(e)
            }
        }
    }

    async fn fetch_one(&self, url: &Url) -> Result<(RequestKey, StoredResponse)> {
        let response = self
            .fetcher
            .fetch(Request::get(url.clone()))
            .await
            .map_err(|e| ServiceWorkerError::PrecacheFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.ok() {
            return Err(ServiceWorkerError::PrecacheFailed {
                url: url.to_string(),
                reason: format!("status {}", response.status),
            });
        }

        debug!(url = %url, "Precache fetched");
        Ok((RequestKey::get(url.clone()), StoredResponse::from_response(&response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::testing::StubFetcher;
    use chrono::{TimeZone, Utc};

    fn generation() -> CacheGeneration {
        CacheGeneration::new("1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn manifest(paths: &[&str]) -> AssetManifest {
        let origin = Url::parse("https://app.example.com/").unwrap();
        AssetManifest::resolve(&origin, paths.iter().copied()).unwrap()
    }

    #[tokio::test]
    async fn test_precache_stores_all() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.serve("https://app.example.com/", 200, "<html>");
        fetcher.serve("https://app.example.com/bundle.js", 200, "js");
        let storage = Arc::new(MemoryCacheStorage::new());
        let loader = PrecacheLoader::new(fetcher.clone(), storage.clone());

        let count = loader.load(&generation(), &manifest(&["/", "/bundle.js"])).await.unwrap();
        assert_eq!(count, 2);

        let cache = storage.open(generation().as_str()).await.unwrap();
        let key = RequestKey::get(Url::parse("https://app.example.com/bundle.js").unwrap());
        assert!(cache.match_request(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_precache_is_all_or_nothing() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.serve("https://app.example.com/", 200, "<html>");
        fetcher.serve("https://app.example.com/a.js", 200, "a");
        // /b.js is unreachable
        let storage = Arc::new(MemoryCacheStorage::new());
        let loader = PrecacheLoader::new(fetcher, storage.clone());

        let result = loader.load(&generation(), &manifest(&["/", "/a.js", "/b.js"])).await;

        assert!(matches!(result, Err(ServiceWorkerError::PrecacheFailed { .. })));
        assert!(!storage.has(generation().as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_precache_rejects_non_ok_status() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.serve("https://app.example.com/", 200, "<html>");
        fetcher.serve("https://app.example.com/gone.svg", 404, "");
        let storage = Arc::new(MemoryCacheStorage::new());
        let loader = PrecacheLoader::new(fetcher, storage.clone());

        let result = loader.load(&generation(), &manifest(&["/", "/gone.svg"])).await;

        match result {
            Err(ServiceWorkerError::PrecacheFailed { url, .. }) => {
                assert_eq!(url, "https://app.example.com/gone.svg");
            }
            other => panic!("Expected precache failure, got {other:?}"),
        }
        assert!(storage.keys().await.unwrap().is_empty());
    }
}
