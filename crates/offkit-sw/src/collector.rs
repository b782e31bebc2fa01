//! Generation collector.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use crate::cache::CacheStorage;
use crate::generation::CacheGeneration;
use crate::Result;

/// Deletes every cache namespace other than the current generation.
pub struct GenerationCollector {
    storage: Arc<dyn CacheStorage>,
}

impl GenerationCollector {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self { storage }
    }

    /// Delete all superseded namespaces and return their names.
    ///
    /// Every deletion is attempted; the first failure is reported afterwards.
    pub async fn collect(&self, current: &CacheGeneration) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| !current.matches(name))
            .collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut deleted = Vec::with_capacity(stale.len());
        let mut first_error = None;
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(true) => {
                    debug!(namespace = %name, "Deleted stale cache");
                    deleted.push(name);
                }
                // Already gone.
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(current = %current, deleted = deleted.len(), "Collected stale generations");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use chrono::{TimeZone, Utc};

    fn generation() -> CacheGeneration {
        CacheGeneration::new("5.2.3", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_collect_keeps_only_current() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let current = generation();
        for name in ["5.2.2@2023-12-01T00:00:00Z", current.as_str(), "unrelated"] {
            storage.open(name).await.unwrap();
        }

        let collector = GenerationCollector::new(storage.clone());
        let mut deleted = collector.collect(&current).await.unwrap();
        deleted.sort();

        assert_eq!(deleted, vec!["5.2.2@2023-12-01T00:00:00Z", "unrelated"]);
        assert_eq!(storage.keys().await.unwrap(), vec![current.as_str().to_string()]);
    }

    #[tokio::test]
    async fn test_collect_deletes_prefixed_superstring() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let current = generation();
        let superstring = format!("{}-stale", current.as_str());
        let prefix = current.as_str()[..5].to_string();
        storage.open(current.as_str()).await.unwrap();
        storage.open(&superstring).await.unwrap();
        storage.open(&prefix).await.unwrap();

        GenerationCollector::new(storage.clone())
            .collect(&current)
            .await
            .unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec![current.as_str().to_string()]);
    }

    #[tokio::test]
    async fn test_collect_with_nothing_stale() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let current = generation();
        storage.open(current.as_str()).await.unwrap();

        let deleted = GenerationCollector::new(storage).collect(&current).await.unwrap();
        assert!(deleted.is_empty());
    }
}
