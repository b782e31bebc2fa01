//! Cache storage.
//!
//! [`CacheStorage`] and [`Cache`] are the collaborator interfaces the worker
//! needs from its host. [`MemoryCacheStorage`] is the in-process
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use http::{HeaderMap, Method, StatusCode};
use offkit_net::Response;
use tokio::sync::RwLock;
use url::Url;

use crate::{Result, ServiceWorkerError};

/// Identity of a cached request. Only GET requests are storable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: Url,
}

impl RequestKey {
    /// Key for a GET of `url`.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Snapshot of a network response at the time it was cached.
#[derive(Debug, Clone)]
pub struct StoredResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cached_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Snapshot `response`.
    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.bytes(),
            cached_at: Utc::now(),
        }
    }

    /// Rebuild a response to hand to the caller.
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.url.clone(), self.status).with_body(self.body.clone());
        response.headers = self.headers.clone();
        response
    }
}

/// One namespace-scoped cache store.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Namespace of this store.
    fn name(&self) -> &str;

    /// Look up a stored response.
    async fn match_request(&self, key: &RequestKey) -> Result<Option<StoredResponse>>;

    /// Store a response, replacing any previous entry for `key`.
    async fn put(&self, key: RequestKey, response: StoredResponse) -> Result<()>;

    /// Store several responses at once.
    async fn put_all(&self, entries: Vec<(RequestKey, StoredResponse)>) -> Result<()>;

    /// Remove an entry.
    async fn delete(&self, key: &RequestKey) -> Result<bool>;

    /// All stored keys.
    async fn keys(&self) -> Result<Vec<RequestKey>>;
}

/// The set of namespaced cache stores available to the worker.
#[async_trait]
pub trait CacheStorage: Send + Sync + 'static {
    /// Open a cache, creating it if it does not exist.
    async fn open(&self, namespace: &str) -> Result<Arc<dyn Cache>>;

    /// An existing cache. Never creates one.
    async fn get(&self, namespace: &str) -> Result<Option<Arc<dyn Cache>>>;

    /// Check if a cache exists.
    async fn has(&self, namespace: &str) -> Result<bool>;

    /// Delete a cache and everything in it.
    async fn delete(&self, namespace: &str) -> Result<bool>;

    /// All cache names, sorted.
    async fn keys(&self) -> Result<Vec<String>>;
}

// ==================== Memory Cache ====================

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<HashMap<RequestKey, StoredResponse>>,
}

impl MemoryCache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<StoredResponse>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: RequestKey, response: StoredResponse) -> Result<()> {
        self.entries.write().await.insert(key, response);
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(RequestKey, StoredResponse)>) -> Result<()> {
        let mut map = self.entries.write().await;
        map.extend(entries);
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self.entries.read().await.keys().cloned().collect();
        keys.sort_by(|a, b| a.url.as_str().cmp(b.url.as_str()));
        Ok(keys)
    }
}

// ==================== Memory Cache Storage ====================

/// In-memory cache storage. Clones share the same stores.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<HashMap<String, Arc<MemoryCache>>>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, namespace: &str) -> Result<Arc<dyn Cache>> {
        if namespace.is_empty() {
            return Err(ServiceWorkerError::CacheError(
                "cache namespace must not be empty".to_string(),
            ));
        }
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(namespace)));
        Ok(Arc::clone(cache) as Arc<dyn Cache>)
    }

    async fn get(&self, namespace: &str) -> Result<Option<Arc<dyn Cache>>> {
        Ok(self
            .caches
            .read()
            .await
            .get(namespace)
            .map(|cache| Arc::clone(cache) as Arc<dyn Cache>))
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        Ok(self.caches.read().await.contains_key(namespace))
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        Ok(self.caches.write().await.remove(namespace).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
