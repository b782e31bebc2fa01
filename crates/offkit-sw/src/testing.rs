//! Test doubles for the worker's collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::HashMap;
use http::StatusCode;
use offkit_net::{Fetcher, NetError, Request, Response};
use url::Url;

use crate::cache::{Cache, CacheStorage, MemoryCacheStorage, RequestKey, StoredResponse};
use crate::{Result, ServiceWorkerError};

/// A [`Fetcher`] serving canned responses. Unknown URLs fail like an unreachable network.
#[derive(Debug, Default)]
pub struct StubFetcher {
    routes: Mutex<HashMap<Url, (StatusCode, String)>>,
    calls: Mutex<Vec<Url>>,
    offline: AtomicBool,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` for `url`.
    pub fn serve(&self, url: &str, status: u16, body: &str) {
        let url = Url::parse(url).expect("stub url");
        let status = StatusCode::from_u16(status).expect("stub status");
        self.routes
            .lock()
            .expect("routes lock")
            .insert(url, (status, body.to_string()));
    }

    /// Make every request fail.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// URLs requested so far, in order.
    pub fn calls(&self) -> Vec<Url> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: Request) -> std::result::Result<Response, NetError> {
        self.calls.lock().expect("calls lock").push(request.url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("network offline".to_string()));
        }

        let route = self.routes.lock().expect("routes lock").get(&request.url).cloned();
        match route {
            Some((status, body)) => Ok(Response::new(request.url, status).with_body(body)),
            None => Err(NetError::RequestFailed(format!("unreachable: {}", request.url))),
        }
    }
}

/// Cache storage whose stores accept reads but reject every write.
#[derive(Debug, Clone, Default)]
pub struct RejectingCacheStorage {
    inner: MemoryCacheStorage,
}

impl RejectingCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

struct RejectingCache {
    inner: Arc<dyn Cache>,
}

#[async_trait]
impl Cache for RejectingCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn match_request(&self, key: &RequestKey) -> Result<Option<StoredResponse>> {
        self.inner.match_request(key).await
    }

    async fn put(&self, _key: RequestKey, _response: StoredResponse) -> Result<()> {
        Err(ServiceWorkerError::CacheError("quota exceeded".to_string()))
    }

    async fn put_all(&self, _entries: Vec<(RequestKey, StoredResponse)>) -> Result<()> {
        Err(ServiceWorkerError::CacheError("quota exceeded".to_string()))
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.inner.keys().await
    }
}

#[async_trait]
impl CacheStorage for RejectingCacheStorage {
    async fn open(&self, namespace: &str) -> Result<Arc<dyn Cache>> {
        let inner = self.inner.open(namespace).await?;
        Ok(Arc::new(RejectingCache { inner }))
    }

    async fn get(&self, namespace: &str) -> Result<Option<Arc<dyn Cache>>> {
        let inner = self.inner.get(namespace).await?;
        Ok(inner.map(|inner| Arc::new(RejectingCache { inner }) as Arc<dyn Cache>))
    }

    async fn has(&self, namespace: &str) -> Result<bool> {
        self.inner.has(namespace).await
    }

    async fn delete(&self, namespace: &str) -> Result<bool> {
        self.inner.delete(namespace).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}
