//! Fetch interception.
//!
//! [`RequestPolicy`] decides which requests the worker handles at all.
//! [`FetchInterceptor`] applies cache-first, network-fallback,
//! offline-shell-fallback to the ones it does.

use std::sync::Arc;

use http::Method;
use offkit_net::{Fetcher, NetError, Request, Response};
use tracing::{debug, trace, warn};
use url::{Origin, Url};

use crate::cache::{Cache, CacheStorage, RequestKey, StoredResponse};
use crate::generation::CacheGeneration;
use crate::lifetime::PendingWork;

/// Path substring that keeps a request out of the worker's hands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    pattern: String,
}

impl UrlPattern {
    /// Match any path containing `substring`.
    pub fn contains(substring: &str) -> Self {
        Self {
            pattern: substring.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Check if a URL's path matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        url.path().contains(&self.pattern)
    }
}

/// Why a request was left to the network untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassThroughReason {
    /// Not a read request.
    NonReadMethod(Method),
    /// Path matched an exclusion pattern.
    Excluded(String),
    /// Different origin from the worker.
    CrossOrigin(String),
    /// This worker is not the active one yet.
    NotActive,
}

/// Result of classifying a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Intercept,
    PassThrough(PassThroughReason),
}

/// Request classification shared by every fetch.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    origin: Origin,
    exclusions: Vec<UrlPattern>,
}

impl RequestPolicy {
    /// Policy for `origin` with no exclusions.
    pub fn new(origin: &Url) -> Self {
        Self {
            origin: origin.origin(),
            exclusions: Vec::new(),
        }
    }

    /// Never intercept paths matching `pattern`.
    pub fn exclude(mut self, pattern: UrlPattern) -> Self {
        self.exclusions.push(pattern);
        self
    }

    /// Classify a request.
    pub fn classify(&self, request: &Request) -> Eligibility {
        if request.method != Method::GET {
            return Eligibility::PassThrough(PassThroughReason::NonReadMethod(
                request.method.clone(),
            ));
        }

        if let Some(pattern) = self.exclusions.iter().find(|p| p.matches(&request.url)) {
            return Eligibility::PassThrough(PassThroughReason::Excluded(pattern.pattern.clone()));
        }

        let origin = request.url.origin();
        if origin != self.origin {
            return Eligibility::PassThrough(PassThroughReason::CrossOrigin(
                origin.ascii_serialization(),
            ));
        }

        Eligibility::Intercept
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Cached shell root substituted for a failed navigation.
    ShellFallback,
}

/// A response produced by the interceptor.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub response: Response,
    pub source: ResponseSource,
}

/// Result of handling one fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted. The host performs the request itself.
    PassThrough(PassThroughReason),
    /// Respond with this.
    Respond(ServedResponse),
    /// The network failed and there is no substitute.
    Failed(NetError),
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond(served) => Some(&served.response),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Respond(served) => Some(served.source),
            _ => None,
        }
    }
}

/// Cache-first request router bound to one generation.
pub struct FetchInterceptor {
    policy: RequestPolicy,
    generation: CacheGeneration,
    shell_url: Url,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    pending: PendingWork,
}

impl FetchInterceptor {
    pub fn new(
        policy: RequestPolicy,
        generation: CacheGeneration,
        shell_url: Url,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        pending: PendingWork,
    ) -> Self {
        Self {
            policy,
            generation,
            shell_url,
            storage,
            fetcher,
            pending,
        }
    }

    pub fn policy(&self) -> &RequestPolicy {
        &self.policy
    }

    /// Handle one outbound request.
    pub async fn handle(&self, request: Request) -> FetchOutcome {
        if let Eligibility::PassThrough(reason) = self.policy.classify(&request) {
            debug!(url = %request.url, reason = ?reason, "Ignoring request");
            return FetchOutcome::PassThrough(reason);
        }

        let key = RequestKey::get(request.url.clone());
        // Lookups never create the store: a collected generation stays collected.
        let cache = match self.storage.get(self.generation.as_str()).await {
            Ok(Some(cache)) => Some(cache),
            Ok(None) => {
                debug!(generation = %self.generation, "Generation store is gone");
                None
            }
            Err(e) => {
                warn!(generation = %self.generation, error = %e, "Cache unavailable");
                None
            }
        };

        if let Some(hit) = lookup(cache.as_deref(), &key).await {
            debug!(url = %request.url, "Serving from cache");
            return FetchOutcome::Respond(ServedResponse {
                response: hit.to_response(),
                source: ResponseSource::Cache,
            });
        }

        let is_navigation = request.is_navigation();
        let url = request.url.clone();

        match self.fetcher.fetch(request).await {
            Ok(response) if response.ok() => {
                debug!(url = %url, "Fetched from network");
                if let Some(cache) = cache {
                    self.persist(cache, key, response.clone());
                }
                FetchOutcome::Respond(ServedResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Ok(response) => {
                debug!(url = %url, status = %response.status, "Not caching unsuccessful response");
                FetchOutcome::Respond(ServedResponse {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                if is_navigation {
                    let shell_key = RequestKey::get(self.shell_url.clone());
                    if let Some(shell) = lookup(cache.as_deref(), &shell_key).await {
                        debug!(url = %url, error = %e, "Offline navigation, serving shell");
                        return FetchOutcome::Respond(ServedResponse {
                            response: shell.to_response(),
                            source: ResponseSource::ShellFallback,
                        });
                    }
                }
                debug!(url = %url, error = %e, "Network failed with no substitute");
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Store `response` after the caller already has its own copy.
    fn persist(&self, cache: Arc<dyn Cache>, key: RequestKey, response: Response) {
        self.pending.wait_until("cache-put", async move {
            let url = key.url().clone();
            match cache.put(key, StoredResponse::from_response(&response)).await {
                Ok(()) => trace!(url = %url, "Cached asset"),
                Err(e) => warn!(url = %url, error = %e, "Failed to cache asset"),
            }
        });
    }
}

async fn lookup(cache: Option<&dyn Cache>, key: &RequestKey) -> Option<StoredResponse> {
    let cache = cache?;
    match cache.match_request(key).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(url = %key.url(), error = %e, "Cache lookup failed");
            None
        }
    }
}
