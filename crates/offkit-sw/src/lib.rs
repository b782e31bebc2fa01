//! # Offkit Service Worker
//!
//! A background, event-driven caching proxy for one web application.
//!
//! ## Features
//!
//! - **Generations**: every deployment gets its own cache namespace
//! - **Precache**: the asset manifest is stored atomically on install
//! - **Collection**: superseded namespaces are deleted on activate
//! - **Fetch Interception**: cache-first, network fallback, offline shell
//! - **Notifications**: push payloads are shown, clicks open their target
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker (composition root, dispatch table)
//!     ├── WorkerConfig ── CacheGeneration, AssetManifest
//!     ├── Registration ── installing / waiting / active
//!     ├── PrecacheLoader      (install)
//!     ├── GenerationCollector (activate)
//!     ├── ControlMessage      (message)
//!     ├── FetchInterceptor    (fetch) ── RequestPolicy
//!     ├── NotificationRelay   (push, notificationclick)
//!     └── PendingWork         (lifetime extension)
//!
//! CacheStorage (collaborator)
//!     └── Cache
//!             └── RequestKey → StoredResponse
//! ```

use offkit_net::NetError;
use thiserror::Error;

pub mod cache;
pub mod collector;
pub mod config;
pub mod control;
pub mod generation;
pub mod intercept;
pub mod lifetime;
pub mod notification;
pub mod precache;
pub mod registration;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cache::{Cache, CacheStorage, MemoryCache, MemoryCacheStorage, RequestKey, StoredResponse};
pub use collector::GenerationCollector;
pub use config::{AssetManifest, WorkerConfig, WorkerSettings};
pub use control::ControlMessage;
pub use generation::CacheGeneration;
pub use intercept::{
    Eligibility, FetchInterceptor, FetchOutcome, PassThroughReason, RequestPolicy,
    ResponseSource, ServedResponse, UrlPattern,
};
pub use lifetime::PendingWork;
pub use notification::{
    ClickOutcome, MemoryNotificationHost, Notification, NotificationClickEvent, NotificationHost,
    NotificationId, NotificationPayload, NotificationRelay, PushEvent, PushOutcome,
};
pub use precache::PrecacheLoader;
pub use registration::{Registration, ServiceWorkerId, ServiceWorkerState, WorkerVersion};
pub use worker::{Collaborators, MessageOutcome, ServiceWorker, WorkerEvent, WorkerOutcome};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Precache of {url} failed: {reason}")]
    PrecacheFailed { url: String, reason: String },

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Notification error: {0}")]
    NotificationError(String),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
