//! The worker composition root and its event dispatch table.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use offkit_net::{Fetcher, Request};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cache::CacheStorage;
use crate::collector::GenerationCollector;
use crate::config::WorkerConfig;
use crate::control::ControlMessage;
use crate::generation::CacheGeneration;
use crate::intercept::{FetchInterceptor, FetchOutcome, PassThroughReason, RequestPolicy, UrlPattern};
use crate::lifetime::PendingWork;
use crate::notification::{
    ClickOutcome, NotificationClickEvent, NotificationHost, NotificationRelay, PushEvent,
    PushOutcome,
};
use crate::precache::PrecacheLoader;
use crate::registration::{Registration, ServiceWorkerId, ServiceWorkerState};
use crate::Result;

/// Platform collaborators the worker is built over.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub notifications: Arc<dyn NotificationHost>,
}

/// Events delivered by the host.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Message(Value),
    Fetch(Request),
    Push(PushEvent),
    NotificationClick(NotificationClickEvent),
}

impl WorkerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Message(_) => "message",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick(_) => "notificationclick",
        }
    }
}

/// Result of a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Skip-waiting took effect: the worker is now active.
    Activated,
    /// Skip-waiting recorded; activation follows as soon as install completes.
    Deferred,
    Ignored,
}

/// Result of dispatching one event.
#[derive(Debug)]
pub enum WorkerOutcome {
    Installed { precached: usize, activated: bool },
    Activated { deleted: Vec<String> },
    Message(MessageOutcome),
    Fetch(FetchOutcome),
    Push(PushOutcome),
    NotificationClick(ClickOutcome),
}

/// One worker version, bound to one generation for its lifetime.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    config: Arc<WorkerConfig>,
    registration: Arc<RwLock<Registration>>,
    precache: PrecacheLoader,
    collector: GenerationCollector,
    interceptor: FetchInterceptor,
    relay: NotificationRelay,
    pending: PendingWork,
    skip_waiting: AtomicBool,
}

impl ServiceWorker {
    /// Wire a worker over `collaborators`, sharing `registration` with other versions.
    pub fn new(
        config: WorkerConfig,
        collaborators: Collaborators,
        registration: Arc<RwLock<Registration>>,
    ) -> Self {
        let config = Arc::new(config);
        let pending = PendingWork::new();
        let policy =
            RequestPolicy::new(config.origin()).exclude(UrlPattern::contains(config.api_marker()));

        let interceptor = FetchInterceptor::new(
            policy,
            config.generation().clone(),
            config.shell_url().clone(),
            Arc::clone(&collaborators.storage),
            Arc::clone(&collaborators.fetcher),
            pending.clone(),
        );

        Self {
            id: ServiceWorkerId::new(),
            precache: PrecacheLoader::new(
                Arc::clone(&collaborators.fetcher),
                Arc::clone(&collaborators.storage),
            ),
            collector: GenerationCollector::new(Arc::clone(&collaborators.storage)),
            relay: NotificationRelay::new(collaborators.notifications, config.origin().clone()),
            interceptor,
            config,
            registration,
            pending,
            skip_waiting: AtomicBool::new(false),
        }
    }

    /// A worker with its own fresh registration scoped to the configured origin.
    pub fn standalone(config: WorkerConfig, collaborators: Collaborators) -> Self {
        let registration = Registration::new(config.origin().clone());
        Self::new(config, collaborators, Arc::new(RwLock::new(registration)))
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn generation(&self) -> &CacheGeneration {
        self.config.generation()
    }

    pub fn registration(&self) -> Arc<RwLock<Registration>> {
        Arc::clone(&self.registration)
    }

    /// This version's lifecycle state as recorded by the registration.
    pub async fn state(&self) -> ServiceWorkerState {
        let registration = self.registration.read().await;
        let state = [registration.active(), registration.waiting(), registration.installing()]
            .into_iter()
            .flatten()
            .find(|w| w.id == self.id)
            .map(|w| w.state)
            .unwrap_or(ServiceWorkerState::Redundant);
        state
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<WorkerOutcome> {
        let span = info_span!("event", kind = event.kind(), worker = self.id.raw());
        async move {
            match event {
                WorkerEvent::Install => self.install().await,
                WorkerEvent::Activate => self
                    .activate()
                    .await
                    .map(|deleted| WorkerOutcome::Activated { deleted }),
                WorkerEvent::Message(data) => {
                    self.handle_message(&data).await.map(WorkerOutcome::Message)
                }
                WorkerEvent::Fetch(request) => Ok(WorkerOutcome::Fetch(self.handle_fetch(request).await)),
                WorkerEvent::Push(push) => self.handle_push(push).await.map(WorkerOutcome::Push),
                WorkerEvent::NotificationClick(click) => self
                    .handle_notification_click(click)
                    .await
                    .map(WorkerOutcome::NotificationClick),
            }
        }
        .instrument(span)
        .await
    }

    /// Install: precache the manifest into this worker's generation.
    ///
    /// On failure the version becomes redundant and the active worker keeps control.
    pub async fn install(&self) -> Result<WorkerOutcome> {
        info!(generation = %self.generation(), "Install event");
        self.registration
            .write()
            .await
            .begin_install(self.id, self.generation().clone());

        let precached = match self.precache.load(self.generation(), self.config.manifest()).await {
            Ok(count) => count,
            Err(e) => {
                error!(generation = %self.generation(), error = %e, "Install failed");
                self.registration.write().await.install_failed(self.id)?;
                return Err(e);
            }
        };

        // The skip-waiting flag is read under the same lock `skip_waiting` sets it
        // under, so exactly one of the two paths promotes this version.
        let activated = {
            let mut registration = self.registration.write().await;
            registration.install_complete(self.id)?;
            self.skip_waiting.load(Ordering::SeqCst) && registration.begin_activation(self.id)?
        };
        if activated {
            self.complete_activation().await?;
        }

        Ok(WorkerOutcome::Installed {
            precached,
            activated,
        })
    }

    /// Activate: take control and delete every other generation's cache.
    ///
    /// Activating a version that is already active is a no-op.
    pub async fn activate(&self) -> Result<Vec<String>> {
        info!(generation = %self.generation(), "Activate event");
        if !self.registration.write().await.begin_activation(self.id)? {
            debug!("Already active");
            return Ok(Vec::new());
        }
        self.complete_activation().await
    }

    async fn complete_activation(&self) -> Result<Vec<String>> {
        let deleted = match self.collector.collect(self.generation()).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "Cache cleanup incomplete");
                Vec::new()
            }
        };

        self.registration.write().await.finish_activation(self.id)?;
        Ok(deleted)
    }

    /// The immediate-activation primitive.
    pub async fn skip_waiting(&self) -> Result<MessageOutcome> {
        let promoted = {
            let mut registration = self.registration.write().await;
            if registration.active().is_some_and(|w| w.id == self.id) {
                debug!("Already active, nothing to skip");
                return Ok(MessageOutcome::Ignored);
            }
            self.skip_waiting.store(true, Ordering::SeqCst);
            if !registration.is_waiting(self.id) {
                debug!("Skip waiting recorded before install completed");
                return Ok(MessageOutcome::Deferred);
            }
            registration.begin_activation(self.id)?
        };

        if promoted {
            self.complete_activation().await?;
        }
        Ok(MessageOutcome::Activated)
    }

    /// Control channel.
    pub async fn handle_message(&self, data: &Value) -> Result<MessageOutcome> {
        match ControlMessage::parse(data) {
            Some(ControlMessage::ForceActivate) => self.skip_waiting().await,
            None => Ok(MessageOutcome::Ignored),
        }
    }

    /// Fetch interception. Until this worker is active, requests pass through.
    pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
        if !self.registration.read().await.is_controlling(self.id) {
            debug!(url = %request.url, "Worker not active, passing through");
            return FetchOutcome::PassThrough(PassThroughReason::NotActive);
        }
        self.interceptor.handle(request).await
    }

    pub async fn handle_push(&self, event: PushEvent) -> Result<PushOutcome> {
        self.relay.handle_push(event).await
    }

    pub async fn handle_notification_click(
        &self,
        event: NotificationClickEvent,
    ) -> Result<ClickOutcome> {
        self.relay.handle_click(event).await
    }

    /// Wait for all lifetime-extended work.
    pub async fn settle(&self) {
        self.pending.settle().await;
    }
}
