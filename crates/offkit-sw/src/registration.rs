//! Worker registration and lifecycle state.
//!
//! A registration tracks up to three worker versions for one scope: the one
//! installing, the one installed and waiting, and the active one. Each
//! version is bound to exactly one cache generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::generation::CacheGeneration;
use crate::{Result, ServiceWorkerError};

/// Unique identifier for a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ServiceWorkerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceWorkerState {
    /// Initial state, not yet installing.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

/// One deployed worker version.
#[derive(Debug, Clone)]
pub struct WorkerVersion {
    pub id: ServiceWorkerId,
    pub generation: CacheGeneration,
    pub state: ServiceWorkerState,
    pub state_changed_at: Instant,
}

impl WorkerVersion {
    pub fn new(id: ServiceWorkerId, generation: CacheGeneration) -> Self {
        Self {
            id,
            generation,
            state: ServiceWorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    pub fn set_state(&mut self, state: ServiceWorkerState) {
        debug!(worker = self.id.raw(), from = ?self.state, to = ?state, "Worker state change");
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }
}

/// A worker registration for one scope.
#[derive(Debug)]
pub struct Registration {
    pub scope: Url,
    installing: Option<WorkerVersion>,
    waiting: Option<WorkerVersion>,
    active: Option<WorkerVersion>,
}

impl Registration {
    /// Create a new registration.
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            installing: None,
            waiting: None,
            active: None,
        }
    }

    pub fn installing(&self) -> Option<&WorkerVersion> {
        self.installing.as_ref()
    }

    pub fn waiting(&self) -> Option<&WorkerVersion> {
        self.waiting.as_ref()
    }

    pub fn active(&self) -> Option<&WorkerVersion> {
        self.active.as_ref()
    }

    /// Generation of the active worker, the only one reachable as current.
    pub fn current_generation(&self) -> Option<&CacheGeneration> {
        self.active.as_ref().map(|w| &w.generation)
    }

    /// Whether `id` is the activated worker.
    pub fn is_controlling(&self, id: ServiceWorkerId) -> bool {
        self.active.as_ref().is_some_and(|w| w.id == id && w.is_active())
    }

    pub fn is_waiting(&self, id: ServiceWorkerId) -> bool {
        self.waiting.as_ref().is_some_and(|w| w.id == id)
    }

    /// Start installing a new version. A previous installing version becomes redundant.
    pub fn begin_install(&mut self, id: ServiceWorkerId, generation: CacheGeneration) {
        if let Some(mut old) = self.installing.take() {
            old.set_state(ServiceWorkerState::Redundant);
        }
        let mut worker = WorkerVersion::new(id, generation);
        worker.set_state(ServiceWorkerState::Installing);
        self.installing = Some(worker);
    }

    /// Transition installing to waiting.
    pub fn install_complete(&mut self, id: ServiceWorkerId) -> Result<()> {
        let mut worker = self.take_installing(id)?;
        worker.set_state(ServiceWorkerState::Installed);
        if let Some(mut old) = self.waiting.replace(worker) {
            old.set_state(ServiceWorkerState::Redundant);
        }
        Ok(())
    }

    /// Discard a failed install. The active worker keeps control.
    pub fn install_failed(&mut self, id: ServiceWorkerId) -> Result<()> {
        let mut worker = self.take_installing(id)?;
        worker.set_state(ServiceWorkerState::Redundant);
        Ok(())
    }

    /// Promote the waiting worker to the active slot in the `Activating` state.
    /// The previously active worker becomes redundant.
    ///
    /// Returns `false` without changing anything if `id` already holds the
    /// active slot.
    pub fn begin_activation(&mut self, id: ServiceWorkerId) -> Result<bool> {
        if self.active.as_ref().is_some_and(|w| w.id == id) {
            return Ok(false);
        }
        if !self.is_waiting(id) {
            return Err(ServiceWorkerError::StateError(format!(
                "worker {} is not waiting",
                id.raw()
            )));
        }
        let Some(mut worker) = self.waiting.take() else {
            return Err(ServiceWorkerError::StateError("no waiting worker".to_string()));
        };
        worker.set_state(ServiceWorkerState::Activating);

        if let Some(mut old) = self.active.replace(worker) {
            old.set_state(ServiceWorkerState::Redundant);
        }
        Ok(true)
    }

    /// Finish activation. From here on the worker responds to fetches.
    pub fn finish_activation(&mut self, id: ServiceWorkerId) -> Result<()> {
        match self.active.as_mut() {
            Some(worker) if worker.id == id && worker.state == ServiceWorkerState::Activating => {
                worker.set_state(ServiceWorkerState::Activated);
                Ok(())
            }
            _ => Err(ServiceWorkerError::StateError(format!(
                "worker {} is not activating",
                id.raw()
            ))),
        }
    }

    fn take_installing(&mut self, id: ServiceWorkerId) -> Result<WorkerVersion> {
        match self.installing.take() {
            Some(worker) if worker.id == id => Ok(worker),
            other => {
                self.installing = other;
                Err(ServiceWorkerError::StateError(format!(
                    "worker {} is not installing",
                    id.raw()
                )))
            }
        }
    }
}
