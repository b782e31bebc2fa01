//! Push notifications.
//!
//! [`NotificationRelay`] turns push payloads into displayed notifications and
//! notification clicks into window opens. [`NotificationHost`] is the
//! platform side; [`MemoryNotificationHost`] keeps everything in process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::{Result, ServiceWorkerError};

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(u64);

impl NotificationId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded push payload: `{ title, data?: { uri? }, ...display options }`.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub title: String,
    /// The whole payload, passed through as display options.
    pub options: Map<String, Value>,
}

impl NotificationPayload {
    /// Decode a JSON payload. A `title` string is required.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ServiceWorkerError::InvalidPayload(e.to_string()))?;
        let Value::Object(options) = value else {
            return Err(ServiceWorkerError::InvalidPayload(
                "payload is not an object".to_string(),
            ));
        };
        let title = options
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ServiceWorkerError::InvalidPayload("missing title".to_string()))?
            .to_string();
        Ok(Self { title, options })
    }
}

/// A displayed notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: Map<String, Value>,
}

impl Notification {
    pub fn from_payload(payload: NotificationPayload) -> Self {
        Self {
            id: NotificationId::new(),
            title: payload.title,
            options: payload.options,
        }
    }

    /// The `data` option, if any.
    pub fn data(&self) -> Option<&Value> {
        self.options.get("data")
    }

    /// `data.uri`, when present and a string.
    pub fn target_uri(&self) -> Option<&str> {
        self.data()?.get("uri")?.as_str()
    }
}

/// A push event. `data` is absent when the push carried no body.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A click on a displayed notification.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    pub notification: Notification,
    /// Action button identifier. Accepted but not acted on.
    pub action: Option<String>,
}

/// What a push event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Shown(NotificationId),
    /// Push carried no body.
    NoPayload,
    /// Body was not a usable payload.
    Rejected(String),
}

/// What a click produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
    pub closed: NotificationId,
    pub opened: Option<Url>,
}

/// Platform notification and window primitives.
#[async_trait]
pub trait NotificationHost: Send + Sync + 'static {
    /// Display a notification.
    async fn show(&self, notification: Notification) -> Result<()>;

    /// Close a displayed notification.
    async fn close(&self, id: NotificationId) -> Result<()>;

    /// Open a window at `url`, or focus an existing one.
    async fn open_window(&self, url: Url) -> Result<()>;
}

/// Relays push and click events to the [`NotificationHost`].
pub struct NotificationRelay {
    host: Arc<dyn NotificationHost>,
    origin: Url,
}

impl NotificationRelay {
    pub fn new(host: Arc<dyn NotificationHost>, origin: Url) -> Self {
        Self { host, origin }
    }

    /// Show a notification for `event`, if it carries a valid payload.
    pub async fn handle_push(&self, event: PushEvent) -> Result<PushOutcome> {
        let Some(data) = event.data else {
            debug!("Push without payload");
            return Ok(PushOutcome::NoPayload);
        };

        let payload = match NotificationPayload::parse(&data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping push payload");
                return Ok(PushOutcome::Rejected(e.to_string()));
            }
        };

        let notification = Notification::from_payload(payload);
        let id = notification.id;
        info!(title = %notification.title, "Showing notification");
        self.host.show(notification).await?;
        Ok(PushOutcome::Shown(id))
    }

    /// Close the clicked notification and open its target, if any.
    pub async fn handle_click(&self, event: NotificationClickEvent) -> Result<ClickOutcome> {
        let notification = event.notification;
        self.host.close(notification.id).await?;

        if let Some(action) = event.action.as_deref() {
            debug!(action, "Notification action clicked");
        }

        let target = match notification.target_uri() {
            Some(uri) => match self.origin.join(uri) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(uri, error = %e, "Ignoring unusable notification uri");
                    None
                }
            },
            None => None,
        };

        if let Some(ref url) = target {
            self.host.open_window(url.clone()).await?;
        }

        Ok(ClickOutcome {
            closed: notification.id,
            opened: target,
        })
    }
}

// ==================== Memory Host ====================

/// A window client opened or focused by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub focused: bool,
}

#[derive(Debug, Default)]
struct HostState {
    displayed: Vec<Notification>,
    closed: Vec<NotificationId>,
    clients: HashMap<String, Client>,
    window_requests: Vec<Url>,
}

/// In-process [`NotificationHost`] that records what it was asked to do.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotificationHost {
    state: Arc<RwLock<HostState>>,
}

impl MemoryNotificationHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently displayed.
    pub async fn displayed(&self) -> Vec<Notification> {
        self.state.read().await.displayed.clone()
    }

    /// Notifications closed so far.
    pub async fn closed(&self) -> Vec<NotificationId> {
        self.state.read().await.closed.clone()
    }

    /// Every `open_window` call, in order.
    pub async fn window_requests(&self) -> Vec<Url> {
        self.state.read().await.window_requests.clone()
    }

    /// Window clients, sorted by id.
    pub async fn clients(&self) -> Vec<Client> {
        let mut clients: Vec<Client> = self.state.read().await.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));
        clients
    }
}

#[async_trait]
impl NotificationHost for MemoryNotificationHost {
    async fn show(&self, notification: Notification) -> Result<()> {
        self.state.write().await.displayed.push(notification);
        Ok(())
    }

    async fn close(&self, id: NotificationId) -> Result<()> {
        let mut state = self.state.write().await;
        state.displayed.retain(|n| n.id != id);
        state.closed.push(id);
        Ok(())
    }

    async fn open_window(&self, url: Url) -> Result<()> {
        let mut state = self.state.write().await;
        state.window_requests.push(url.clone());

        for client in state.clients.values_mut() {
            client.focused = client.url == url;
        }
        if state.clients.values().any(|c| c.url == url) {
            return Ok(());
        }

        let id = format!("client-{}", state.clients.len() + 1);
        state.clients.insert(
            id.clone(),
            Client {
                id,
                url,
                focused: true,
            },
        );
        Ok(())
    }
}
