//! JSON-line event protocol between the embedding process and the worker.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method};
use offkit_net::{Request, RequestMode, Url};
use offkit_sw::{
    FetchOutcome, MemoryNotificationHost, MessageOutcome, NotificationClickEvent,
    PassThroughReason, PushEvent, PushOutcome, ResponseSource, WorkerEvent, WorkerOutcome,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// One input line.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum HostEvent {
    Install,
    Activate,
    Message {
        #[serde(default)]
        data: Value,
    },
    Fetch {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        navigate: bool,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<String>,
    },
    Push {
        #[serde(default)]
        data: Option<Value>,
    },
    #[serde(rename = "notificationclick")]
    NotificationClick {
        notification: u64,
        #[serde(default)]
        action: Option<String>,
    },
}

impl HostEvent {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("malformed event line")
    }

    /// Build the worker event. Relative fetch URLs resolve against `origin`;
    /// clicks refer to a notification currently shown by `host`.
    pub async fn into_worker_event(
        self,
        origin: &Url,
        host: &MemoryNotificationHost,
    ) -> Result<WorkerEvent> {
        let event = match self {
            HostEvent::Install => WorkerEvent::Install,
            HostEvent::Activate => WorkerEvent::Activate,
            HostEvent::Message { data } => WorkerEvent::Message(data),
            HostEvent::Fetch {
                url,
                method,
                navigate,
                headers,
                body,
            } => {
                let url = origin
                    .join(&url)
                    .with_context(|| format!("invalid fetch url '{url}'"))?;
                let mut request = Request::get(url);
                if let Some(method) = method {
                    request.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                        .with_context(|| format!("invalid method '{method}'"))?;
                }
                for (name, value) in &headers {
                    request = request.header(
                        HeaderName::from_bytes(name.as_bytes())
                            .with_context(|| format!("invalid header name '{name}'"))?,
                        HeaderValue::from_str(value)
                            .with_context(|| format!("invalid value for header '{name}'"))?,
                    );
                }
                request.body = body.map(Bytes::from);
                if navigate {
                    request = request.mode(RequestMode::Navigate);
                }
                WorkerEvent::Fetch(request)
            }
            HostEvent::Push { data } => WorkerEvent::Push(match data {
                None | Some(Value::Null) => PushEvent::empty(),
                Some(Value::String(text)) => PushEvent::new(text),
                Some(other) => PushEvent::new(serde_json::to_vec(&other)?),
            }),
            HostEvent::NotificationClick {
                notification,
                action,
            } => {
                let notification = host
                    .displayed()
                    .await
                    .into_iter()
                    .find(|n| n.id.raw() == notification)
                    .ok_or_else(|| anyhow!("notification {notification} is not displayed"))?;
                WorkerEvent::NotificationClick(NotificationClickEvent {
                    notification,
                    action,
                })
            }
        };
        Ok(event)
    }
}

/// Render one outcome as an output line.
pub fn render(outcome: &WorkerOutcome) -> Value {
    match outcome {
        WorkerOutcome::Installed {
            precached,
            activated,
        } => json!({ "outcome": "installed", "precached": precached, "activated": activated }),
        WorkerOutcome::Activated { deleted } => json!({ "outcome": "activated", "deleted": deleted }),
        WorkerOutcome::Message(message) => {
            let result = match message {
                MessageOutcome::Activated => "activated",
                MessageOutcome::Deferred => "deferred",
                MessageOutcome::Ignored => "ignored",
            };
            json!({ "outcome": "message", "result": result })
        }
        WorkerOutcome::Fetch(fetch) => render_fetch(fetch),
        WorkerOutcome::Push(PushOutcome::Shown(id)) => {
            json!({ "outcome": "shown", "notification": id.raw() })
        }
        WorkerOutcome::Push(PushOutcome::NoPayload) => json!({ "outcome": "no-payload" }),
        WorkerOutcome::Push(PushOutcome::Rejected(reason)) => {
            json!({ "outcome": "rejected", "reason": reason })
        }
        WorkerOutcome::NotificationClick(click) => json!({
            "outcome": "clicked",
            "closed": click.closed.raw(),
            "opened": click.opened.as_ref().map(Url::as_str),
        }),
    }
}

fn render_fetch(outcome: &FetchOutcome) -> Value {
    match outcome {
        FetchOutcome::PassThrough(reason) => {
            let reason = match reason {
                PassThroughReason::NonReadMethod(method) => format!("method {method}"),
                PassThroughReason::Excluded(pattern) => format!("excluded by {pattern}"),
                PassThroughReason::CrossOrigin(origin) => format!("cross-origin {origin}"),
                PassThroughReason::NotActive => "worker not active".to_string(),
            };
            json!({ "outcome": "passthrough", "reason": reason })
        }
        FetchOutcome::Respond(served) => {
            let source = match served.source {
                ResponseSource::Cache => "cache",
                ResponseSource::Network => "network",
                ResponseSource::ShellFallback => "shell",
            };
            json!({
                "outcome": "respond",
                "source": source,
                "url": served.response.url.as_str(),
                "status": served.response.status.as_u16(),
                "body": String::from_utf8_lossy(&served.response.bytes()),
            })
        }
        FetchOutcome::Failed(e) => json!({ "outcome": "failed", "error": e.to_string() }),
    }
}

/// Render a handler or protocol error as an output line.
pub fn render_error(error: &anyhow::Error) -> Value {
    json!({ "outcome": "error", "error": format!("{error:#}") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use offkit_sw::{Notification, NotificationHost, NotificationPayload};

    fn origin() -> Url {
        Url::parse("https://app.example.com/").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_line_resolves_relative_url() {
        let event = HostEvent::parse(r#"{"event":"fetch","url":"/shows","navigate":true}"#).unwrap();
        let event = event
            .into_worker_event(&origin(), &MemoryNotificationHost::new())
            .await
            .unwrap();

        match event {
            WorkerEvent::Fetch(request) => {
                assert_eq!(request.url.as_str(), "https://app.example.com/shows");
                assert_eq!(request.method, Method::GET);
                assert!(request.is_navigation());
            }
            other => panic!("Expected fetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_line_with_method_and_body() {
        let event =
            HostEvent::parse(r#"{"event":"fetch","url":"/api/cart","method":"post","body":"x"}"#)
                .unwrap();
        let event = event
            .into_worker_event(&origin(), &MemoryNotificationHost::new())
            .await
            .unwrap();

        match event {
            WorkerEvent::Fetch(request) => {
                assert_eq!(request.method, Method::POST);
                assert_eq!(request.body, Some(Bytes::from("x")));
            }
            other => panic!("Expected fetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_line_headers() {
        let line = r#"{"event":"fetch","url":"/feed","headers":{"accept":"application/json"}}"#;
        let event = HostEvent::parse(line)
            .unwrap()
            .into_worker_event(&origin(), &MemoryNotificationHost::new())
            .await
            .unwrap();

        match event {
            WorkerEvent::Fetch(request) => {
                assert_eq!(request.headers.get("accept").unwrap(), "application/json");
            }
            other => panic!("Expected fetch, got {other:?}"),
        }

        let bad = HostEvent::parse(r#"{"event":"fetch","url":"/","headers":{"bad name":"x"}}"#)
            .unwrap()
            .into_worker_event(&origin(), &MemoryNotificationHost::new())
            .await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_push_line_object_payload() {
        let event = HostEvent::parse(r#"{"event":"push","data":{"title":"Hi"}}"#).unwrap();
        let event = event
            .into_worker_event(&origin(), &MemoryNotificationHost::new())
            .await
            .unwrap();

        match event {
            WorkerEvent::Push(push) => {
                let data = push.data.unwrap();
                let value: Value = serde_json::from_slice(&data).unwrap();
                assert_eq!(value, json!({ "title": "Hi" }));
            }
            other => panic!("Expected push, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_click_line_requires_displayed_notification() {
        let host = MemoryNotificationHost::new();
        let payload = NotificationPayload::parse(br#"{"title":"Doors open"}"#).unwrap();
        let notification = Notification::from_payload(payload);
        let id = notification.id.raw();
        host.show(notification).await.unwrap();

        let line = format!(r#"{{"event":"notificationclick","notification":{id}}}"#);
        let event = HostEvent::parse(&line)
            .unwrap()
            .into_worker_event(&origin(), &host)
            .await
            .unwrap();
        assert!(matches!(event, WorkerEvent::NotificationClick(_)));

        let missing = HostEvent::parse(r#"{"event":"notificationclick","notification":999999}"#)
            .unwrap()
            .into_worker_event(&origin(), &host)
            .await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(HostEvent::parse(r#"{"event":"sync"}"#).is_err());
        assert!(HostEvent::parse("not json").is_err());
    }

    #[test]
    fn test_render_message_outcome() {
        let line = render(&WorkerOutcome::Message(MessageOutcome::Ignored));
        assert_eq!(line, json!({ "outcome": "message", "result": "ignored" }));
    }

    #[test]
    fn test_render_passthrough() {
        let line = render(&WorkerOutcome::Fetch(FetchOutcome::PassThrough(
            PassThroughReason::NotActive,
        )));
        assert_eq!(line["outcome"], "passthrough");
        assert_eq!(line["reason"], "worker not active");
    }
}
