//! Control channel messages from the controlling application.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Administrative messages the worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ControlMessage {
    /// Activate the waiting worker now instead of when all clients have closed.
    #[serde(rename = "skipWaiting", alias = "force-activate")]
    ForceActivate,
}

#[derive(Deserialize)]
struct Envelope {
    action: ControlMessage,
}

impl ControlMessage {
    /// Parse a `{ "action": ... }` message. Anything unrecognised yields `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        match Envelope::deserialize(data) {
            Ok(envelope) => Some(envelope.action),
            Err(e) => {
                debug!(error = %e, "Ignoring control message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_skip_waiting() {
        assert_eq!(
            ControlMessage::parse(&json!({ "action": "skipWaiting" })),
            Some(ControlMessage::ForceActivate)
        );
        assert_eq!(
            ControlMessage::parse(&json!({ "action": "force-activate" })),
            Some(ControlMessage::ForceActivate)
        );
    }

    #[test]
    fn test_ignores_unknown_and_malformed() {
        assert_eq!(ControlMessage::parse(&json!({ "action": "reload" })), None);
        assert_eq!(ControlMessage::parse(&json!({ "verb": "skipWaiting" })), None);
        assert_eq!(ControlMessage::parse(&json!("skipWaiting")), None);
        assert_eq!(ControlMessage::parse(&Value::Null), None);
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        assert_eq!(
            ControlMessage::parse(&json!({ "action": "skipWaiting", "from": "banner" })),
            Some(ControlMessage::ForceActivate)
        );
    }
}
