//! WebSocket wire messages.
//!
//! Frames are JSON text of the form `{"type": ..., "payload": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, Result, VigilError};
use crate::events::EventInput;

// ═══════════════════════════════════════════════════════════════════════════════
// Inbound (Server -> Client)
// ═══════════════════════════════════════════════════════════════════════════════

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Published to the event bus
    ComplianceEvent(EventInput),
    MetricsUpdate(Value),
    Notification(Value),
    Insight(Value),
    /// Keep-alive; no action
    Heartbeat,
    /// A well-formed frame with a type we do not handle
    Unknown { kind: String },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl InboundMessage {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// `MalformedFrame` if the text is not a JSON object with a string
    /// `type`; `InvalidPayload` if a `compliance_event` payload is not an
    /// event.
    pub fn decode(text: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)
            .map_err(|e| VigilError::malformed_frame(e.to_string()).with_source(e))?;

        let message = match raw.kind.as_str() {
            "compliance_event" => {
                let input = serde_json::from_value(raw.payload).map_err(|e| {
                    VigilError::with_internal(
                        ErrorCode::InvalidPayload,
                        "Compliance event payload is not an event",
                        e.to_string(),
                    )
                    .with_source(e)
                })?;
                Self::ComplianceEvent(input)
            }
            "metrics_update" => Self::MetricsUpdate(raw.payload),
            "notification" => Self::Notification(raw.payload),
            "insight" => Self::Insight(raw.payload),
            "heartbeat" => Self::Heartbeat,
            _ => Self::Unknown { kind: raw.kind },
        };

        Ok(message)
    }

    /// Wire name of the frame type, `unknown` for unhandled types.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ComplianceEvent(_) => "compliance_event",
            Self::MetricsUpdate(_) => "metrics_update",
            Self::Notification(_) => "notification",
            Self::Insight(_) => "insight",
            Self::Heartbeat => "heartbeat",
            Self::Unknown { .. } => "unknown",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Outbound (Client -> Server)
// ═══════════════════════════════════════════════════════════════════════════════

/// Frames the client originates itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Heartbeat,
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;

    #[test]
    fn test_decode_compliance_event() {
        let text = json!({
            "type": "compliance_event",
            "payload": {
                "type": "gap_identified",
                "payload": { "control": "CC6.1" },
                "severity": "high"
            }
        })
        .to_string();

        match InboundMessage::decode(&text).unwrap() {
            InboundMessage::ComplianceEvent(input) => {
                assert_eq!(input.kind, EventKind::GapIdentified);
                assert_eq!(input.payload["control"], "CC6.1");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_routed_types() {
        let metrics = InboundMessage::decode(r#"{"type":"metrics_update","payload":{"score":91}}"#).unwrap();
        assert_eq!(metrics, InboundMessage::MetricsUpdate(json!({ "score": 91 })));

        let heartbeat = InboundMessage::decode(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(heartbeat, InboundMessage::Heartbeat);
        assert_eq!(heartbeat.type_name(), "heartbeat");

        let notification = InboundMessage::decode(r#"{"type":"notification","payload":"hi"}"#).unwrap();
        assert_eq!(notification.type_name(), "notification");
    }

    #[test]
    fn test_decode_unknown_type() {
        let message = InboundMessage::decode(r#"{"type":"presence","payload":{}}"#).unwrap();
        assert_eq!(message, InboundMessage::Unknown { kind: "presence".to_string() });
    }

    #[test]
    fn test_decode_malformed() {
        let err = InboundMessage::decode("{not json").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedFrame);

        let err = InboundMessage::decode(r#"{"payload":{}}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedFrame);
    }

    #[test]
    fn test_decode_bad_event_payload() {
        let err = InboundMessage::decode(r#"{"type":"compliance_event","payload":{"severity":"high"}}"#)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPayload);
    }

    #[test]
    fn test_encode_heartbeat() {
        assert_eq!(OutboundMessage::Heartbeat.encode().unwrap(), r#"{"type":"heartbeat"}"#);
    }
}
