//! Wire protocol between the control plane and agents.
//!
//! Text frames over the websocket session, JSON payloads, dispatched by a
//! `type` field. The first client frame after the handshake is an
//! [`AgentRegistration`]; everything after is one of the frames below.
//! Unknown frame types are ignored by both sides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::event::Event;
use crate::model::status::StatusUpdate;

/// Frame type discriminators
pub const FRAME_TYPE_EVENT: &str = "event";
pub const FRAME_TYPE_HEARTBEAT: &str = "heartbeat";
pub const FRAME_TYPE_STATUS_UPDATE: &str = "status_update";

/// Server to client: an event for the agent to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            frame_type: FRAME_TYPE_EVENT.to_string(),
            event,
        }
    }
}

/// Client to server: liveness signal with optional metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metrics: HashMap<String, Value>,
}

impl HeartbeatFrame {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            frame_type: FRAME_TYPE_HEARTBEAT.to_string(),
            timestamp: now,
            metrics: HashMap::new(),
        }
    }
}

/// Server reply to the registration frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegistrationReply {
    /// Successful registration
    pub fn registered(agent_id: &str) -> Self {
        Self {
            status: Some("registered".to_string()),
            message: Some(format!("Agent {agent_id} registered successfully")),
            error: None,
        }
    }

    /// Rejected registration; the server closes after sending this
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: None,
            message: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.status.as_deref() == Some("registered")
    }
}

/// A parsed inbound frame on the control-plane side
#[derive(Debug, Clone)]
pub enum AgentFrame {
    Heartbeat(HeartbeatFrame),
    StatusUpdate(StatusUpdate),
    /// A frame whose `type` is missing or not handled; carries the raw
    /// discriminator for logging
    Unknown(String),
}

/// Parse one inbound text frame from an agent.
///
/// Returns `Unknown` for unhandled discriminators; only malformed JSON or
/// a malformed body for a known type is an error.
pub fn parse_agent_frame(text: &str) -> Result<AgentFrame> {
    let value: Value = serde_json::from_str(text)?;
    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match frame_type.as_str() {
        FRAME_TYPE_HEARTBEAT => Ok(AgentFrame::Heartbeat(serde_json::from_value(value)?)),
        FRAME_TYPE_STATUS_UPDATE => Ok(AgentFrame::StatusUpdate(serde_json::from_value(value)?)),
        _ => Ok(AgentFrame::Unknown(frame_type)),
    }
}

/// Encode an event envelope for delivery to an agent
pub fn encode_event(event: &Event) -> Result<Vec<u8>> {
    let msg = EventMessage {
        frame_type: FRAME_TYPE_EVENT.to_string(),
        event: event.clone(),
    };
    Ok(serde_json::to_vec(&msg)?)
}

/// Encode a heartbeat frame
pub fn encode_heartbeat(now: DateTime<Utc>) -> Result<String> {
    Ok(serde_json::to_string(&HeartbeatFrame::new(now))?)
}

/// Encode a status-update frame
pub fn encode_status_update(update: &StatusUpdate) -> Result<String> {
    let mut value = serde_json::to_value(update)?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "type".to_string(),
            Value::String(FRAME_TYPE_STATUS_UPDATE.to_string()),
        );
    }
    Ok(serde_json::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::EventKind;
    use crate::model::status::{EventPhase, EventState};

    #[test]
    fn test_event_envelope_shape() {
        let event = Event::new(
            EventKind::Script {
                script: "echo hi".into(),
                args: vec![],
            },
            "agent-1",
            "tester",
            Utc::now(),
        );
        let bytes = encode_event(&event).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "event");
        assert_eq!(value["event"]["type"], "script");
        assert_eq!(value["event"]["target_agent"], "agent-1");
    }

    #[test]
    fn test_parse_heartbeat() {
        let text = r#"{"type":"heartbeat","timestamp":"2024-06-01T12:00:00Z","metrics":{"cpu":0.5}}"#;
        match parse_agent_frame(text).unwrap() {
            AgentFrame::Heartbeat(hb) => {
                assert_eq!(hb.metrics.len(), 1);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_parse_status_update() {
        let update = StatusUpdate {
            event_id: "E1".into(),
            agent_id: "a1".into(),
            state: Some(EventState::InProgress),
            phase: Some(EventPhase::Applying),
            message: Some("applying".into()),
            log_level: None,
            details: None,
            result: None,
            timestamp: Utc::now(),
        };
        let text = encode_status_update(&update).unwrap();

        match parse_agent_frame(&text).unwrap() {
            AgentFrame::StatusUpdate(parsed) => {
                assert_eq!(parsed.event_id, "E1");
                assert_eq!(parsed.state, Some(EventState::InProgress));
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let frame = parse_agent_frame(r#"{"type":"telemetry","cpu":1}"#).unwrap();
        assert!(matches!(frame, AgentFrame::Unknown(t) if t == "telemetry"));

        let frame = parse_agent_frame(r#"{"payload":1}"#).unwrap();
        assert!(matches!(frame, AgentFrame::Unknown(t) if t.is_empty()));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(parse_agent_frame("{not json").is_err());
    }

    #[test]
    fn test_registration_reply() {
        let ok = RegistrationReply::registered("agent-1");
        assert!(ok.is_registered());
        assert!(ok.error.is_none());

        let bad = RegistrationReply::rejected("agent ID is required");
        assert!(!bad.is_registered());
        let json = serde_json::to_value(&bad).unwrap();
        assert!(json.get("status").is_none());
        assert_eq!(json["error"], "agent ID is required");
    }
}
