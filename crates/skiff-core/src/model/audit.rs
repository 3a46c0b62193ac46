//! Audit log entries appended to the state store's audit stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry in the append-only audit stream.
///
/// Retention is governed by the store, not by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_id: String,
    /// e.g. "event_received", "agent_connected"
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

impl AuditLogEntry {
    /// Entry for an agent lifecycle action
    pub fn for_agent(agent_id: impl Into<String>, action: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            event_id: String::new(),
            agent_id: agent_id.into(),
            action: action.into(),
            user: String::new(),
            details: None,
        }
    }

    /// Entry for an event lifecycle action
    pub fn for_event(
        event_id: impl Into<String>,
        agent_id: impl Into<String>,
        action: impl Into<String>,
        user: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp: now,
            event_id: event_id.into(),
            agent_id: agent_id.into(),
            action: action.into(),
            user: user.into(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_entry_omits_event_fields() {
        let entry = AuditLogEntry::for_agent("a1", "agent_connected", Utc::now());
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("event_id").is_none());
        assert_eq!(json["agent_id"], "a1");
        assert_eq!(json["action"], "agent_connected");
    }

    #[test]
    fn test_round_trip() {
        let entry = AuditLogEntry::for_event("E1", "a1", "event_received", "alice", Utc::now());
        let json = serde_json::to_string(&entry).unwrap();
        let back: AuditLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
