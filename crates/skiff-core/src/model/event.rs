//! Events: units of work addressed to a named agent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::constants::EVENT_TTL_SECONDS_DEFAULT;
use crate::error::{Error, Result};

/// The typed payload of an event.
///
/// The `type` discriminator and `payload` body travel as separate JSON
/// fields; each variant carries only the fields for that variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// Raw Kubernetes YAML manifests to apply
    K8sResource { manifests: Vec<String> },
    /// Script content to execute with optional arguments
    Script {
        script: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Policy validation rules to enforce
    Policy { rules: Vec<PolicyRule> },
}

impl EventKind {
    /// Discriminator string as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::K8sResource { .. } => "k8s_resource",
            EventKind::Script { .. } => "script",
            EventKind::Policy { .. } => "policy",
        }
    }
}

/// A validation rule carried by a policy event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule name/identifier
    pub name: String,
    /// Rule type (e.g. "required_label", "resource_limit")
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Rule-specific parameters
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, String>,
    /// "error", "warning", or "info"
    pub severity: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A task to be executed by a data plane agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID (UUID)
    pub id: String,

    #[serde(flatten)]
    pub kind: EventKind,

    /// Exact agent ID to execute this event; no broadcast, no selection
    pub target_agent: String,

    pub created_at: DateTime<Utc>,
    /// User or system that created the event
    #[serde(default)]
    pub created_by: String,
    /// Time-to-live; expiry is absolute from created_at
    pub ttl_seconds: u64,
    /// Accepted but not yet used as an ordering key
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl Event {
    /// Create a new event with a generated ID and default TTL
    pub fn new(
        kind: EventKind,
        target_agent: impl Into<String>,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            target_agent: target_agent.into(),
            created_at: now,
            created_by: created_by.into(),
            ttl_seconds: EVENT_TTL_SECONDS_DEFAULT,
            priority: 0,
            labels: HashMap::new(),
        }
    }

    /// The instant this event expires
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.ttl_seconds as i64)
    }

    /// Whether the event has exceeded its TTL
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Validate identity, routing, and payload-shape invariants
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::MissingEventId);
        }
        if self.target_agent.is_empty() {
            return Err(Error::MissingTargetAgent {
                id: self.id.clone(),
            });
        }

        match &self.kind {
            EventKind::K8sResource { manifests } => {
                if manifests.is_empty() || manifests.iter().all(|m| m.is_empty()) {
                    return Err(Error::EmptyManifests {
                        id: self.id.clone(),
                    });
                }
            }
            EventKind::Script { script, .. } => {
                if script.is_empty() {
                    return Err(Error::EmptyScript {
                        id: self.id.clone(),
                    });
                }
            }
            EventKind::Policy { rules } => {
                if rules.is_empty() {
                    return Err(Error::EmptyPolicyRules {
                        id: self.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
