//! Agent records and registration.
//!
//! An agent is a worker process inside a remote Kubernetes cluster. It
//! dials the control plane, registers once, and holds a single duplex
//! session until either side closes. The registry is the only mutator of
//! these records apart from the heartbeat timestamp.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Connection state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered with a live session and recent heartbeats
    Connected,
    /// Session still open but heartbeats have gone stale
    Unhealthy,
    /// Session closed
    Disconnected,
}

/// A registered data plane agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Stable agent ID, survives restarts
    pub id: String,
    /// Human-friendly name
    pub name: String,

    /// Name of the Kubernetes cluster the agent runs in
    pub cluster_name: String,
    /// Cluster provider (eks, gke, aks, ...)
    pub cluster_provider: String,
    /// Cloud region
    pub region: String,
    /// Agent version
    pub version: String,
    /// Custom labels for filtering
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Identifier of the current websocket session
    pub connection_id: String,
    /// Current connection state
    pub status: AgentStatus,
    /// Last heartbeat timestamp
    pub last_heartbeat: DateTime<Utc>,
    /// When the agent connected
    pub connected_at: DateTime<Utc>,
    /// When the agent disconnected, None while connected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,

    /// Supported operations (k8s_crud, script_exec, policy)
    pub capabilities: Vec<String>,

    /// Agent pod hostname
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    /// Namespace the agent pod runs in
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Agent {
    /// Whether the agent is connected with a recent heartbeat
    pub fn is_healthy(&self, heartbeat_timeout: Duration, now: DateTime<Utc>) -> bool {
        if self.status != AgentStatus::Connected {
            return false;
        }
        now - self.last_heartbeat <= heartbeat_timeout
    }

    /// Record a heartbeat; an unhealthy agent is restored to connected
    pub fn update_heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = now;
        if self.status == AgentStatus::Unhealthy {
            self.status = AgentStatus::Connected;
        }
    }

    /// Mark the agent disconnected
    pub fn mark_disconnected(&mut self, now: DateTime<Utc>) {
        self.status = AgentStatus::Disconnected;
        self.disconnected_at = Some(now);
    }

    /// Mark the agent unhealthy (session open, heartbeats stale)
    pub fn mark_unhealthy(&mut self) {
        self.status = AgentStatus::Unhealthy;
    }

    /// Whether the agent advertises a capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Sent by an agent as the first frame after the websocket handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_provider: String,
    #[serde(default)]
    pub region: String,
    pub version: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl AgentRegistration {
    /// Validate the registration
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::MissingAgentId);
        }
        if self.name.is_empty() {
            return Err(Error::MissingAgentName);
        }
        if self.cluster_name.is_empty() {
            return Err(Error::MissingClusterName);
        }
        if self.version.is_empty() {
            return Err(Error::MissingAgentVersion);
        }
        if self.capabilities.is_empty() {
            return Err(Error::MissingCapabilities);
        }
        Ok(())
    }

    /// Build a fresh connected agent record from this registration
    pub fn into_agent(self, connection_id: impl Into<String>, now: DateTime<Utc>) -> Agent {
        Agent {
            id: self.id,
            name: self.name,
            cluster_name: self.cluster_name,
            cluster_provider: self.cluster_provider,
            region: self.region,
            version: self.version,
            labels: self.labels,
            connection_id: connection_id.into(),
            status: AgentStatus::Connected,
            last_heartbeat: now,
            connected_at: now,
            disconnected_at: None,
            capabilities: self.capabilities,
            hostname: self.hostname,
            namespace: self.namespace,
            metadata: self.metadata,
        }
    }
}
