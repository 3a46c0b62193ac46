//! Error types for Skiff.
//!
//! Explicit error variants with context, using thiserror.

use thiserror::Error;

/// Result type alias for Skiff operations
pub type Result<T> = std::result::Result<T, Error>;

/// Skiff error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Event Validation Errors
    // =========================================================================
    #[error("event ID is required")]
    MissingEventId,

    #[error("target agent is required for event {id}")]
    MissingTargetAgent { id: String },

    #[error("k8s_resource event {id} must have at least one manifest")]
    EmptyManifests { id: String },

    #[error("script event {id} must have script content")]
    EmptyScript { id: String },

    #[error("policy event {id} must have at least one rule")]
    EmptyPolicyRules { id: String },

    #[error("event {id} is expired")]
    EventExpired { id: String },

    // =========================================================================
    // Registration Validation Errors
    // =========================================================================
    #[error("agent ID is required")]
    MissingAgentId,

    #[error("agent name is required")]
    MissingAgentName,

    #[error("cluster name is required")]
    MissingClusterName,

    #[error("agent version is required")]
    MissingAgentVersion,

    #[error("at least one capability is required")]
    MissingCapabilities,

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("agent not found: {id}")]
    AgentNotFound { id: String },

    #[error("send buffer full for agent {agent_id}: depth {depth}")]
    SendBufferFull { agent_id: String, depth: usize },

    #[error("connection closed for agent {agent_id}")]
    ConnectionClosed { agent_id: String },

    // =========================================================================
    // Routing Errors
    // =========================================================================
    #[error("event {id} failed: max retries exceeded ({retries})")]
    MaxRetriesExceeded { id: String, retries: u32 },

    // =========================================================================
    // Store & Queue Errors
    // =========================================================================
    #[error("store operation {op} failed: {reason}")]
    Store { op: String, reason: String },

    #[error("queue error: {reason}")]
    Queue { reason: String },

    // =========================================================================
    // Protocol & Configuration Errors
    // =========================================================================
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("registration rejected: {reason}")]
    RegistrationRejected { reason: String },

    #[error("invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("internal error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an agent not found error
    pub fn agent_not_found(id: impl Into<String>) -> Self {
        Self::AgentNotFound { id: id.into() }
    }

    /// Create a store error
    pub fn store(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            op: op.into(),
            reason: reason.into(),
        }
    }

    /// Create a queue error
    pub fn queue(reason: impl Into<String>) -> Self {
        Self::Queue {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// True for conditions where the caller should enqueue and retry later
    /// rather than fail the event outright.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::AgentNotFound { .. }
                | Self::SendBufferFull { .. }
                | Self::ConnectionClosed { .. }
                | Self::Store { .. }
        )
    }

    /// True for validation failures that reject the input at the boundary.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingEventId
                | Self::MissingTargetAgent { .. }
                | Self::EmptyManifests { .. }
                | Self::EmptyScript { .. }
                | Self::EmptyPolicyRules { .. }
                | Self::MissingAgentId
                | Self::MissingAgentName
                | Self::MissingClusterName
                | Self::MissingAgentVersion
                | Self::MissingCapabilities
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}
