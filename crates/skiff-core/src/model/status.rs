//! Event execution status, phases, and the status-update merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::EXECUTION_LOG_ENTRIES_MAX;

/// Coarse state of event execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Created,
    Queued,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl EventState {
    /// All states, in lifecycle order
    pub const ALL: [EventState; 7] = [
        EventState::Created,
        EventState::Queued,
        EventState::Assigned,
        EventState::InProgress,
        EventState::Completed,
        EventState::Failed,
        EventState::Expired,
    ];

    /// Wire/key representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Created => "created",
            EventState::Queued => "queued",
            EventState::Assigned => "assigned",
            EventState::InProgress => "in_progress",
            EventState::Completed => "completed",
            EventState::Failed => "failed",
            EventState::Expired => "expired",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventState::Completed | EventState::Failed | EventState::Expired
        )
    }
}

/// Granular execution phase within the in-progress state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Agent received the event
    Received,
    /// Validating manifests/scripts
    Validating,
    /// Applying changes to the cluster
    Applying,
    /// Verifying the changes
    Verifying,
    Completed,
    Failed,
}

/// Severity of an execution log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A single entry in a status record's execution log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<EventPhase>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

/// Outcome of a single Kubernetes resource within an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Resource kind (Namespace, Deployment, ...)
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    /// created, updated, failed, unchanged
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Final outcome of event execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_status: Vec<ResourceStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    pub completed_at: DateTime<Utc>,
    /// Total execution time
    pub duration_ms: u64,
}

/// Persisted execution status of one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStatus {
    pub event_id: String,
    pub agent_id: String,
    pub state: EventState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<EventPhase>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_log: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EventResult>,
}

impl EventStatus {
    /// Create a status for a freshly assigned event
    pub fn new(
        event_id: impl Into<String>,
        agent_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            agent_id: agent_id.into(),
            state: EventState::Assigned,
            phase: Some(EventPhase::Received),
            message: "Event assigned to agent".to_string(),
            updated_at: now,
            execution_log: Vec::new(),
            result: None,
        }
    }

    /// Whether no further transitions are expected
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Set the state with a message and log the change
    pub fn update_state(&mut self, state: EventState, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        self.state = state;
        self.message = message.clone();
        self.updated_at = now;
        self.add_log(LogLevel::Info, None, message, None, now);
    }

    /// Set the phase with a message and log the change
    pub fn update_phase(&mut self, phase: EventPhase, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        self.phase = Some(phase);
        self.message = message.clone();
        self.updated_at = now;
        self.add_log(LogLevel::Info, Some(phase), message, None, now);
    }

    /// Append an execution log entry; the log is capped and drops its
    /// oldest entry once full.
    pub fn add_log(
        &mut self,
        level: LogLevel,
        phase: Option<EventPhase>,
        message: impl Into<String>,
        details: Option<HashMap<String, serde_json::Value>>,
        now: DateTime<Utc>,
    ) {
        if self.execution_log.len() >= EXECUTION_LOG_ENTRIES_MAX {
            self.execution_log.remove(0);
        }
        self.execution_log.push(LogEntry {
            timestamp: now,
            phase,
            level,
            message: message.into(),
            details,
        });
    }

    /// Mark the event completed with its result
    pub fn mark_completed(&mut self, result: EventResult, now: DateTime<Utc>) {
        self.state = EventState::Completed;
        self.phase = Some(EventPhase::Completed);
        self.message = "Event execution completed successfully".to_string();
        self.result = Some(result);
        self.updated_at = now;
        self.add_log(
            LogLevel::Info,
            Some(EventPhase::Completed),
            "Execution completed",
            None,
            now,
        );
    }

    /// Mark the event failed
    pub fn mark_failed(&mut self, error_message: impl Into<String>, now: DateTime<Utc>) {
        let error_message = error_message.into();
        self.state = EventState::Failed;
        self.phase = Some(EventPhase::Failed);
        self.message = error_message.clone();
        self.result = Some(EventResult {
            success: false,
            resource_status: Vec::new(),
            error_message: error_message.clone(),
            completed_at: now,
            duration_ms: 0,
        });
        self.updated_at = now;
        self.add_log(LogLevel::Error, Some(EventPhase::Failed), error_message, None, now);
    }

    /// Mark the event expired
    pub fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.state = EventState::Expired;
        self.message = "Event expired (TTL exceeded)".to_string();
        self.updated_at = now;
        self.add_log(LogLevel::Warning, None, "Event expired", None, now);
    }

    /// Merge a status update from an agent into this record.
    ///
    /// Non-empty fields overwrite; a non-empty log level appends a log
    /// entry. A terminal status ignores any update that carries a
    /// non-terminal state value. Returns whether anything was applied.
    pub fn apply(&mut self, update: &StatusUpdate, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            if let Some(state) = update.state {
                if !state.is_terminal() {
                    return false;
                }
            }
        }

        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(phase) = update.phase {
            self.phase = Some(phase);
        }
        if let Some(message) = &update.message {
            if !message.is_empty() {
                self.message = message.clone();
            }
        }
        if let Some(result) = &update.result {
            self.result = Some(result.clone());
        }
        if let Some(level) = update.log_level {
            self.add_log(
                level,
                update.phase,
                update.message.clone().unwrap_or_default(),
                update.details.clone(),
                now,
            );
        }
        self.updated_at = now;
        true
    }
}

/// Sent by an agent to report progress on one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub event_id: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<EventState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<EventPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<EventResult>,
    pub timestamp: DateTime<Utc>,
}
