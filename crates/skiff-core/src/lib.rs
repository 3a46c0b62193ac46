//! Skiff Core
//!
//! Core types, errors, and constants for the Skiff control plane.
//!
//! # Overview
//!
//! Skiff dispatches imperative work events to long-lived agents running
//! inside remote Kubernetes clusters. Agents dial outward and register over
//! a websocket; the control plane ingests events, routes them to the named
//! agent, and persists the phase-by-phase status each agent streams back.
//!
//! This crate holds everything shared between the control plane and the
//! agent runtime: the data model, the wire protocol, error and config
//! types, and the clock abstraction used to make time-based logic
//! deterministic under test.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod model;
pub mod protocol;
pub mod telemetry;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{AgentRunConfig, ControlPlaneConfig, QueueConfig, RouterConfig, StoreConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use model::agent::{Agent, AgentRegistration, AgentStatus};
pub use model::audit::AuditLogEntry;
pub use model::event::{Event, EventKind, PolicyRule};
pub use model::status::{
    EventPhase, EventResult, EventState, EventStatus, LogEntry, LogLevel, ResourceStatus,
    StatusUpdate,
};
pub use telemetry::{init_telemetry, TelemetryConfig};
