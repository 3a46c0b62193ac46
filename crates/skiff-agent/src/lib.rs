//! Skiff Agent
//!
//! The data plane worker. Dials the control plane, registers, heartbeats,
//! and executes delivered events phase by phase, streaming a status
//! update for each phase back over the same session.
//!
//! The act of applying work to a cluster lives behind [`EventExecutor`];
//! the Kubernetes-backed implementation is an external collaborator.

pub mod client;
pub mod executor;

pub use client::run;
pub use executor::{EventExecutor, SimExecutor};
