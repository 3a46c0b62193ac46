//! Skiff Server
//!
//! The control plane. Agents dial in over `/ws` and register; events
//! arrive over `POST /events` or the external queue; the router delivers
//! each event to its named agent over the established reverse connection,
//! queueing with TTL-bounded retries while the agent is offline; status
//! frames streamed back by agents are reconciled into the state store.

pub mod api;
pub mod consumer;
pub mod hooks;
pub mod reconciler;
pub mod router;
pub mod server;
pub mod session;
pub mod state;

pub use reconciler::StatusReconciler;
pub use router::{EventRouter, NoopRouterHooks, PendingEvent, RouterHooks};
pub use server::run;
pub use state::AppState;
