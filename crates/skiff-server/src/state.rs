//! Shared application state for handlers and workers.

use std::sync::Arc;

use skiff_core::clock::Clock;
use skiff_core::model::audit::AuditLogEntry;
use skiff_core::model::event::Event;
use skiff_core::model::status::EventState;
use skiff_registry::AgentRegistry;
use skiff_storage::StateStore;

use crate::reconciler::StatusReconciler;
use crate::router::EventRouter;

/// Handles shared across the HTTP surface, agent sessions, and the queue
/// consumer. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub router: Arc<EventRouter>,
    pub store: Arc<dyn StateStore>,
    pub reconciler: Arc<StatusReconciler>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        registry: Arc<AgentRegistry>,
        router: Arc<EventRouter>,
        store: Arc<dyn StateStore>,
        reconciler: Arc<StatusReconciler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            router,
            store,
            reconciler,
            clock,
        }
    }

    /// Record one accepted submission: bump the total and `created`
    /// counters and append an audit entry. Best-effort; failures are
    /// logged, never propagated.
    pub async fn record_ingest(&self, event: &Event, action: &str) {
        let now = self.clock.now();

        if let Err(err) = self.store.incr_event_total().await {
            tracing::warn!(error = %err, "Failed to bump total event counter");
        }
        if let Err(err) = self.store.incr_state_count(EventState::Created).await {
            tracing::warn!(error = %err, "Failed to bump created counter");
        }

        let entry = AuditLogEntry::for_event(
            &event.id,
            &event.target_agent,
            action,
            &event.created_by,
            now,
        );
        if let Err(err) = self.store.append_audit(&entry).await {
            tracing::warn!(error = %err, "Failed to append audit entry");
        }
    }
}
