//! Status reconciliation.
//!
//! Merges status-update frames from agents into the persisted status
//! record and appends to its execution log.

use std::sync::Arc;

use skiff_core::clock::Clock;
use skiff_core::model::status::{EventStatus, StatusUpdate};
use skiff_core::Result;
use skiff_storage::StateStore;

/// Applies agent status updates to the state store
pub struct StatusReconciler {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Merge one status update and persist the result.
    ///
    /// A missing record is created fresh, bound to the reporting agent.
    /// Updates rejected by the terminal-state guard are dropped without a
    /// store write.
    pub async fn apply_update(&self, agent_id: &str, update: &StatusUpdate) -> Result<()> {
        let now = self.clock.now();

        let mut status = match self.store.get_event_status(&update.event_id).await {
            Ok(Some(status)) => status,
            Ok(None) => EventStatus::new(&update.event_id, agent_id, now),
            Err(err) => {
                tracing::warn!(event_id = %update.event_id, error = %err,
                    "Failed to load status, starting fresh");
                EventStatus::new(&update.event_id, agent_id, now)
            }
        };

        if !status.apply(update, now) {
            tracing::debug!(event_id = %update.event_id, state = ?update.state,
                "Ignoring non-terminal update for terminal status");
            return Ok(());
        }

        self.store.save_event_status(&status).await?;
        tracing::info!(event_id = %update.event_id, state = status.state.as_str(),
            phase = ?status.phase, "Status update");
        Ok(())
    }
}
