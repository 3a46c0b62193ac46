//! Lifecycle hook wiring into the state store.
//!
//! The registry and router emit transitions; this implementation turns
//! each into the corresponding status record, counter bump, and audit
//! entry. All writes are best-effort: a store hiccup must never block a
//! registration or a delivery.

use async_trait::async_trait;
use std::sync::Arc;

use skiff_core::clock::Clock;
use skiff_core::model::agent::Agent;
use skiff_core::model::audit::AuditLogEntry;
use skiff_core::model::event::Event;
use skiff_core::model::status::{EventState, EventStatus};
use skiff_core::Error;
use skiff_registry::RegistryHooks;
use skiff_storage::StateStore;

use crate::router::RouterHooks;

/// Persists agent and event lifecycle transitions
pub struct StoreHooks {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl StoreHooks {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn save_status(&self, status: &EventStatus) {
        if let Err(err) = self.store.save_event_status(status).await {
            tracing::warn!(event_id = %status.event_id, error = %err,
                "Failed to save event status");
        }
        if let Err(err) = self.store.incr_state_count(status.state).await {
            tracing::warn!(error = %err, "Failed to bump state counter");
        }
    }

    async fn audit_agent(&self, agent: &Agent, action: &str) {
        let entry = AuditLogEntry::for_agent(&agent.id, action, self.clock.now());
        if let Err(err) = self.store.append_audit(&entry).await {
            tracing::warn!(agent_id = %agent.id, error = %err,
                "Failed to append audit entry");
        }
    }
}

#[async_trait]
impl RegistryHooks for StoreHooks {
    async fn on_agent_connected(&self, agent: &Agent) {
        tracing::info!(agent_id = %agent.id, cluster = %agent.cluster_name,
            region = %agent.region, "Agent connected");
        if let Err(err) = self.store.save_agent(agent).await {
            tracing::warn!(agent_id = %agent.id, error = %err,
                "Failed to save agent record");
        }
        self.audit_agent(agent, "agent_connected").await;
    }

    async fn on_agent_disconnected(&self, agent: &Agent) {
        tracing::info!(agent_id = %agent.id, "Agent disconnected");
        if let Err(err) = self.store.save_agent(agent).await {
            tracing::warn!(agent_id = %agent.id, error = %err,
                "Failed to save agent record");
        }
        self.audit_agent(agent, "agent_disconnected").await;
    }
}

#[async_trait]
impl RouterHooks for StoreHooks {
    async fn on_event_routed(&self, event: &Event, agent_id: &str) {
        let now = self.clock.now();
        let mut status = EventStatus::new(&event.id, agent_id, now);
        status.update_state(EventState::Assigned, "Event routed to agent", now);
        self.save_status(&status).await;
    }

    async fn on_event_queued(&self, event: &Event, agent_id: &str) {
        let now = self.clock.now();
        let mut status = EventStatus::new(&event.id, agent_id, now);
        status.update_state(EventState::Queued, "Agent offline, event queued", now);
        self.save_status(&status).await;
    }

    async fn on_event_expired(&self, event: &Event) {
        let now = self.clock.now();
        let mut status = EventStatus::new(&event.id, &event.target_agent, now);
        status.mark_expired(now);
        self.save_status(&status).await;
    }

    async fn on_event_failed(&self, event: &Event, error: &Error) {
        let now = self.clock.now();
        let mut status = EventStatus::new(&event.id, &event.target_agent, now);
        status.mark_failed(error.to_string(), now);
        self.save_status(&status).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skiff_core::clock::SystemClock;
    use skiff_core::model::agent::AgentRegistration;
    use skiff_core::model::event::EventKind;
    use skiff_storage::MemoryStore;
    use std::collections::HashMap;

    fn hooks(store: Arc<MemoryStore>) -> StoreHooks {
        StoreHooks::new(store, Arc::new(SystemClock::new()))
    }

    fn agent() -> Agent {
        AgentRegistration {
            id: "a1".into(),
            name: "worker".into(),
            cluster_name: "prod".into(),
            cluster_provider: "eks".into(),
            region: "us-east-1".into(),
            version: "0.1.0".into(),
            labels: HashMap::new(),
            capabilities: vec!["k8s_crud".into()],
            hostname: String::new(),
            namespace: String::new(),
            metadata: HashMap::new(),
        }
        .into_agent("c1", Utc::now())
    }

    fn event() -> Event {
        Event::new(
            EventKind::K8sResource {
                manifests: vec!["kind: Namespace".into()],
            },
            "a1",
            "tester",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_connected_persists_record_and_audit() {
        let store = Arc::new(MemoryStore::new());
        hooks(store.clone()).on_agent_connected(&agent()).await;

        assert!(store.get_agent("a1").await.unwrap().is_some());
        let audit = store.read_recent_audit(1).await.unwrap();
        assert_eq!(audit[0].action, "agent_connected");
    }

    #[tokio::test]
    async fn test_routed_writes_assigned_status() {
        let store = Arc::new(MemoryStore::new());
        let e = event();
        hooks(store.clone()).on_event_routed(&e, "a1").await;

        let status = store.get_event_status(&e.id).await.unwrap().unwrap();
        assert_eq!(status.state, EventState::Assigned);
        assert_eq!(status.agent_id, "a1");

        let stats = store.get_event_stats().await.unwrap();
        assert_eq!(stats["assigned"], 1);
    }

    #[tokio::test]
    async fn test_expired_writes_terminal_status() {
        let store = Arc::new(MemoryStore::new());
        let e = event();
        hooks(store.clone()).on_event_expired(&e).await;

        let status = store.get_event_status(&e.id).await.unwrap().unwrap();
        assert_eq!(status.state, EventState::Expired);
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn test_failed_carries_reason() {
        let store = Arc::new(MemoryStore::new());
        let e = event();
        let err = Error::MaxRetriesExceeded {
            id: e.id.clone(),
            retries: 3,
        };
        hooks(store.clone()).on_event_failed(&e, &err).await;

        let status = store.get_event_status(&e.id).await.unwrap().unwrap();
        assert_eq!(status.state, EventState::Failed);
        assert!(status.message.contains("max retries"));
    }
}
