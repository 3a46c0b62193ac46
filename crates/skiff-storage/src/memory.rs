//! In-memory state store.
//!
//! For tests. Implements the full facade including the score-sorted agent
//! index and counters; record TTLs are not enforced.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use skiff_core::clock::{Clock, SystemClock};
use skiff_core::model::agent::Agent;
use skiff_core::model::audit::AuditLogEntry;
use skiff_core::model::status::{EventState, EventStatus};
use skiff_core::Result;

use crate::store::StateStore;

#[derive(Default)]
struct Inner {
    statuses: HashMap<String, EventStatus>,
    /// agent_id -> (score, event_id); one entry per event, newest score wins
    agent_events: HashMap<String, Vec<(i64, String)>>,
    state_index: HashMap<EventState, HashSet<String>>,
    agents: HashMap<String, Agent>,
    agents_all: HashSet<String>,
    cluster_index: HashMap<String, HashSet<String>>,
    audit: Vec<AuditLogEntry>,
    counters: HashMap<String, i64>,
}

/// In-memory [`StateStore`] backend
pub struct MemoryStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create with an injected clock so index scores are deterministic
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    /// Number of audit entries recorded (test helper)
    pub async fn audit_len(&self) -> usize {
        self.inner.read().await.audit.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save_event_status(&self, status: &EventStatus) -> Result<()> {
        let score = self.clock.now().timestamp();
        let mut inner = self.inner.write().await;

        inner
            .statuses
            .insert(status.event_id.clone(), status.clone());

        let bucket = inner
            .agent_events
            .entry(status.agent_id.clone())
            .or_default();
        if let Some(entry) = bucket.iter_mut().find(|(_, id)| *id == status.event_id) {
            entry.0 = score;
        } else {
            bucket.push((score, status.event_id.clone()));
        }

        inner
            .state_index
            .entry(status.state)
            .or_default()
            .insert(status.event_id.clone());

        Ok(())
    }

    async fn get_event_status(&self, event_id: &str) -> Result<Option<EventStatus>> {
        Ok(self.inner.read().await.statuses.get(event_id).cloned())
    }

    async fn list_events_by_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        let mut entries = inner
            .agent_events
            .get(agent_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().take(limit).map(|(_, id)| id).collect())
    }

    async fn list_events_by_state(&self, state: EventState) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .state_index
            .get(&state)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.agents.insert(agent.id.clone(), agent.clone());
        inner.agents_all.insert(agent.id.clone());
        inner
            .cluster_index
            .entry(agent.cluster_name.clone())
            .or_default()
            .insert(agent.id.clone());
        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.inner.read().await.agents.get(agent_id).cloned())
    }

    async fn list_all_agents(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().await.agents_all.iter().cloned().collect())
    }

    async fn list_agents_by_cluster(&self, cluster_name: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .cluster_index
            .get(cluster_name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let agent = inner.agents.remove(agent_id);
        inner.agents_all.remove(agent_id);
        if let Some(agent) = agent {
            if let Some(cluster) = inner.cluster_index.get_mut(&agent.cluster_name) {
                cluster.remove(agent_id);
            }
        }
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.inner.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn read_recent_audit(&self, count: usize) -> Result<Vec<AuditLogEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.audit.iter().rev().take(count).cloned().collect())
    }

    async fn incr_event_total(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        *inner
            .counters
            .entry(crate::store::keys::STATS_EVENTS_TOTAL.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn incr_state_count(&self, state: EventState) -> Result<()> {
        let mut inner = self.inner.write().await;
        *inner
            .counters
            .entry(crate::store::keys::stats_state(state))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn get_event_stats(&self) -> Result<HashMap<String, i64>> {
        let inner = self.inner.read().await;
        let mut stats = HashMap::new();
        stats.insert(
            "total".to_string(),
            inner
                .counters
                .get(crate::store::keys::STATS_EVENTS_TOTAL)
                .copied()
                .unwrap_or(0),
        );
        for state in EventState::ALL {
            stats.insert(
                state.as_str().to_string(),
                inner
                    .counters
                    .get(&crate::store::keys::stats_state(state))
                    .copied()
                    .unwrap_or(0),
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skiff_core::clock::MockClock;
    use skiff_core::model::agent::AgentRegistration;

    fn status(event_id: &str, agent_id: &str) -> EventStatus {
        EventStatus::new(event_id, agent_id, Utc::now())
    }

    fn agent(id: &str, cluster: &str) -> Agent {
        AgentRegistration {
            id: id.into(),
            name: id.into(),
            cluster_name: cluster.into(),
            cluster_provider: "eks".into(),
            region: "us-east-1".into(),
            version: "0.1.0".into(),
            labels: HashMap::new(),
            capabilities: vec!["k8s_crud".into()],
            hostname: String::new(),
            namespace: String::new(),
            metadata: HashMap::new(),
        }
        .into_agent("conn-1", Utc::now())
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let store = MemoryStore::new();
        let s = status("E1", "a1");

        store.save_event_status(&s).await.unwrap();
        let loaded = store.get_event_status("E1").await.unwrap().unwrap();
        assert_eq!(loaded, s);

        assert!(store.get_event_status("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_updates_indexes() {
        let store = MemoryStore::new();
        store.save_event_status(&status("E1", "a1")).await.unwrap();

        let by_agent = store.list_events_by_agent("a1", 10).await.unwrap();
        assert_eq!(by_agent, vec!["E1"]);

        let assigned = store
            .list_events_by_state(EventState::Assigned)
            .await
            .unwrap();
        assert_eq!(assigned, vec!["E1"]);
    }

    #[tokio::test]
    async fn test_agent_events_most_recent_first() {
        let clock = Arc::new(MockClock::new(Utc::now()));
        let store = MemoryStore::with_clock(clock.clone());

        store.save_event_status(&status("E1", "a1")).await.unwrap();
        clock.advance_ms(2000);
        store.save_event_status(&status("E2", "a1")).await.unwrap();
        clock.advance_ms(2000);
        store.save_event_status(&status("E3", "a1")).await.unwrap();

        let listed = store.list_events_by_agent("a1", 2).await.unwrap();
        assert_eq!(listed, vec!["E3", "E2"]);
    }

    #[tokio::test]
    async fn test_agent_round_trip_and_indexes() {
        let store = MemoryStore::new();
        store.save_agent(&agent("a1", "prod")).await.unwrap();
        store.save_agent(&agent("a2", "prod")).await.unwrap();
        store.save_agent(&agent("a3", "staging")).await.unwrap();

        assert!(store.get_agent("a1").await.unwrap().is_some());
        assert_eq!(store.list_all_agents().await.unwrap().len(), 3);

        let mut prod = store.list_agents_by_cluster("prod").await.unwrap();
        prod.sort();
        assert_eq!(prod, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_delete_agent_cleans_indexes() {
        let store = MemoryStore::new();
        store.save_agent(&agent("a1", "prod")).await.unwrap();
        store.delete_agent("a1").await.unwrap();

        assert!(store.get_agent("a1").await.unwrap().is_none());
        assert!(store.list_all_agents().await.unwrap().is_empty());
        assert!(store
            .list_agents_by_cluster("prod")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_audit_newest_first() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .append_audit(&AuditLogEntry::for_agent(
                    format!("a{i}"),
                    "agent_connected",
                    Utc::now(),
                ))
                .await
                .unwrap();
        }

        let recent = store.read_recent_audit(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].agent_id, "a4");
        assert_eq!(recent[1].agent_id, "a3");
    }

    #[tokio::test]
    async fn test_counters() {
        let store = MemoryStore::new();
        store.incr_event_total().await.unwrap();
        store.incr_event_total().await.unwrap();
        store.incr_state_count(EventState::Created).await.unwrap();

        let stats = store.get_event_stats().await.unwrap();
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["created"], 1);
        assert_eq!(stats["failed"], 0);
    }
}
