//! The state store trait and key-space layout.

use async_trait::async_trait;
use std::collections::HashMap;

use skiff_core::model::agent::Agent;
use skiff_core::model::audit::AuditLogEntry;
use skiff_core::model::status::{EventState, EventStatus};
use skiff_core::Result;

/// Key-space layout shared by every backend.
///
/// ```text
/// event:status:{event_id}         string, TTL 7d, JSON EventStatus
/// agent:events:{agent_id}         sorted set, member=event_id, score=unix ts
/// events:state:{state}            set of event_id
/// agent:{agent_id}                string, JSON Agent
/// agents:all                      set of agent_id
/// agents:cluster:{cluster_name}   set of agent_id
/// audit:log                       stream, field "data" = JSON AuditLogEntry
/// stats:events:total              counter
/// stats:events:state:{state}      counter
/// ```
pub mod keys {
    use skiff_core::model::status::EventState;

    pub const AGENTS_ALL: &str = "agents:all";
    pub const AUDIT_STREAM: &str = "audit:log";
    pub const STATS_EVENTS_TOTAL: &str = "stats:events:total";

    pub fn event_status(event_id: &str) -> String {
        format!("event:status:{event_id}")
    }

    pub fn agent_events(agent_id: &str) -> String {
        format!("agent:events:{agent_id}")
    }

    pub fn events_by_state(state: EventState) -> String {
        format!("events:state:{}", state.as_str())
    }

    pub fn agent(agent_id: &str) -> String {
        format!("agent:{agent_id}")
    }

    pub fn agents_by_cluster(cluster_name: &str) -> String {
        format!("agents:cluster:{cluster_name}")
    }

    pub fn stats_state(state: EventState) -> String {
        format!("stats:events:state:{}", state.as_str())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_key_shapes() {
            assert_eq!(event_status("E1"), "event:status:E1");
            assert_eq!(agent_events("a1"), "agent:events:a1");
            assert_eq!(
                events_by_state(EventState::InProgress),
                "events:state:in_progress"
            );
            assert_eq!(agent("a1"), "agent:a1");
            assert_eq!(agents_by_cluster("prod"), "agents:cluster:prod");
            assert_eq!(stats_state(EventState::Failed), "stats:events:state:failed");
        }
    }
}

/// Durable storage for status records, agent records, audit, and counters.
///
/// Every operation may fail with a transport error; callers treat writes
/// as best-effort except at startup. The status writes (record, agent
/// index, state index) are not atomic; readers must tolerate an index
/// pointing at an expired record.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a status record with its relative TTL and refresh both the
    /// agent index (scored by now) and the state index.
    async fn save_event_status(&self, status: &EventStatus) -> Result<()>;

    /// Fetch a status record; `None` when absent or expired.
    async fn get_event_status(&self, event_id: &str) -> Result<Option<EventStatus>>;

    /// Event ids for an agent, most recent first.
    async fn list_events_by_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<String>>;

    /// Event ids in a state, unordered.
    async fn list_events_by_state(&self, state: EventState) -> Result<Vec<String>>;

    /// Persist an agent record (no TTL) and refresh the agent indexes.
    async fn save_agent(&self, agent: &Agent) -> Result<()>;

    /// Fetch an agent record; `None` when absent.
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    /// All known agent ids.
    async fn list_all_agents(&self) -> Result<Vec<String>>;

    /// Agent ids registered for a cluster.
    async fn list_agents_by_cluster(&self, cluster_name: &str) -> Result<Vec<String>>;

    /// Remove an agent record and its index memberships.
    async fn delete_agent(&self, agent_id: &str) -> Result<()>;

    /// Append an entry to the audit stream.
    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Most recent audit entries, newest first.
    async fn read_recent_audit(&self, count: usize) -> Result<Vec<AuditLogEntry>>;

    /// Atomically increment the total-events counter.
    async fn incr_event_total(&self) -> Result<()>;

    /// Atomically increment the per-state counter.
    async fn incr_state_count(&self, state: EventState) -> Result<()>;

    /// Counter snapshot: key `total` plus one entry per state.
    async fn get_event_stats(&self) -> Result<HashMap<String, i64>>;
}
