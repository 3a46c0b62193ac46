//! Redis state store.
//!
//! Production backend. Status records are strings with a relative TTL;
//! the agent index is a sorted set scored by save time; state and cluster
//! indexes are sets; the audit log is a stream; counters use INCR.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;

use skiff_core::config::StoreConfig;
use skiff_core::constants::STATUS_TTL_SECONDS;
use skiff_core::model::agent::Agent;
use skiff_core::model::audit::AuditLogEntry;
use skiff_core::model::status::{EventState, EventStatus};
use skiff_core::{Error, Result};

use crate::store::{keys, StateStore};

/// Redis-backed [`StateStore`]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and ping; failure here is fatal at control-plane startup.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|e| Error::store("connect", e.to_string()))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::store("connect", e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| Error::store("ping", e.to_string()))?;

        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn save_event_status(&self, status: &EventStatus) -> Result<()> {
        let mut conn = self.conn();
        let key = keys::event_status(&status.event_id);
        let data = serde_json::to_string(status)?;

        let _: () = conn
            .set_ex(&key, data, STATUS_TTL_SECONDS)
            .await
            .map_err(|e| Error::store("save_event_status", e.to_string()))?;

        let score = status.updated_at.timestamp();
        let _: () = conn
            .zadd(keys::agent_events(&status.agent_id), &status.event_id, score)
            .await
            .map_err(|e| Error::store("save_event_status.agent_index", e.to_string()))?;

        let _: () = conn
            .sadd(keys::events_by_state(status.state), &status.event_id)
            .await
            .map_err(|e| Error::store("save_event_status.state_index", e.to_string()))?;

        Ok(())
    }

    async fn get_event_status(&self, event_id: &str) -> Result<Option<EventStatus>> {
        let mut conn = self.conn();
        let data: Option<String> = conn
            .get(keys::event_status(event_id))
            .await
            .map_err(|e| Error::store("get_event_status", e.to_string()))?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn list_events_by_agent(&self, agent_id: &str, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        let stop = (limit - 1) as isize;
        conn.zrevrange(keys::agent_events(agent_id), 0, stop)
            .await
            .map_err(|e| Error::store("list_events_by_agent", e.to_string()))
    }

    async fn list_events_by_state(&self, state: EventState) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.smembers(keys::events_by_state(state))
            .await
            .map_err(|e| Error::store("list_events_by_state", e.to_string()))
    }

    async fn save_agent(&self, agent: &Agent) -> Result<()> {
        let mut conn = self.conn();
        let data = serde_json::to_string(agent)?;

        let _: () = conn
            .set(keys::agent(&agent.id), data)
            .await
            .map_err(|e| Error::store("save_agent", e.to_string()))?;

        let _: () = conn
            .sadd(keys::AGENTS_ALL, &agent.id)
            .await
            .map_err(|e| Error::store("save_agent.all_index", e.to_string()))?;

        let _: () = conn
            .sadd(keys::agents_by_cluster(&agent.cluster_name), &agent.id)
            .await
            .map_err(|e| Error::store("save_agent.cluster_index", e.to_string()))?;

        Ok(())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        let mut conn = self.conn();
        let data: Option<String> = conn
            .get(keys::agent(agent_id))
            .await
            .map_err(|e| Error::store("get_agent", e.to_string()))?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn list_all_agents(&self) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.smembers(keys::AGENTS_ALL)
            .await
            .map_err(|e| Error::store("list_all_agents", e.to_string()))
    }

    async fn list_agents_by_cluster(&self, cluster_name: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.smembers(keys::agents_by_cluster(cluster_name))
            .await
            .map_err(|e| Error::store("list_agents_by_cluster", e.to_string()))
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        // Load first so the cluster index membership can be removed too.
        let agent = self
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| Error::agent_not_found(agent_id))?;

        let mut conn = self.conn();
        let _: () = conn
            .del(keys::agent(agent_id))
            .await
            .map_err(|e| Error::store("delete_agent", e.to_string()))?;

        let _: () = conn
            .srem(keys::AGENTS_ALL, agent_id)
            .await
            .map_err(|e| Error::store("delete_agent.all_index", e.to_string()))?;

        let _: () = conn
            .srem(keys::agents_by_cluster(&agent.cluster_name), agent_id)
            .await
            .map_err(|e| Error::store("delete_agent.cluster_index", e.to_string()))?;

        Ok(())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        let mut conn = self.conn();
        let data = serde_json::to_string(entry)?;

        let _: () = conn
            .xadd(keys::AUDIT_STREAM, "*", &[("data", data)])
            .await
            .map_err(|e| Error::store("append_audit", e.to_string()))?;

        Ok(())
    }

    async fn read_recent_audit(&self, count: usize) -> Result<Vec<AuditLogEntry>> {
        let mut conn = self.conn();
        let reply: redis::streams::StreamRangeReply = conn
            .xrevrange_count(keys::AUDIT_STREAM, "+", "-", count)
            .await
            .map_err(|e| Error::store("read_recent_audit", e.to_string()))?;

        let mut entries = Vec::with_capacity(reply.ids.len());
        for id in reply.ids {
            let Some(data) = id.get::<String>("data") else {
                continue;
            };
            match serde_json::from_str(&data) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping malformed audit entry");
                }
            }
        }

        Ok(entries)
    }

    async fn incr_event_total(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: i64 = conn
            .incr(keys::STATS_EVENTS_TOTAL, 1)
            .await
            .map_err(|e| Error::store("incr_event_total", e.to_string()))?;
        Ok(())
    }

    async fn incr_state_count(&self, state: EventState) -> Result<()> {
        let mut conn = self.conn();
        let _: i64 = conn
            .incr(keys::stats_state(state), 1)
            .await
            .map_err(|e| Error::store("incr_state_count", e.to_string()))?;
        Ok(())
    }

    async fn get_event_stats(&self) -> Result<HashMap<String, i64>> {
        let mut conn = self.conn();
        let mut stats = HashMap::new();

        let total: Option<i64> = conn
            .get(keys::STATS_EVENTS_TOTAL)
            .await
            .map_err(|e| Error::store("get_event_stats", e.to_string()))?;
        stats.insert("total".to_string(), total.unwrap_or(0));

        for state in EventState::ALL {
            let count: Option<i64> = conn
                .get(keys::stats_state(state))
                .await
                .map_err(|e| Error::store("get_event_stats", e.to_string()))?;
            stats.insert(state.as_str().to_string(), count.unwrap_or(0));
        }

        Ok(stats)
    }
}
