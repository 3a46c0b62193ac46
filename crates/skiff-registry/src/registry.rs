//! The agent registry.
//!
//! Maps agent ids to live connections and records, serializes lifecycle
//! mutations behind one write lock, and runs the background liveness
//! sweep that demotes silent agents to unhealthy.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use skiff_core::clock::{Clock, SystemClock};
use skiff_core::constants::{HEARTBEAT_TIMEOUT_MS_DEFAULT, SWEEP_INTERVAL_MS_DEFAULT};
use skiff_core::model::agent::{Agent, AgentRegistration, AgentStatus};
use skiff_core::{Error, Result};

use crate::connection::AgentConnection;

/// Lifecycle hooks observed by the control plane.
///
/// Each hook fires exactly once per transition, after the map mutation
/// that caused it and outside the registry's critical section. Hooks must
/// observe or delegate, never mutate agent records themselves.
#[async_trait]
pub trait RegistryHooks: Send + Sync {
    async fn on_agent_connected(&self, _agent: &Agent) {}
    async fn on_agent_disconnected(&self, _agent: &Agent) {}
}

/// Hooks that do nothing
pub struct NoopRegistryHooks;

#[async_trait]
impl RegistryHooks for NoopRegistryHooks {}

/// Registry tunables
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Timeout before a silent connected agent is marked unhealthy
    pub heartbeat_timeout_ms: u64,
    /// Interval between liveness sweeps
    pub sweep_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: HEARTBEAT_TIMEOUT_MS_DEFAULT,
            sweep_interval_ms: SWEEP_INTERVAL_MS_DEFAULT,
        }
    }
}

struct AgentEntry {
    agent: Agent,
    conn: Arc<AgentConnection>,
}

/// Registry of connected agents
pub struct AgentRegistry {
    entries: RwLock<HashMap<String, AgentEntry>>,
    heartbeat_timeout: Duration,
    sweep_interval: std::time::Duration,
    hooks: Arc<dyn RegistryHooks>,
    clock: Arc<dyn Clock>,
}

impl AgentRegistry {
    /// Create a registry with production clock and no-op hooks
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(NoopRegistryHooks),
            Arc::new(SystemClock::new()),
        )
    }

    /// Create a registry with explicit hooks and clock
    pub fn with_parts(
        config: RegistryConfig,
        hooks: Arc<dyn RegistryHooks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            heartbeat_timeout: Duration::milliseconds(config.heartbeat_timeout_ms as i64),
            sweep_interval: std::time::Duration::from_millis(config.sweep_interval_ms),
            hooks,
            clock,
        }
    }

    /// Register a new agent connection.
    ///
    /// A duplicate id supersedes the prior session: the old connection is
    /// closed, its record marked disconnected, and the disconnected hook
    /// fires before the new record's connected hook.
    pub async fn register(
        &self,
        registration: AgentRegistration,
        conn: Arc<AgentConnection>,
    ) -> Result<Agent> {
        registration.validate()?;

        let now = self.clock.now();
        let (displaced, agent) = {
            let mut entries = self.entries.write().await;

            let displaced = entries.remove(&registration.id).map(|mut existing| {
                existing.conn.close();
                existing.agent.mark_disconnected(now);
                existing.agent
            });

            let agent = registration.into_agent(conn.connection_id(), now);
            entries.insert(
                agent.id.clone(),
                AgentEntry {
                    agent: agent.clone(),
                    conn,
                },
            );
            (displaced, agent)
        };

        if let Some(old) = &displaced {
            tracing::info!(agent_id = %old.id, connection_id = %old.connection_id,
                "Superseding prior session for reconnecting agent");
            self.hooks.on_agent_disconnected(old).await;
        }
        self.hooks.on_agent_connected(&agent).await;

        Ok(agent)
    }

    /// Remove an agent, closing its connection.
    ///
    /// Fails with `AgentNotFound` when the id is absent; calling twice
    /// therefore succeeds once.
    pub async fn unregister(&self, agent_id: &str) -> Result<Agent> {
        let now = self.clock.now();
        let agent = {
            let mut entries = self.entries.write().await;
            let mut entry = entries
                .remove(agent_id)
                .ok_or_else(|| Error::agent_not_found(agent_id))?;
            entry.agent.mark_disconnected(now);
            entry.conn.close();
            entry.agent
        };

        self.hooks.on_agent_disconnected(&agent).await;
        Ok(agent)
    }

    /// Session-exit variant of [`unregister`](Self::unregister).
    ///
    /// A superseded session's read loop exits after a takeover has already
    /// replaced its map entry; removing by id alone would tear down the
    /// replacement. This removes the entry only while the given connection
    /// still owns it, and returns whether it did.
    pub async fn unregister_connection(&self, agent_id: &str, connection_id: &str) -> bool {
        let now = self.clock.now();
        let agent = {
            let mut entries = self.entries.write().await;
            let owned = entries
                .get(agent_id)
                .map(|entry| entry.conn.connection_id() == connection_id)
                .unwrap_or(false);
            if !owned {
                return false;
            }
            let Some(mut entry) = entries.remove(agent_id) else {
                return false;
            };
            entry.agent.mark_disconnected(now);
            entry.conn.close();
            entry.agent
        };

        self.hooks.on_agent_disconnected(&agent).await;
        true
    }

    /// Connection for an agent id
    pub async fn get(&self, agent_id: &str) -> Result<Arc<AgentConnection>> {
        let entries = self.entries.read().await;
        entries
            .get(agent_id)
            .map(|e| e.conn.clone())
            .ok_or_else(|| Error::agent_not_found(agent_id))
    }

    /// Record snapshot for an agent id
    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        let entries = self.entries.read().await;
        entries
            .get(agent_id)
            .map(|e| e.agent.clone())
            .ok_or_else(|| Error::agent_not_found(agent_id))
    }

    /// Snapshot of all registered agents
    pub async fn list(&self) -> Vec<Agent> {
        let entries = self.entries.read().await;
        entries.values().map(|e| e.agent.clone()).collect()
    }

    /// Snapshot of agents currently in `connected`
    pub async fn list_connected(&self) -> Vec<Agent> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.agent.status == AgentStatus::Connected)
            .map(|e| e.agent.clone())
            .collect()
    }

    /// Number of registered agents
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Record a heartbeat for an agent; restores unhealthy to connected
    pub async fn update_heartbeat(&self, agent_id: &str) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(agent_id)
            .ok_or_else(|| Error::agent_not_found(agent_id))?;
        entry.agent.update_heartbeat(now);
        Ok(())
    }

    /// Enqueue a frame on an agent's outbound buffer
    pub async fn send_to_agent(&self, agent_id: &str, message: Vec<u8>) -> Result<()> {
        let conn = self.get(agent_id).await?;
        conn.send(message)
    }

    /// One liveness sweep step: demote connected agents whose heartbeat
    /// is older than the timeout. Returns the demoted ids.
    ///
    /// An unhealthy agent keeps its map entry and stream; it is only
    /// ineligible as a delivery target until its next heartbeat.
    pub async fn check_agent_health(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut demoted = Vec::new();

        let mut entries = self.entries.write().await;
        for (agent_id, entry) in entries.iter_mut() {
            if entry.agent.status != AgentStatus::Connected {
                continue;
            }
            let silence = now - entry.agent.last_heartbeat;
            if silence > self.heartbeat_timeout {
                entry.agent.mark_unhealthy();
                tracing::warn!(agent_id = %agent_id, silent_for_ms = silence.num_milliseconds(),
                    "Agent marked unhealthy (no heartbeat)");
                demoted.push(agent_id.clone());
            }
        }

        demoted
    }

    /// Spawn the background sweep worker
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so a sweep never
            // races a registration made in the same instant.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.check_agent_health().await;
            }
        })
    }
}
