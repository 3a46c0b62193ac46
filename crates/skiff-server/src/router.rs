//! The event router.
//!
//! Delivers events to their named agent immediately when the agent is
//! connected and healthy, otherwise parks them in a per-agent pending
//! queue. A background worker retries pending events with bounded
//! attempts until delivery, retry exhaustion, or TTL expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use skiff_core::clock::{Clock, SystemClock};
use skiff_core::config::RouterConfig;
use skiff_core::model::agent::AgentStatus;
use skiff_core::model::event::Event;
use skiff_core::protocol;
use skiff_core::{Error, Result};
use skiff_registry::AgentRegistry;

/// An event waiting for its agent to become reachable.
///
/// Owned exclusively by the router; evicted on delivery, retry
/// exhaustion, or expiry. `retries` counts delivery attempts since
/// enqueue, not since creation.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event: Event,
    pub queued_at: DateTime<Utc>,
    pub retries: u32,
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle hooks observed by the control plane.
///
/// Each hook fires exactly once per transition, after the pending-map
/// mutation that caused it and outside the router's critical section.
#[async_trait]
pub trait RouterHooks: Send + Sync {
    async fn on_event_routed(&self, _event: &Event, _agent_id: &str) {}
    async fn on_event_queued(&self, _event: &Event, _agent_id: &str) {}
    async fn on_event_expired(&self, _event: &Event) {}
    async fn on_event_failed(&self, _event: &Event, _error: &Error) {}
}

/// Hooks that do nothing
pub struct NoopRouterHooks;

#[async_trait]
impl RouterHooks for NoopRouterHooks {}

/// Routes events to agents through the registry
pub struct EventRouter {
    registry: Arc<AgentRegistry>,
    pending: Mutex<HashMap<String, Vec<PendingEvent>>>,
    config: RouterConfig,
    hooks: Arc<dyn RouterHooks>,
    clock: Arc<dyn Clock>,
}

impl EventRouter {
    /// Create a router with production clock and no-op hooks
    pub fn new(registry: Arc<AgentRegistry>, config: RouterConfig) -> Self {
        Self::with_parts(
            registry,
            config,
            Arc::new(NoopRouterHooks),
            Arc::new(SystemClock::new()),
        )
    }

    /// Create a router with explicit hooks and clock
    pub fn with_parts(
        registry: Arc<AgentRegistry>,
        config: RouterConfig,
        hooks: Arc<dyn RouterHooks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            pending: Mutex::new(HashMap::new()),
            config,
            hooks,
            clock,
        }
    }

    /// Route an event to its target agent.
    ///
    /// Only validation and expiry fail synchronously. Every other outcome
    /// accepts the event: it is either delivered now (routed hook) or
    /// parked for retry (queued hook).
    pub async fn route_event(&self, event: Event) -> Result<()> {
        if let Err(err) = event.validate() {
            self.hooks.on_event_failed(&event, &err).await;
            return Err(err);
        }

        if event.expired(self.clock.now()) {
            self.hooks.on_event_expired(&event).await;
            return Err(Error::EventExpired {
                id: event.id.clone(),
            });
        }

        match self.registry.get_agent(&event.target_agent).await {
            Ok(agent) if agent.status == AgentStatus::Connected => self.deliver(event).await,
            // Unknown or offline target: park the event.
            _ => self.queue_event(event).await,
        }
    }

    /// Attempt immediate delivery; a failed send falls back to the
    /// pending queue.
    async fn deliver(&self, event: Event) -> Result<()> {
        let frame = match protocol::encode_event(&event) {
            Ok(frame) => frame,
            Err(err) => {
                self.hooks.on_event_failed(&event, &err).await;
                return Err(err);
            }
        };

        match self.registry.send_to_agent(&event.target_agent, frame).await {
            Ok(()) => {
                tracing::info!(event_id = %event.id, agent_id = %event.target_agent,
                    "Event routed to agent");
                let agent_id = event.target_agent.clone();
                self.hooks.on_event_routed(&event, &agent_id).await;
                Ok(())
            }
            Err(err) => {
                tracing::debug!(event_id = %event.id, agent_id = %event.target_agent,
                    error = %err, "Delivery failed, queueing event");
                self.queue_event(event).await
            }
        }
    }

    /// Park an event for later delivery.
    ///
    /// Expiry is re-checked under the lock; the TTL may have elapsed
    /// between the route-time check and here.
    async fn queue_event(&self, event: Event) -> Result<()> {
        let now = self.clock.now();

        if event.expired(now) {
            self.hooks.on_event_expired(&event).await;
            return Err(Error::EventExpired {
                id: event.id.clone(),
            });
        }

        let agent_id = event.target_agent.clone();
        let pending = PendingEvent {
            expires_at: event.expires_at(),
            event: event.clone(),
            queued_at: now,
            retries: 0,
        };

        {
            let mut buckets = self.pending.lock().await;
            buckets.entry(agent_id.clone()).or_default().push(pending);
        }

        tracing::info!(event_id = %event.id, agent_id = %agent_id,
            "Event queued for offline agent");
        self.hooks.on_event_queued(&event, &agent_id).await;
        Ok(())
    }

    /// One retry-worker tick: walk every pending bucket and try to make
    /// progress on each entry.
    ///
    /// An unreachable agent does not consume a retry; only a failed
    /// delivery attempt does.
    pub async fn process_pending(&self) {
        let now = self.clock.now();
        let mut expired: Vec<Event> = Vec::new();
        let mut exhausted: Vec<(Event, u32)> = Vec::new();
        let mut delivered: Vec<Event> = Vec::new();

        {
            let mut buckets = self.pending.lock().await;
            let agent_ids: Vec<String> = buckets.keys().cloned().collect();

            for agent_id in agent_ids {
                let Some(entries) = buckets.remove(&agent_id) else {
                    continue;
                };
                let mut remaining = Vec::with_capacity(entries.len());

                let agent = self.registry.get_agent(&agent_id).await.ok();
                let reachable = agent
                    .map(|a| a.status == AgentStatus::Connected)
                    .unwrap_or(false);

                for mut pending in entries {
                    if now > pending.expires_at {
                        expired.push(pending.event);
                        continue;
                    }

                    if pending.retries >= self.config.retry_count_max {
                        exhausted.push((pending.event, pending.retries));
                        continue;
                    }

                    if !reachable {
                        remaining.push(pending);
                        continue;
                    }

                    let frame = match protocol::encode_event(&pending.event) {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::error!(event_id = %pending.event.id, error = %err,
                                "Failed to encode pending event");
                            pending.retries += 1;
                            remaining.push(pending);
                            continue;
                        }
                    };

                    match self.registry.send_to_agent(&agent_id, frame).await {
                        Ok(()) => delivered.push(pending.event),
                        Err(_) => {
                            pending.retries += 1;
                            remaining.push(pending);
                        }
                    }
                }

                if !remaining.is_empty() {
                    buckets.insert(agent_id, remaining);
                }
            }
        }

        for event in expired {
            tracing::warn!(event_id = %event.id, "Pending event expired");
            self.hooks.on_event_expired(&event).await;
        }
        for (event, retries) in exhausted {
            let err = Error::MaxRetriesExceeded {
                id: event.id.clone(),
                retries,
            };
            tracing::error!(event_id = %event.id, retries, "Pending event failed");
            self.hooks.on_event_failed(&event, &err).await;
        }
        for event in delivered {
            tracing::info!(event_id = %event.id, agent_id = %event.target_agent,
                "Event routed to agent");
            let agent_id = event.target_agent.clone();
            self.hooks.on_event_routed(&event, &agent_id).await;
        }
    }

    /// Spawn the background retry worker
    pub fn spawn_retry_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let router = Arc::clone(self);
        let interval = std::time::Duration::from_millis(router.config.retry_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                router.process_pending().await;
            }
        })
    }

    /// Number of pending events for one agent
    pub async fn pending_count(&self, agent_id: &str) -> usize {
        let buckets = self.pending.lock().await;
        buckets.get(agent_id).map(Vec::len).unwrap_or(0)
    }

    /// Number of pending events across all agents
    pub async fn total_pending(&self) -> usize {
        let buckets = self.pending.lock().await;
        buckets.values().map(Vec::len).sum()
    }

    /// Snapshot of the pending events for one agent
    pub async fn pending_events(&self, agent_id: &str) -> Vec<Event> {
        let buckets = self.pending.lock().await;
        buckets
            .get(agent_id)
            .map(|entries| entries.iter().map(|p| p.event.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop all pending events for one agent
    pub async fn clear_pending(&self, agent_id: &str) {
        let mut buckets = self.pending.lock().await;
        buckets.remove(agent_id);
    }
}
