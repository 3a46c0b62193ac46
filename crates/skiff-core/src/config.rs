//! Configuration for Skiff binaries.
//!
//! Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Control plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Address to bind the HTTP/websocket server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Port for the HTTP/websocket server
    #[serde(default = "default_port")]
    pub port: u16,

    /// State store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// External queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Timeout before a silent agent is marked unhealthy (milliseconds)
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Interval between registry liveness sweeps (milliseconds)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Event router configuration
    #[serde(default)]
    pub router: RouterConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_heartbeat_timeout_ms() -> u64 {
    HEARTBEAT_TIMEOUT_MS_DEFAULT
}

fn default_sweep_interval_ms() -> u64 {
    SWEEP_INTERVAL_MS_DEFAULT
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            router: RouterConfig::default(),
        }
    }
}

impl ControlPlaneConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "bind_addr".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.heartbeat_timeout_ms <= self.sweep_interval_ms {
            return Err(Error::InvalidConfiguration {
                field: "heartbeat_timeout_ms".into(),
                reason: "must be greater than sweep_interval_ms".into(),
            });
        }
        self.router.validate()?;
        self.queue.validate()?;
        Ok(())
    }

    /// The socket address the server binds
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// State store (Redis) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store server address (host:port)
    #[serde(default = "default_store_addr")]
    pub addr: String,

    /// Store password (empty for no auth)
    #[serde(default)]
    pub password: String,

    /// Store database number
    #[serde(default)]
    pub db: i64,
}

fn default_store_addr() -> String {
    "localhost:6379".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            addr: default_store_addr(),
            password: String::new(),
            db: 0,
        }
    }
}

impl StoreConfig {
    /// Connection URL for the store client
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}

/// External queue (JetStream) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Whether the queue consumer runs at all
    #[serde(default = "default_queue_enabled")]
    pub enabled: bool,

    /// Broker URL
    #[serde(default = "default_queue_url")]
    pub url: String,

    /// Station (stream) name the consumer subscribes to
    #[serde(default = "default_queue_station")]
    pub station: String,

    /// Durable consumer name
    #[serde(default = "default_queue_consumer")]
    pub consumer_name: String,
}

fn default_queue_enabled() -> bool {
    true
}

fn default_queue_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_queue_station() -> String {
    "skiff-events".to_string()
}

fn default_queue_consumer() -> String {
    "skiff-cp-consumer".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: default_queue_enabled(),
            url: default_queue_url(),
            station: default_queue_station(),
            consumer_name: default_queue_consumer(),
        }
    }
}

impl QueueConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.station.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "queue.station".into(),
                reason: "required when the queue is enabled".into(),
            });
        }
        Ok(())
    }
}

/// Event router retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Maximum delivery attempts per pending event
    #[serde(default = "default_retry_count_max")]
    pub retry_count_max: u32,

    /// Interval between retry-worker ticks (milliseconds)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_retry_count_max() -> u32 {
    EVENT_RETRY_COUNT_MAX_DEFAULT
}

fn default_retry_interval_ms() -> u64 {
    RETRY_INTERVAL_MS_DEFAULT
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retry_count_max: default_retry_count_max(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl RouterConfig {
    fn validate(&self) -> Result<()> {
        if self.retry_count_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "router.retry_count_max".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.retry_interval_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "router.retry_interval_ms".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Agent runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunConfig {
    /// Stable agent identifier
    pub agent_id: String,

    /// Human-friendly name (defaults to the agent id)
    #[serde(default)]
    pub agent_name: String,

    /// Name of the cluster the agent runs in
    pub cluster_name: String,

    /// Cluster provider (eks, gke, aks, ...)
    #[serde(default)]
    pub cluster_provider: String,

    /// Cloud region
    #[serde(default)]
    pub region: String,

    /// Namespace the agent pod runs in
    #[serde(default)]
    pub namespace: String,

    /// Control plane websocket endpoint (ws://host:port/ws)
    #[serde(default = "default_cp_url")]
    pub cp_url: String,

    /// Interval between heartbeat frames (milliseconds)
    #[serde(default = "default_heartbeat_send_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

fn default_cp_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_heartbeat_send_interval_ms() -> u64 {
    HEARTBEAT_SEND_INTERVAL_MS_DEFAULT
}

impl AgentRunConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.agent_id.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "agent_id".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.cluster_name.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "cluster_name".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "heartbeat_interval_ms".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Effective display name
    pub fn effective_name(&self) -> &str {
        if self.agent_name.is_empty() {
            &self.agent_id
        } else {
            &self.agent_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControlPlaneConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_heartbeat_must_exceed_sweep() {
        let config = ControlPlaneConfig {
            heartbeat_timeout_ms: 5_000,
            sweep_interval_ms: 10_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_url_with_password() {
        let store = StoreConfig {
            addr: "redis.example:6379".into(),
            password: "hunter2".into(),
            db: 3,
        };
        assert_eq!(store.url(), "redis://:hunter2@redis.example:6379/3");
    }

    #[test]
    fn test_agent_config_requires_identity() {
        let config = AgentRunConfig {
            agent_id: String::new(),
            agent_name: String::new(),
            cluster_name: "prod".into(),
            cluster_provider: String::new(),
            region: String::new(),
            namespace: String::new(),
            cp_url: default_cp_url(),
            heartbeat_interval_ms: 1000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_agent_effective_name_falls_back_to_id() {
        let config = AgentRunConfig {
            agent_id: "agent-7".into(),
            agent_name: String::new(),
            cluster_name: "prod".into(),
            cluster_provider: String::new(),
            region: String::new(),
            namespace: String::new(),
            cp_url: default_cp_url(),
            heartbeat_interval_ms: 1000,
        };
        assert_eq!(config.effective_name(), "agent-7");
    }
}
