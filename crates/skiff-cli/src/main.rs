//! Skiff CLI
//!
//! One binary, two modes: the control plane and the data plane agent.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use skiff_core::config::{
    AgentRunConfig, ControlPlaneConfig, QueueConfig, RouterConfig, StoreConfig,
};
use skiff_core::telemetry::{init_telemetry, TelemetryConfig};

/// Skiff: dispatch work events to agents in remote clusters
#[derive(Parser, Debug)]
#[command(name = "skiff")]
#[command(about = "Control plane and agent for dispatching events to remote clusters")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the control plane
    ControlPlane {
        /// HTTP/websocket bind address
        #[arg(long, default_value = "0.0.0.0")]
        bind_addr: String,

        /// HTTP/websocket port
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// State store address (host:port)
        #[arg(long, default_value = "localhost:6379")]
        redis_addr: String,

        /// State store password
        #[arg(long, default_value = "")]
        redis_password: String,

        /// State store database number
        #[arg(long, default_value_t = 0)]
        redis_db: i64,

        /// Enable the external queue consumer
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        queue_enabled: bool,

        /// Queue broker URL
        #[arg(long, default_value = "nats://localhost:4222")]
        queue_url: String,

        /// Queue station name
        #[arg(long, default_value = "skiff-events")]
        queue_station: String,

        /// Agent heartbeat timeout in seconds
        #[arg(long, default_value_t = 30)]
        heartbeat_timeout_secs: u64,

        /// Maximum event delivery retries
        #[arg(long, default_value_t = 3)]
        event_retry_max: u32,
    },

    /// Start a data plane agent
    Agent {
        /// Stable agent identifier
        #[arg(long)]
        agent_id: String,

        /// Human-friendly agent name (defaults to the agent id)
        #[arg(long, default_value = "")]
        agent_name: String,

        /// Name of the cluster this agent runs in
        #[arg(long)]
        cluster_name: String,

        /// Cluster provider (eks, gke, aks, ...)
        #[arg(long, default_value = "")]
        cluster_provider: String,

        /// Cloud region
        #[arg(long, default_value = "")]
        region: String,

        /// Namespace the agent runs in
        #[arg(long, default_value = "")]
        namespace: String,

        /// Control plane websocket endpoint
        #[arg(long, default_value = "ws://localhost:8080/ws")]
        cp_url: String,

        /// Heartbeat interval in seconds
        #[arg(long, default_value_t = 10)]
        heartbeat_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_telemetry(TelemetryConfig::new("skiff").with_log_level(log_level))?;

    match cli.command {
        Commands::ControlPlane {
            bind_addr,
            port,
            redis_addr,
            redis_password,
            redis_db,
            queue_enabled,
            queue_url,
            queue_station,
            heartbeat_timeout_secs,
            event_retry_max,
        } => {
            let config = ControlPlaneConfig {
                bind_addr,
                port,
                store: StoreConfig {
                    addr: redis_addr,
                    password: redis_password,
                    db: redis_db,
                },
                queue: QueueConfig {
                    enabled: queue_enabled,
                    url: queue_url,
                    station: queue_station,
                    ..Default::default()
                },
                heartbeat_timeout_ms: heartbeat_timeout_secs * 1000,
                router: RouterConfig {
                    retry_count_max: event_retry_max,
                    ..Default::default()
                },
                ..Default::default()
            };
            skiff_server::run(config).await?;
        }

        Commands::Agent {
            agent_id,
            agent_name,
            cluster_name,
            cluster_provider,
            region,
            namespace,
            cp_url,
            heartbeat_interval_secs,
        } => {
            let config = AgentRunConfig {
                agent_id,
                agent_name,
                cluster_name,
                cluster_provider,
                region,
                namespace,
                cp_url,
                heartbeat_interval_ms: heartbeat_interval_secs * 1000,
            };
            let executor = Arc::new(skiff_agent::SimExecutor::new());
            skiff_agent::run(config, executor).await?;
        }
    }

    Ok(())
}
