//! Control-plane assembly and lifecycle.
//!
//! Connects the store and queue (both fatal at startup), wires the
//! registry and router to the store hooks, spawns the background
//! workers, and serves HTTP until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use skiff_core::clock::{Clock, SystemClock};
use skiff_core::config::ControlPlaneConfig;
use skiff_core::constants::SHUTDOWN_DRAIN_MS_MAX;
use skiff_core::{Error, Result};
use skiff_registry::{AgentRegistry, RegistryConfig};
use skiff_storage::{RedisStore, StateStore};

use crate::api;
use crate::consumer::NatsQueue;
use crate::hooks::StoreHooks;
use crate::reconciler::StatusReconciler;
use crate::router::EventRouter;
use crate::state::AppState;

/// Run the control plane until shutdown.
///
/// Only store and queue connects are fatal; everything after startup is
/// best-effort and logged.
pub async fn run(config: ControlPlaneConfig) -> Result<()> {
    config.validate()?;
    tracing::info!("Starting Skiff control plane");

    tracing::info!(addr = %config.store.addr, "Connecting to state store");
    let store: Arc<dyn StateStore> = Arc::new(RedisStore::connect(&config.store).await?);
    tracing::info!("State store connected");

    let queue = if config.queue.enabled {
        tracing::info!(url = %config.queue.url, station = %config.queue.station,
            "Connecting to event queue");
        let queue = NatsQueue::connect(&config.queue).await?;
        tracing::info!("Event queue connected");
        Some(Arc::new(queue))
    } else {
        tracing::info!("Event queue disabled, skipping event consumption");
        None
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let hooks = Arc::new(StoreHooks::new(store.clone(), clock.clone()));

    let registry = Arc::new(AgentRegistry::with_parts(
        RegistryConfig {
            heartbeat_timeout_ms: config.heartbeat_timeout_ms,
            sweep_interval_ms: config.sweep_interval_ms,
        },
        hooks.clone(),
        clock.clone(),
    ));
    registry.spawn_sweeper();
    tracing::info!("Agent registry initialized");

    let event_router = Arc::new(EventRouter::with_parts(
        registry.clone(),
        config.router.clone(),
        hooks,
        clock.clone(),
    ));
    event_router.spawn_retry_worker();
    tracing::info!("Event router initialized");

    let reconciler = Arc::new(StatusReconciler::new(store.clone(), clock.clone()));
    let state = AppState::new(registry, event_router, store, reconciler, clock);

    if let Some(queue) = queue {
        let consumer_state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = queue.consume(consumer_state).await {
                tracing::error!(error = %err, "Event consumer error");
            }
        });
    }

    serve(config, state).await
}

/// Bind and serve the HTTP surface, draining on SIGINT/SIGTERM.
async fn serve(config: ControlPlaneConfig, state: AppState) -> Result<()> {
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::internal(format!("failed to bind {addr}: {e}")))?;

    tracing::info!("Control plane started");
    tracing::info!(url = format!("ws://{addr}/ws"), "WebSocket endpoint");
    tracing::info!(url = format!("http://{addr}/health"), "Health endpoint");
    tracing::info!(url = format!("http://{addr}/metrics"), "Metrics endpoint");

    let app = api::router(state);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => {
            result
                .map_err(|e| Error::internal(format!("server task failed: {e}")))?
                .map_err(|e| Error::internal(format!("server error: {e}")))?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutting down control plane");
            let _ = shutdown_tx.send(());
            let drain = Duration::from_millis(SHUTDOWN_DRAIN_MS_MAX);
            if tokio::time::timeout(drain, server).await.is_err() {
                tracing::warn!("Drain deadline exceeded, exiting");
            }
        }
    }

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
