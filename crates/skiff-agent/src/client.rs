//! The agent runtime: connect, register, heartbeat, execute.

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use skiff_core::config::AgentRunConfig;
use skiff_core::constants::SEND_BUFFER_DEPTH_MAX;
use skiff_core::model::agent::AgentRegistration;
use skiff_core::model::event::Event;
use skiff_core::model::status::{EventPhase, EventResult, EventState, LogLevel, StatusUpdate};
use skiff_core::protocol::{self, EventMessage, RegistrationReply, FRAME_TYPE_EVENT};
use skiff_core::{Error, Result};

use crate::executor::EventExecutor;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Run the agent until the session ends or SIGINT arrives.
pub async fn run(config: AgentRunConfig, executor: Arc<dyn EventExecutor>) -> Result<()> {
    config.validate()?;
    tracing::info!(agent_id = %config.agent_id, "Starting Skiff agent");

    tracing::info!(url = %config.cp_url, "Connecting to control plane");
    let (ws, _) = tokio_tungstenite::connect_async(&config.cp_url)
        .await
        .map_err(|e| Error::internal(format!("failed to connect to control plane: {e}")))?;
    tracing::info!("Connected to control plane");

    let (mut sink, mut stream) = ws.split();

    let registration = build_registration(&config);
    sink.send(WsMessage::Text(serde_json::to_string(&registration)?))
        .await
        .map_err(|e| Error::internal(format!("failed to send registration: {e}")))?;

    let reply = read_registration_reply(&mut stream).await?;
    if !reply.is_registered() {
        return Err(Error::RegistrationRejected {
            reason: reply
                .error
                .unwrap_or_else(|| "registration refused".to_string()),
        });
    }
    tracing::info!("Agent registered successfully");

    // One writer task serializes all outbound frames; the heartbeat task
    // and per-event handlers only touch the channel.
    let (tx, rx) = mpsc::channel::<String>(SEND_BUFFER_DEPTH_MAX);
    let writer = tokio::spawn(write_loop(sink, rx));
    let heartbeat = tokio::spawn(heartbeat_loop(tx.clone(), config.heartbeat_interval_ms));

    tracing::info!("Agent started, waiting for events");
    tokio::select! {
        _ = read_loop(&mut stream, executor, tx.clone()) => {
            tracing::info!("Session ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down agent");
        }
    }

    heartbeat.abort();
    drop(tx);
    let _ = writer.await;
    Ok(())
}

fn build_registration(config: &AgentRunConfig) -> AgentRegistration {
    AgentRegistration {
        id: config.agent_id.clone(),
        name: config.effective_name().to_string(),
        cluster_name: config.cluster_name.clone(),
        cluster_provider: config.cluster_provider.clone(),
        region: config.region.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        labels: Default::default(),
        capabilities: vec!["k8s_crud".to_string()],
        hostname: std::env::var("HOSTNAME").unwrap_or_default(),
        namespace: config.namespace.clone(),
        metadata: Default::default(),
    }
}

async fn read_registration_reply(stream: &mut WsStream) -> Result<RegistrationReply> {
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return Ok(serde_json::from_str(&text)?);
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(Error::internal(
                    "control plane closed connection before registration reply",
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                return Err(Error::internal(format!(
                    "failed to read registration reply: {err}"
                )));
            }
        }
    }
}

/// Drain outbound frames onto the wire, then close the socket.
async fn write_loop(mut sink: WsSink, mut rx: mpsc::Receiver<String>) {
    while let Some(text) = rx.recv().await {
        if let Err(err) = sink.send(WsMessage::Text(text)).await {
            tracing::error!(error = %err, "Failed to write frame");
            return;
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
}

/// Emit a heartbeat frame every interval until the session ends.
async fn heartbeat_loop(tx: mpsc::Sender<String>, interval_ms: u64) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let frame = match protocol::encode_heartbeat(Utc::now()) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode heartbeat");
                continue;
            }
        };
        if tx.send(frame).await.is_err() {
            return;
        }
        tracing::debug!("Heartbeat sent");
    }
}

/// Dispatch inbound frames until EOF, close, or error.
async fn read_loop(stream: &mut WsStream, executor: Arc<dyn EventExecutor>, tx: mpsc::Sender<String>) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => return,
            Ok(_) => continue,
            Err(err) => {
                tracing::error!(error = %err, "Error reading message");
                return;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "Malformed frame from control plane");
                continue;
            }
        };

        match value.get("type").and_then(serde_json::Value::as_str) {
            Some(FRAME_TYPE_EVENT) => {
                let envelope: EventMessage = match serde_json::from_value(value) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to decode event frame");
                        continue;
                    }
                };
                let executor = executor.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    execute_event(envelope.event, executor, tx).await;
                });
            }
            other => {
                tracing::warn!(frame_type = ?other, "Unknown message type");
            }
        }
    }
}

/// Execute one event, streaming a status update per phase.
pub(crate) async fn execute_event(
    event: Event,
    executor: Arc<dyn EventExecutor>,
    tx: mpsc::Sender<String>,
) {
    tracing::info!(event_id = %event.id, event_type = event.kind.name(), "Received event");
    let started = std::time::Instant::now();

    send_status(
        &tx,
        &event,
        EventState::InProgress,
        EventPhase::Received,
        "Event received, starting execution",
        None,
    )
    .await;

    if let Err(err) = event.validate() {
        tracing::error!(event_id = %event.id, error = %err, "Event validation failed");
        send_status(
            &tx,
            &event,
            EventState::Failed,
            EventPhase::Failed,
            err.to_string(),
            None,
        )
        .await;
        return;
    }

    send_status(
        &tx,
        &event,
        EventState::InProgress,
        EventPhase::Validating,
        "Validating event payload",
        None,
    )
    .await;

    if let Err(err) = executor.validate(&event).await {
        tracing::error!(event_id = %event.id, error = %err, "Payload validation failed");
        send_status(
            &tx,
            &event,
            EventState::Failed,
            EventPhase::Failed,
            format!("Payload validation failed: {err}"),
            None,
        )
        .await;
        return;
    }

    send_status(
        &tx,
        &event,
        EventState::InProgress,
        EventPhase::Applying,
        "Applying changes to cluster",
        None,
    )
    .await;

    let mut result = match executor.execute(&event).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(event_id = %event.id, error = %err, "Event execution failed");
            send_status(
                &tx,
                &event,
                EventState::Failed,
                EventPhase::Failed,
                err.to_string(),
                None,
            )
            .await;
            return;
        }
    };

    send_status(
        &tx,
        &event,
        EventState::InProgress,
        EventPhase::Verifying,
        "Verifying changes",
        None,
    )
    .await;

    result.duration_ms = started.elapsed().as_millis() as u64;
    result.completed_at = Utc::now();

    if result.success {
        tracing::info!(event_id = %event.id, "Event completed successfully");
        send_status(
            &tx,
            &event,
            EventState::Completed,
            EventPhase::Completed,
            "Event completed successfully",
            Some(result),
        )
        .await;
    } else {
        tracing::error!(event_id = %event.id, error = %result.error_message, "Event failed");
        let message = result.error_message.clone();
        send_status(
            &tx,
            &event,
            EventState::Failed,
            EventPhase::Failed,
            message,
            Some(result),
        )
        .await;
    }
}

async fn send_status(
    tx: &mpsc::Sender<String>,
    event: &Event,
    state: EventState,
    phase: EventPhase,
    message: impl Into<String>,
    result: Option<EventResult>,
) {
    let update = StatusUpdate {
        event_id: event.id.clone(),
        agent_id: event.target_agent.clone(),
        state: Some(state),
        phase: Some(phase),
        message: Some(message.into()),
        log_level: Some(LogLevel::Info),
        details: None,
        result,
        timestamp: Utc::now(),
    };

    let frame = match protocol::encode_status_update(&update) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::error!(event_id = %event.id, error = %err, "Failed to encode status update");
            return;
        }
    };

    if tx.send(frame).await.is_err() {
        tracing::debug!(event_id = %event.id, "Session gone, dropping status update");
    }
}
