//! Agent session handling.
//!
//! Drives the per-connection state machine on the control-plane side:
//! upgrade, read one registration frame, register, then run a read loop
//! and a write loop until the session ends. Read-loop exit unregisters
//! the agent; the write loop ends when the outbound queue closes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use skiff_core::model::agent::AgentRegistration;
use skiff_core::protocol::{self, AgentFrame, RegistrationReply};
use skiff_registry::AgentConnection;

use crate::state::AppState;

/// `GET /ws`: upgrade the request into an agent session
pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent_session(state, socket))
}

/// Run one agent session to completion
async fn handle_agent_session(state: AppState, socket: WebSocket) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();

    // Exactly one registration frame before anything else.
    let registration = match read_registration(&mut stream).await {
        Ok(registration) => registration,
        Err(reason) => {
            tracing::error!(error = %reason, "Failed to read registration");
            reject(&mut sink, &reason).await;
            return;
        }
    };

    if let Err(err) = registration.validate() {
        tracing::error!(error = %err, "Invalid registration");
        reject(&mut sink, &err.to_string()).await;
        return;
    }

    let agent_id = registration.id.clone();
    let (conn, outbound_rx) = AgentConnection::new(&agent_id, &connection_id);
    let conn = Arc::new(conn);

    let agent = match state.registry.register(registration, conn.clone()).await {
        Ok(agent) => agent,
        Err(err) => {
            tracing::error!(agent_id = %agent_id, error = %err, "Failed to register agent");
            reject(&mut sink, &err.to_string()).await;
            return;
        }
    };

    let reply = RegistrationReply::registered(&agent.id);
    match serde_json::to_string(&reply) {
        Ok(text) => {
            if sink.send(Message::Text(text)).await.is_err() {
                state
                    .registry
                    .unregister_connection(&agent_id, &connection_id)
                    .await;
                return;
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode registration reply");
            state
                .registry
                .unregister_connection(&agent_id, &connection_id)
                .await;
            return;
        }
    }

    tracing::info!(agent_id = %agent.id, connection_id = %connection_id, "Agent session active");

    let write_task = tokio::spawn(write_loop(sink, outbound_rx));
    read_loop(&state, &agent_id, &mut stream).await;

    // The reader owns teardown: a takeover already replaced the map entry,
    // in which case this is a no-op.
    state
        .registry
        .unregister_connection(&agent_id, &connection_id)
        .await;
    conn.close();
    write_task.abort();
}

/// Read the first text frame and decode it as a registration
async fn read_registration(
    stream: &mut SplitStream<WebSocket>,
) -> std::result::Result<AgentRegistration, String> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).map_err(|e| e.to_string());
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err("connection closed before registration".to_string());
            }
            Some(Ok(_)) => continue, // ping/pong before registration
            Some(Err(err)) => return Err(err.to_string()),
        }
    }
}

/// Send an error reply and close
async fn reject(sink: &mut SplitSink<WebSocket, Message>, reason: &str) {
    let reply = RegistrationReply::rejected(reason);
    if let Ok(text) = serde_json::to_string(&reply) {
        let _ = sink.send(Message::Text(text)).await;
    }
    let _ = sink.close().await;
}

/// Drain the outbound queue onto the wire; closes the sink when the queue
/// closes or the peer goes away.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        let text = match String::from_utf8(frame) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(error = %err, "Dropping non-UTF8 outbound frame");
                continue;
            }
        };
        if let Err(err) = sink.send(Message::Text(text)).await {
            tracing::error!(error = %err, "Error writing to agent");
            break;
        }
    }
    let _ = sink.close().await;
}

/// Dispatch inbound frames until EOF, close, or error
async fn read_loop(state: &AppState, agent_id: &str, stream: &mut SplitStream<WebSocket>) {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                tracing::info!(agent_id = %agent_id, "Agent closed connection");
                return;
            }
            Ok(_) => continue,
            Err(err) => {
                tracing::error!(agent_id = %agent_id, error = %err, "Error reading from agent");
                return;
            }
        };

        match protocol::parse_agent_frame(&text) {
            Ok(AgentFrame::Heartbeat(_)) => {
                // Benign race: the agent may have been unregistered
                // between frame receipt and this call.
                if let Err(err) = state.registry.update_heartbeat(agent_id).await {
                    tracing::debug!(agent_id = %agent_id, error = %err,
                        "Heartbeat for unregistered agent");
                }
            }
            Ok(AgentFrame::StatusUpdate(update)) => {
                if let Err(err) = state.reconciler.apply_update(agent_id, &update).await {
                    tracing::warn!(agent_id = %agent_id, event_id = %update.event_id,
                        error = %err, "Failed to persist status update");
                }
            }
            Ok(AgentFrame::Unknown(frame_type)) => {
                tracing::debug!(agent_id = %agent_id, frame_type = %frame_type,
                    "Ignoring unknown frame type");
            }
            Err(err) => {
                tracing::warn!(agent_id = %agent_id, error = %err, "Malformed frame from agent");
            }
        }
    }
}
