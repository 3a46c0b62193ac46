//! HTTP surface of the control plane.
//!
//! Flat, unauthenticated endpoints: event submission, health, counters,
//! and the websocket upgrade for agent sessions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use tower_http::trace::TraceLayer;

use skiff_core::model::event::Event;

use crate::session;
use crate::state::AppState;

/// Build the control-plane router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(submit_event))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(session::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    status: &'static str,
    event_id: String,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// `POST /events`: submit one event for routing
async fn submit_event(State(state): State<AppState>, body: String) -> Response {
    let event: Event = match serde_json::from_str(&body) {
        Ok(event) => event,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Invalid event: {err}"));
        }
    };

    if let Err(err) = event.validate() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Event validation failed: {err}"),
        );
    }

    tracing::info!(event_id = %event.id, event_type = event.kind.name(),
        target_agent = %event.target_agent, "Received event via HTTP");
    state.record_ingest(&event, "event_received_http").await;

    let event_id = event.id.clone();
    match state.router.route_event(event).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                status: "accepted",
                event_id,
                message: "Event routed to agent",
            }),
        )
            .into_response(),
        Err(err) if err.is_validation() => error_response(
            StatusCode::BAD_REQUEST,
            format!("Event validation failed: {err}"),
        ),
        Err(err) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to route event: {err}"),
        ),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    agent_count: usize,
    version: &'static str,
}

/// `GET /health`: liveness plus headline counts
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        agent_count: state.registry.count().await,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    agents: AgentMetrics,
    events: HashMap<String, i64>,
}

#[derive(Debug, Serialize)]
struct AgentMetrics {
    total: usize,
    connected: usize,
}

/// `GET /metrics`: full counters
async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let events = match state.store.get_event_stats().await {
        Ok(stats) => stats,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read event stats");
            HashMap::new()
        }
    };

    Json(MetricsResponse {
        agents: AgentMetrics {
            total: state.registry.count().await,
            connected: state.registry.list_connected().await.len(),
        },
        events,
    })
}
