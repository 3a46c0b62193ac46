//! HTTP ingress tests driven through the router service directly.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use skiff_core::clock::SystemClock;
use skiff_storage::StateStore;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_events(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_submit_event_accepted() {
    let (state, store) = common::build_state(Arc::new(SystemClock::new()));
    let app = skiff_server::api::router(state.clone());

    let event = common::manifest_event("E1", "a1", 3600, Utc::now());
    let response = app
        .oneshot(post_events(serde_json::to_string(&event).unwrap()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["event_id"], "E1");

    // No agent connected: accepted means parked for retry.
    assert_eq!(state.router.pending_count("a1").await, 1);

    // Counters bumped exactly once, audit recorded.
    let stats = store.get_event_stats().await.unwrap();
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["created"], 1);
    let audit = store.read_recent_audit(10).await.unwrap();
    assert_eq!(audit[0].action, "event_received_http");
}

#[tokio::test]
async fn test_submit_malformed_json() {
    let (state, store) = common::build_state(Arc::new(SystemClock::new()));
    let app = skiff_server::api::router(state);

    let response = app.oneshot(post_events("{oops".into())).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid event"));

    // Rejected submissions are never counted.
    let stats = store.get_event_stats().await.unwrap();
    assert_eq!(stats["total"], 0);
}

#[tokio::test]
async fn test_submit_validation_failure() {
    let (state, _store) = common::build_state(Arc::new(SystemClock::new()));
    let app = skiff_server::api::router(state);

    let mut event = common::manifest_event("E1", "a1", 3600, Utc::now());
    event.target_agent.clear();

    let response = app
        .oneshot(post_events(serde_json::to_string(&event).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_expired_event_is_router_error() {
    let (state, _store) = common::build_state(Arc::new(SystemClock::new()));
    let app = skiff_server::api::router(state);

    let mut event = common::manifest_event("E1", "a1", 1, Utc::now());
    event.created_at = Utc::now() - chrono::Duration::seconds(60);

    let response = app
        .oneshot(post_events(serde_json::to_string(&event).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_events_rejects_get() {
    let (state, _store) = common::build_state(Arc::new(SystemClock::new()));
    let app = skiff_server::api::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health() {
    let (state, _store) = common::build_state(Arc::new(SystemClock::new()));
    let app = skiff_server::api::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["agent_count"], 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_metrics_reflects_counters() {
    let (state, _store) = common::build_state(Arc::new(SystemClock::new()));
    let app = skiff_server::api::router(state.clone());

    let event = common::manifest_event("E1", "a1", 3600, Utc::now());
    app.clone()
        .oneshot(post_events(serde_json::to_string(&event).unwrap()))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["agents"]["total"], 0);
    assert_eq!(body["agents"]["connected"], 0);
    assert_eq!(body["events"]["total"], 1);
    // The queued transition was persisted by the router hooks.
    assert_eq!(body["events"]["queued"], 1);
}
