//! Full websocket round-trips against a loopback control plane: register,
//! deliver, reconcile streamed status, and reconnect takeover.

mod common;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use skiff_core::clock::{Clock, MockClock, SystemClock};
use skiff_core::model::status::EventState;
use skiff_server::AppState;
use skiff_storage::StateStore;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn_server(state: AppState) -> String {
    let app = skiff_server::api::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

/// Next text frame within the step timeout
async fn expect_text(ws: &mut WsClient) -> String {
    let deadline = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("connection ended while awaiting frame: {other:?}"),
            }
        }
    });
    deadline.await.expect("timed out awaiting frame")
}

/// Connect and complete the registration handshake
async fn connect_agent(url: &str, id: &str) -> WsClient {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let registration = common::registration(id);
    ws.send(WsMessage::Text(
        serde_json::to_string(&registration).unwrap(),
    ))
    .await
    .unwrap();

    let reply: Value = serde_json::from_str(&expect_text(&mut ws).await).unwrap();
    assert_eq!(reply["status"], "registered", "reply: {reply}");
    ws
}

/// Poll until the condition holds or the step timeout elapses
async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    loop {
        if check().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached before timeout"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_happy_path_register_submit_deliver() {
    let (state, store) = common::build_state(Arc::new(SystemClock::new()));
    let url = spawn_server(state.clone()).await;

    let mut ws = connect_agent(&url, "a1").await;
    assert_eq!(state.registry.count().await, 1);

    // Submit over the HTTP surface sharing the same state.
    let event = common::manifest_event("E1", "a1", 3600, Utc::now());
    let app = skiff_server::api::router(state.clone());
    let response = tower::ServiceExt::oneshot(
        app,
        axum::http::Request::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_string(&event).unwrap()))
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);

    // The event frame arrives on the agent's session.
    let frame: Value = serde_json::from_str(&expect_text(&mut ws).await).unwrap();
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["event"]["id"], "E1");
    assert_eq!(frame["event"]["type"], "k8s_resource");

    // The routed transition was persisted.
    let status = store.get_event_status("E1").await.unwrap().unwrap();
    assert_eq!(status.state, EventState::Assigned);
}

#[tokio::test]
async fn test_status_updates_reconcile_to_completed() {
    let (state, store) = common::build_state(Arc::new(SystemClock::new()));
    let url = spawn_server(state.clone()).await;
    let mut ws = connect_agent(&url, "a1").await;

    let frames = [
        json!({
            "type": "status_update", "event_id": "E6", "agent_id": "a1",
            "state": "in_progress", "phase": "received",
            "timestamp": Utc::now(),
        }),
        json!({
            "type": "status_update", "event_id": "E6", "agent_id": "a1",
            "state": "in_progress", "phase": "applying",
            "log_level": "info", "message": "applying 1 manifest",
            "timestamp": Utc::now(),
        }),
        json!({
            "type": "status_update", "event_id": "E6", "agent_id": "a1",
            "state": "completed", "phase": "completed",
            "result": {
                "success": true,
                "completed_at": Utc::now(),
                "duration_ms": 1800,
            },
            "timestamp": Utc::now(),
        }),
    ];
    for frame in frames {
        ws.send(WsMessage::Text(frame.to_string())).await.unwrap();
    }

    wait_until(|| async {
        matches!(
            store.get_event_status("E6").await.unwrap(),
            Some(status) if status.state == EventState::Completed
        )
    })
    .await;

    let status = store.get_event_status("E6").await.unwrap().unwrap();
    assert_eq!(status.agent_id, "a1");
    assert!(status.execution_log.len() >= 1);
    assert!(status.result.unwrap().success);
}

#[tokio::test]
async fn test_reconnect_supersedes_prior_session() {
    let (state, _store) = common::build_state(Arc::new(SystemClock::new()));
    let url = spawn_server(state.clone()).await;

    let mut ws1 = connect_agent(&url, "a5").await;
    let mut ws2 = connect_agent(&url, "a5").await;

    // The first session is closed by the takeover.
    let closed = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            match ws1.next().await {
                Some(Ok(WsMessage::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return true,
            }
        }
    })
    .await
    .expect("first session was not closed");
    assert!(closed);

    // Exactly one registration remains, and delivery lands on the new
    // session.
    wait_until(|| async { state.registry.count().await == 1 }).await;
    state
        .router
        .route_event(common::manifest_event("E5", "a5", 3600, Utc::now()))
        .await
        .unwrap();

    let frame: Value = serde_json::from_str(&expect_text(&mut ws2).await).unwrap();
    assert_eq!(frame["event"]["id"], "E5");
}

#[tokio::test]
async fn test_invalid_registration_is_rejected() {
    let (state, _store) = common::build_state(Arc::new(SystemClock::new()));
    let url = spawn_server(state.clone()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let mut registration = common::registration("a1");
    registration.capabilities.clear();
    ws.send(WsMessage::Text(
        serde_json::to_string(&registration).unwrap(),
    ))
    .await
    .unwrap();

    let reply: Value = serde_json::from_str(&expect_text(&mut ws).await).unwrap();
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .contains("capability"));
    assert_eq!(state.registry.count().await, 0);
}

#[tokio::test]
async fn test_heartbeat_updates_registry() {
    let clock = Arc::new(MockClock::new(Utc::now()));
    let (state, _store) = common::build_state(clock.clone());
    let url = spawn_server(state.clone()).await;
    let mut ws = connect_agent(&url, "a1").await;

    clock.advance_ms(7_000);
    let expected = clock.now();
    ws.send(WsMessage::Text(
        json!({"type": "heartbeat", "timestamp": Utc::now(), "metrics": {}}).to_string(),
    ))
    .await
    .unwrap();

    wait_until(|| async {
        state.registry.get_agent("a1").await.unwrap().last_heartbeat == expected
    })
    .await;
}

#[tokio::test]
async fn test_disconnect_unregisters_and_queues_next_event() {
    let (state, store) = common::build_state(Arc::new(SystemClock::new()));
    let url = spawn_server(state.clone()).await;

    let mut ws = connect_agent(&url, "a1").await;
    ws.close(None).await.unwrap();

    wait_until(|| async { state.registry.count().await == 0 }).await;

    // The disconnect transition was persisted through the hooks.
    let agent = store.get_agent("a1").await.unwrap().unwrap();
    assert_eq!(
        agent.status,
        skiff_core::model::agent::AgentStatus::Disconnected
    );

    // Events for the departed agent now queue instead of failing.
    state
        .router
        .route_event(common::manifest_event("E9", "a1", 3600, Utc::now()))
        .await
        .unwrap();
    assert_eq!(state.router.pending_count("a1").await, 1);
    let status = store.get_event_status("E9").await.unwrap().unwrap();
    assert_eq!(status.state, EventState::Queued);
}
