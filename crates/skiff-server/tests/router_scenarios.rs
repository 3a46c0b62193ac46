//! Routing scenarios: offline targets, TTL expiry, and retry exhaustion,
//! all driven through the store hooks so persisted state is checked too.

mod common;

use chrono::Utc;
use std::sync::Arc;

use skiff_core::clock::{Clock, MockClock};
use skiff_core::model::status::EventState;
use skiff_registry::AgentConnection;
use skiff_storage::StateStore;

#[tokio::test]
async fn test_offline_target_delivers_after_reconnect() {
    let clock = Arc::new(MockClock::new(Utc::now()));
    let (state, store) = common::build_state(clock.clone());

    // Submit while no agent is registered.
    let event = common::manifest_event("E2", "a2", 3600, clock.now());
    state.router.route_event(event).await.unwrap();

    assert_eq!(state.router.pending_count("a2").await, 1);
    let status = store.get_event_status("E2").await.unwrap().unwrap();
    assert_eq!(status.state, EventState::Queued);

    // Agent registers a few seconds later.
    clock.advance_ms(5_000);
    let (conn, mut rx) = AgentConnection::new("a2", "conn-1");
    state
        .registry
        .register(common::registration("a2"), Arc::new(conn))
        .await
        .unwrap();

    // The next retry tick delivers the parked event.
    state.router.process_pending().await;
    assert_eq!(state.router.pending_count("a2").await, 0);

    let frame = rx.try_recv().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(value["event"]["id"], "E2");

    let status = store.get_event_status("E2").await.unwrap().unwrap();
    assert_eq!(status.state, EventState::Assigned);
}

#[tokio::test]
async fn test_short_ttl_expires_on_first_tick() {
    let clock = Arc::new(MockClock::new(Utc::now()));
    let (state, store) = common::build_state(clock.clone());

    let mut event = common::manifest_event("E3", "a3", 1, clock.now());
    event.ttl_seconds = 1;
    state.router.route_event(event).await.unwrap();
    assert_eq!(state.router.pending_count("a3").await, 1);

    clock.advance_ms(1_500);
    state.router.process_pending().await;

    assert_eq!(state.router.pending_count("a3").await, 0);
    let status = store.get_event_status("E3").await.unwrap().unwrap();
    assert_eq!(status.state, EventState::Expired);
}

#[tokio::test]
async fn test_saturated_agent_exhausts_retries() {
    let clock = Arc::new(MockClock::new(Utc::now()));
    let (state, store) = common::build_state(clock.clone());

    // Connected agent whose single-slot buffer is pre-filled and never
    // drained: every delivery attempt returns buffer-full.
    let (conn, _rx) = AgentConnection::with_depth("a4", "conn-1", 1);
    state
        .registry
        .register(common::registration("a4"), Arc::new(conn))
        .await
        .unwrap();
    state
        .registry
        .send_to_agent("a4", b"filler".to_vec())
        .await
        .unwrap();

    let event = common::manifest_event("E4", "a4", 3600, clock.now());
    state.router.route_event(event).await.unwrap();
    assert_eq!(state.router.pending_count("a4").await, 1);

    // Three failed attempts, then the fourth tick evicts the entry.
    for _ in 0..3 {
        state.router.process_pending().await;
        assert_eq!(state.router.pending_count("a4").await, 1);
    }
    state.router.process_pending().await;
    assert_eq!(state.router.pending_count("a4").await, 0);

    let status = store.get_event_status("E4").await.unwrap().unwrap();
    assert_eq!(status.state, EventState::Failed);
    assert!(status.message.contains("max retries exceeded"));
}
