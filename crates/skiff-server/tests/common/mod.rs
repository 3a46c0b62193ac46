//! Shared fixtures for control-plane integration tests.
//!
//! Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use skiff_core::clock::Clock;
use skiff_core::config::RouterConfig;
use skiff_core::model::agent::AgentRegistration;
use skiff_core::model::event::{Event, EventKind};
use skiff_registry::{AgentRegistry, RegistryConfig};
use skiff_server::hooks::StoreHooks;
use skiff_server::{AppState, EventRouter, StatusReconciler};
use skiff_storage::MemoryStore;
use std::collections::HashMap;

/// Build an app state over an in-memory store, with the store hooks
/// wired to both the registry and the router exactly as `run()` does.
pub fn build_state(clock: Arc<dyn Clock>) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let hooks = Arc::new(StoreHooks::new(store.clone(), clock.clone()));

    let registry = Arc::new(AgentRegistry::with_parts(
        RegistryConfig::default(),
        hooks.clone(),
        clock.clone(),
    ));
    let router = Arc::new(EventRouter::with_parts(
        registry.clone(),
        RouterConfig::default(),
        hooks,
        clock.clone(),
    ));
    let reconciler = Arc::new(StatusReconciler::new(store.clone(), clock.clone()));

    (
        AppState::new(registry, router, store.clone(), reconciler, clock),
        store,
    )
}

pub fn registration(id: &str) -> AgentRegistration {
    AgentRegistration {
        id: id.into(),
        name: format!("{id} worker"),
        cluster_name: "prod-east".into(),
        cluster_provider: "eks".into(),
        region: "us-east-1".into(),
        version: "0.1.0".into(),
        labels: HashMap::new(),
        capabilities: vec!["k8s_crud".into()],
        hostname: String::new(),
        namespace: String::new(),
        metadata: HashMap::new(),
    }
}

pub fn manifest_event(id: &str, target: &str, ttl_seconds: u64, now: chrono::DateTime<chrono::Utc>) -> Event {
    let mut event = Event::new(
        EventKind::K8sResource {
            manifests: vec!["apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo".into()],
        },
        target,
        "tester",
        now,
    );
    event.id = id.into();
    event.ttl_seconds = ttl_seconds;
    event
}
